//! Pointer wrappers.

use core::ptr::NonNull;
use core::{fmt, marker};

/// A pointer wrapper type.
///
/// A wrapper around a raw non-null `*mut T`. Unlike a reference it carries no lifetime: the heap
/// it points into is owned by the bookkeeper, and validity is a matter of the heap invariants.
pub struct Pointer<T> {
    /// The internal pointer.
    ptr: NonNull<T>,
    /// Associated phantom data.
    _phantom: marker::PhantomData<T>,
}

impl<T> Pointer<T> {
    /// Create a new `Pointer` from a raw pointer.
    ///
    /// # Safety
    ///
    /// This function is unsafe since a null pointer can cause UB, due to `Pointer` being
    /// non-nullable.
    #[inline]
    pub unsafe fn new(ptr: *mut T) -> Pointer<T> {
        // For the sake of nice debugging, make some assertions.
        debug_assert!(!ptr.is_null(), "Null pointer!");

        Pointer {
            ptr: NonNull::new_unchecked(ptr),
            _phantom: marker::PhantomData,
        }
    }

    /// Create a `Pointer` from a raw pointer, returning `None` on null.
    #[inline]
    pub fn try_new(ptr: *mut T) -> Option<Pointer<T>> {
        NonNull::new(ptr).map(|ptr| Pointer {
            ptr,
            _phantom: marker::PhantomData,
        })
    }

    /// Get the inner raw pointer.
    #[inline]
    pub fn get(self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// The address of this pointer.
    #[inline]
    pub fn addr(self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Cast this pointer into a pointer to another type.
    ///
    /// This will simply reinterpret the pointer, leaving the actual data unmodified.
    #[inline]
    pub fn cast<U>(self) -> Pointer<U> {
        Pointer {
            ptr: self.ptr.cast(),
            _phantom: marker::PhantomData,
        }
    }

    /// Offset this pointer forwards by `count` elements.
    ///
    /// # Safety
    ///
    /// This is unsafe, due to OOB offsets being undefined behavior.
    #[inline]
    pub unsafe fn add(self, count: usize) -> Pointer<T> {
        Pointer::new(self.ptr.as_ptr().add(count))
    }

    /// Offset this pointer backwards by `count` elements.
    ///
    /// # Safety
    ///
    /// This is unsafe, due to OOB offsets being undefined behavior.
    #[inline]
    pub unsafe fn sub(self, count: usize) -> Pointer<T> {
        Pointer::new(self.ptr.as_ptr().sub(count))
    }

    /// Is this pointer aligned to `align`?
    #[inline]
    pub fn aligned_to(self, align: usize) -> bool {
        self.addr() % align == 0
    }
}

// Manual impls, since deriving would put bounds on `T`.
impl<T> Clone for Pointer<T> {
    #[inline]
    fn clone(&self) -> Pointer<T> {
        *self
    }
}

impl<T> Copy for Pointer<T> {}

impl<T> PartialEq for Pointer<T> {
    #[inline]
    fn eq(&self, other: &Pointer<T>) -> bool {
        self.ptr == other.ptr
    }
}

impl<T> Eq for Pointer<T> {}

impl<T> PartialOrd for Pointer<T> {
    #[inline]
    fn partial_cmp(&self, other: &Pointer<T>) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Pointer<T> {
    #[inline]
    fn cmp(&self, other: &Pointer<T>) -> core::cmp::Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl<T> fmt::Debug for Pointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.addr())
    }
}
