//! Borrowed buffers and their release actions
//!
//! Bytes read from a target are owned by the producer of the read. The
//! producer may have allocated them from a heap, an arena or a mapped view,
//! and only it knows how to give them back. A [`BorrowedBytes`] carries the
//! bytes together with a [`ReleaseAction`] that does exactly that.
//!
//! Release is explicit. [`BorrowedBytes::release`] consumes the buffer, so
//! a buffer cannot be released twice or read after release. Dropping a
//! buffer without releasing it leaks the producer's storage.

use std::fmt;
use std::ptr::NonNull;

/// A deferred operation that hands a buffer back to its producer.
pub struct ReleaseAction(Box<dyn FnOnce() + Send>);

impl ReleaseAction {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(release))
    }

    /// A release action for storage the consumer never has to return.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn invoke(self) {
        (self.0)()
    }
}

impl fmt::Debug for ReleaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseAction").finish_non_exhaustive()
    }
}

/// Bytes owned by a memory source until released.
#[must_use = "borrowed bytes must be released exactly once"]
#[derive(Debug)]
pub struct BorrowedBytes {
    ptr: NonNull<u8>,
    len: usize,
    release: ReleaseAction,
}

// SAFETY: the bytes are only read through `&self`, and the release action is
// itself `Send`. Producers allow release from any thread as long as no other
// use of the same buffer overlaps it, which ownership of `self` guarantees.
unsafe impl Send for BorrowedBytes {}
unsafe impl Sync for BorrowedBytes {}

impl BorrowedBytes {
    /// Wrap a buffer produced elsewhere.
    ///
    /// # Safety
    /// `ptr` must be valid for reads of `len` bytes, and the bytes must not
    /// be mutated, until `release` is invoked.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize, release: ReleaseAction) -> Self {
        Self { ptr, len, release }
    }

    /// Wrap bytes the reader already owns; release frees them.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let owned = OwnedSlice::new(bytes);
        let ptr = owned.ptr();
        let len = owned.len;
        Self {
            ptr,
            len,
            release: ReleaseAction::new(move || owned.free()),
        }
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: guaranteed by the constructor contract until release,
        // and release consumes `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Hand the bytes back to their producer.
    pub fn release(self) {
        self.release.invoke()
    }

    /// Copy the bytes out, then release.
    pub fn copy_and_release(self) -> Vec<u8> {
        let bytes = self.as_slice().to_vec();
        self.release();
        bytes
    }

    /// Split into the raw (pointer, length, release) triple.
    ///
    /// The caller takes over the obligation to invoke the release action
    /// exactly once, and must not read through the pointer afterwards.
    pub fn into_raw_parts(self) -> (NonNull<u8>, usize, ReleaseAction) {
        (self.ptr, self.len, self.release)
    }
}

impl AsRef<[u8]> for BorrowedBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// A leaked boxed slice, reclaimed by `free`.
struct OwnedSlice {
    raw: *mut u8,
    len: usize,
}

// SAFETY: the slice is uniquely owned and only touched again in `free`.
unsafe impl Send for OwnedSlice {}

impl OwnedSlice {
    fn new(bytes: Vec<u8>) -> Self {
        let boxed = bytes.into_boxed_slice();
        let len = boxed.len();
        let raw = Box::into_raw(boxed).cast::<u8>();
        Self { raw, len }
    }

    fn ptr(&self) -> NonNull<u8> {
        // Box::into_raw never yields null, not even for empty slices.
        NonNull::new(self.raw).unwrap_or(NonNull::dangling())
    }

    fn free(self) {
        // SAFETY: `raw`/`len` came from `Box::into_raw` in `new`, and `free`
        // consumes the only owner.
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(self.raw, self.len)) });
    }
}
