//! Bounded view over a raw memory region.
//!
//! All field access into shared memory goes through [`MemoryView`]: offsets are
//! checked against the view length and the natural alignment of the accessed
//! type, the same way slice indexing checks its bounds. Multi-byte fields are
//! accessed through atomics so the producer and consumer never race on plain
//! loads and stores.

use std::mem::{align_of, size_of};
use std::ptr::{self, NonNull};
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use std::sync::atomic::{AtomicI32, AtomicI64};

/// A `(pointer, length)` window into memory owned elsewhere.
///
/// The view is `Copy`; it does not keep the memory alive. Whoever constructs it
/// promises the region outlives every copy.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MemoryView {
    ptr: NonNull<u8>,
    len: usize,
}

unsafe impl Send for MemoryView {}
unsafe impl Sync for MemoryView {}

impl MemoryView {
    /// Wrap `len` bytes starting at `ptr`.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` bytes for as long as this
    /// view or any view derived from it is used, and the memory must only be
    /// accessed through atomics or by the single writer that owns a given byte range.
    pub unsafe fn new(ptr: *mut u8, len: usize) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, len })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Sub-view of `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> MemoryView {
        self.check_bounds(offset, len);
        Self {
            // in bounds, so the result is non-null
            ptr: unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(offset)) },
            len,
        }
    }

    #[inline]
    fn check_bounds(&self, offset: usize, size: usize) {
        let in_bounds = offset.checked_add(size).map_or(false, |end| end <= self.len);
        assert!(
            in_bounds,
            "access of {size} bytes at offset {offset} out of bounds for view of {} bytes",
            self.len
        );
    }

    #[inline]
    fn check_field<T>(&self, offset: usize) {
        self.check_bounds(offset, size_of::<T>());
        let address = self.ptr.as_ptr() as usize + offset;
        assert!(
            address % align_of::<T>() == 0,
            "address {address:#x} not aligned to {}",
            align_of::<T>()
        );
    }

    /// Reinterpret the bytes at `offset` as a `T`.
    ///
    /// # Safety
    /// Every bit pattern must be a valid `T` (atomics, integers and byte arrays),
    /// and the returned reference must not outlive the underlying memory.
    pub unsafe fn struct_ref<T>(&self, offset: usize) -> &T {
        self.check_field::<T>(offset);
        &*(self.ptr.as_ptr().add(offset) as *const T)
    }

    #[inline]
    pub fn atomic_i32(&self, offset: usize) -> &AtomicI32 {
        self.check_field::<AtomicI32>(offset);
        unsafe { &*(self.ptr.as_ptr().add(offset) as *const AtomicI32) }
    }

    #[inline]
    pub fn atomic_i64(&self, offset: usize) -> &AtomicI64 {
        self.check_field::<AtomicI64>(offset);
        unsafe { &*(self.ptr.as_ptr().add(offset) as *const AtomicI64) }
    }

    /// Plain load for fields owned by the calling side.
    #[inline]
    pub fn get_i32(&self, offset: usize) -> i32 {
        self.atomic_i32(offset).load(Relaxed)
    }

    /// Acquire load, pairs with [`put_i32_ordered`](Self::put_i32_ordered).
    #[inline]
    pub fn get_i32_volatile(&self, offset: usize) -> i32 {
        self.atomic_i32(offset).load(Acquire)
    }

    #[inline]
    pub fn put_i32(&self, offset: usize, value: i32) {
        self.atomic_i32(offset).store(value, Relaxed)
    }

    /// Release store: everything written before it is visible to an acquiring reader.
    #[inline]
    pub fn put_i32_ordered(&self, offset: usize, value: i32) {
        self.atomic_i32(offset).store(value, Release)
    }

    #[inline]
    pub fn get_i64(&self, offset: usize) -> i64 {
        self.atomic_i64(offset).load(Relaxed)
    }

    #[inline]
    pub fn get_i64_volatile(&self, offset: usize) -> i64 {
        self.atomic_i64(offset).load(Acquire)
    }

    #[inline]
    pub fn put_i64(&self, offset: usize, value: i64) {
        self.atomic_i64(offset).store(value, Relaxed)
    }

    #[inline]
    pub fn put_i64_ordered(&self, offset: usize, value: i64) {
        self.atomic_i64(offset).store(value, Release)
    }

    /// Atomic add returning the previous value.
    #[inline]
    pub fn get_and_add_i64(&self, offset: usize, delta: i64) -> i64 {
        self.atomic_i64(offset).fetch_add(delta, AcqRel)
    }

    /// Copy `src` into the view at `offset`.
    #[inline]
    pub fn put_bytes(&self, offset: usize, src: &[u8]) {
        self.check_bounds(offset, src.len());
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr().add(offset), src.len());
        }
    }

    /// Borrow `len` bytes at `offset`.
    ///
    /// Callers must only borrow ranges the other side is not writing, i.e. committed
    /// records the consumer has not released yet.
    #[inline]
    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        self.check_bounds(offset, len);
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(offset), len) }
    }

    pub fn fill(&self, offset: usize, len: usize, value: u8) {
        self.check_bounds(offset, len);
        unsafe { ptr::write_bytes(self.ptr.as_ptr().add(offset), value, len) }
    }
}

impl std::fmt::Debug for MemoryView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryView")
            .field("ptr", &format_args!("{:p}", self.ptr))
            .field("len", &self.len)
            .finish()
    }
}
