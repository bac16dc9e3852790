//! Page-aligned scratch buffers for direct I/O.
//!
//! Mirrors the teacher's pattern of reading fixed-size records directly into
//! a byte buffer (see `ovit::get_blocks_from_drive`), but the buffer here
//! must additionally satisfy O_DIRECT's alignment requirement: both the
//! address and the length must be a multiple of the storage block size.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

/// Safe upper bound for the alignment O_DIRECT requires across common
/// Linux filesystems/devices.
pub const ALIGNMENT: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum AlignedBufferError {
    #[error("cannot allocate an aligned buffer of size {0}")]
    AllocationFailed(usize),
}

/// A scoped, page-aligned, zero-initialized byte buffer.
///
/// The memory is released when the handle is dropped; there is no way to
/// outlive the handle while holding a reference into it.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

impl AlignedBuffer {
    /// Allocate a new buffer of at least `size` bytes, rounded up to
    /// `ALIGNMENT`.
    pub fn new(size: usize) -> Result<Self, AlignedBufferError> {
        let rounded = size.div_ceil(ALIGNMENT) * ALIGNMENT;
        let layout = Layout::from_size_align(rounded.max(ALIGNMENT), ALIGNMENT)
            .map_err(|_| AlignedBufferError::AllocationFailed(size))?;

        // SAFETY: layout has non-zero size, checked above.
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(AlignedBufferError::AllocationFailed(size))?;

        Ok(Self { ptr, len: rounded, layout })
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for `len` bytes for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for `len` bytes for the lifetime of self.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr/layout match the allocation made in `new`.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_aligned_and_zeroed() {
        let buf = AlignedBuffer::new(123).unwrap();
        assert_eq!(buf.as_slice().as_ptr() as usize % ALIGNMENT, 0);
        assert_eq!(buf.len(), ALIGNMENT);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn buffer_rounds_up_to_multiple_of_alignment() {
        let buf = AlignedBuffer::new(ALIGNMENT + 1).unwrap();
        assert_eq!(buf.len(), ALIGNMENT * 2);
    }
}
