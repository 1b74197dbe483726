//! Platform queries and the system allocator the arenas draw chunks from.

use std::ptr::{self, NonNull};

use lazy_static::lazy_static;
use libc::c_void;

use crate::align::{MAX_ALIGN, MAX_OFFSET};

lazy_static! {
  pub static ref PAGE_SIZE: usize = page_size();
}

const FALLBACK_PAGE_SIZE: usize = 4096;

fn page_size() -> usize {
  match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
    n if n > 0 => n as usize,
    _ => FALLBACK_PAGE_SIZE,
  }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
const PAGES_QUERY: libc::c_int = libc::_SC_AVPHYS_PAGES;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const PAGES_QUERY: libc::c_int = libc::_SC_PHYS_PAGES;

/// Physical memory currently available to the process, in bytes.
///
/// Falls back to `MAX_OFFSET` when the platform can't tell.
pub fn available_memory() -> usize {
  match unsafe { libc::sysconf(PAGES_QUERY) } {
    n if n > 0 => (n as usize).saturating_mul(*PAGE_SIZE).min(MAX_OFFSET),
    _ => {
      log::warn!("available physical memory unknown, the arena budget is unbounded");
      MAX_OFFSET
    }
  }
}

/// Chunk size that keeps malloc's blocks page sized.
pub fn recommended_chunk_size() -> usize {
  *PAGE_SIZE
}

/// Source of whole blocks for arena chunks.
pub trait SystemAllocator {
  /// Returns a `MAX_ALIGN`-aligned block of `size` bytes, or `None` when out
  /// of memory.
  fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>>;

  /// Gives a block back.
  ///
  /// # Safety
  ///
  /// `block` must come from `allocate` on this allocator with the same `size`
  /// and must not have been released already.
  unsafe fn release(
    &mut self,
    block: NonNull<u8>,
    size: usize,
  );
}

/// The C library heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct Malloc;

impl SystemAllocator for Malloc {
  fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    let mut block: *mut c_void = ptr::null_mut();
    if unsafe { libc::posix_memalign(&mut block, MAX_ALIGN, size) } != 0 {
      return None;
    }
    NonNull::new(block.cast())
  }

  unsafe fn release(
    &mut self,
    block: NonNull<u8>,
    _size: usize,
  ) {
    unsafe { libc::free(block.as_ptr().cast()) }
  }
}
