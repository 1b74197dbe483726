use std::mem;
use std::ptr::{self, NonNull};

use crate::align::{MAX_ALIGN, Padded};
use crate::budget::BudgetGuard;
use crate::config::LogLevel;
use crate::error::{ArenaError, Op, Result};
use crate::sys::SystemAllocator;
use crate::telemetry::{ChunkClass, Telemetry};

/// Written at the start of every block, ahead of the usable storage.
#[repr(C, align(16))]
struct ChunkHeader {
  arena: usize,
  size: usize,
}

/// Bytes at the front of each chunk that are never handed out.
pub const HEADER_SIZE: usize = mem::size_of::<ChunkHeader>();

const _: () = assert!(HEADER_SIZE % MAX_ALIGN == 0);

/// One block from the system allocator, carved up by bumping `cursor`.
///
/// ```text
///   base                cursor                          size
///   ┌────────┬──────────┬───────────────────────────────┐
///   │ header │  served  │           available           │
///   └────────┴──────────┴───────────────────────────────┘
/// ```
///
/// `HEADER_SIZE <= cursor <= size` always holds, and `cursor` only moves
/// forward until the chunk is rewound.
#[derive(Debug)]
pub struct Chunk {
  base: NonNull<u8>,
  size: usize,
  cursor: usize,
  generation: u64,
}

impl Chunk {
  /// Whole block size, header included.
  pub fn size(&self) -> usize {
    self.size
  }

  pub fn capacity(&self) -> usize {
    self.size - HEADER_SIZE
  }

  pub fn available(&self) -> usize {
    self.size - self.cursor
  }

  /// Arena generation the cursor was last rewound in.
  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn start(&self) -> NonNull<u8> {
    unsafe { self.base.add(HEADER_SIZE) }
  }

  pub fn rewind(
    &mut self,
    generation: u64,
  ) {
    self.cursor = HEADER_SIZE;
    self.generation = generation;
  }

  /// Serves `request` from the free span, or `None` if it doesn't fit.
  ///
  /// The last requested byte and the padding after it are zeroed.
  #[inline]
  pub fn try_bump(
    &mut self,
    request: Padded,
  ) -> Option<NonNull<u8>> {
    if request.bytes > self.available() {
      return None;
    }
    let at = self.cursor;
    self.cursor += request.bytes;
    unsafe {
      let tail = self.base.add(self.cursor - request.padding - 1);
      ptr::write_bytes(tail.as_ptr(), 0, request.padding + 1);
      Some(self.base.add(at))
    }
  }

  /// Whether `len` bytes at `ptr` lie inside the usable storage.
  pub fn contains(
    &self,
    ptr: *const u8,
    len: usize,
  ) -> bool {
    let start = self.start().as_ptr() as usize;
    let end = self.base.as_ptr() as usize + self.size;
    let addr = ptr as usize;
    addr >= start && addr <= end && len <= end - addr
  }

  fn header(&self) -> &ChunkHeader {
    unsafe { self.base.cast::<ChunkHeader>().as_ref() }
  }
}

/// Draws chunks from the system allocator under the budget, and reports
/// them to the telemetry observer.
pub struct ChunkAllocator<S> {
  system: S,
  budget: BudgetGuard,
  telemetry: Option<Box<dyn Telemetry>>,
  level: LogLevel,
}

impl<S: SystemAllocator> ChunkAllocator<S> {
  pub fn new(
    system: S,
    budget: BudgetGuard,
    telemetry: Option<Box<dyn Telemetry>>,
    level: LogLevel,
  ) -> Self {
    Self {
      system,
      budget,
      telemetry,
      level,
    }
  }

  /// Draws a block of exactly `block_size` bytes for `arena`.
  ///
  /// Budget refusal is fatal and never reaches the system allocator. A
  /// refusal from the system allocator is `OutOfMemory`.
  pub fn allocate_chunk(
    &mut self,
    op: Op,
    arena: usize,
    block_size: usize,
    generation: u64,
  ) -> Result<Chunk> {
    debug_assert!(block_size > HEADER_SIZE && block_size % MAX_ALIGN == 0);

    if !self.budget.admit(block_size) {
      return Err(ArenaError::BudgetExceeded {
        op,
        arena,
        bytes: block_size,
        drawn: self.budget.drawn(),
        ceiling: self.budget.ceiling(),
      });
    }

    let base = self.system.allocate(block_size).ok_or(ArenaError::OutOfMemory {
      op,
      arena,
      bytes: block_size,
    })?;
    unsafe {
      base.cast::<ChunkHeader>().write(ChunkHeader {
        arena,
        size: block_size,
      });
    }
    self.budget.charge(block_size);

    if self.level >= LogLevel::Chunks {
      if let Some(telemetry) = self.telemetry.as_mut() {
        telemetry.chunk_drawn(arena, block_size, ChunkClass::of(block_size));
      }
    }

    Ok(Chunk {
      base,
      size: block_size,
      cursor: HEADER_SIZE,
      generation,
    })
  }

  /// Returns `chunk` to the system allocator and refunds the budget.
  pub fn release(
    &mut self,
    arena: usize,
    chunk: Chunk,
  ) {
    debug_assert_eq!(chunk.header().arena, arena);
    debug_assert_eq!(chunk.header().size, chunk.size);

    unsafe { self.system.release(chunk.base, chunk.size) };
    self.budget.refund(chunk.size);

    if self.level >= LogLevel::Chunks {
      if let Some(telemetry) = self.telemetry.as_mut() {
        telemetry.chunk_released(arena, chunk.size);
      }
    }
  }

  #[inline]
  pub fn served(
    &mut self,
    arena: usize,
    bytes: usize,
  ) {
    if self.level == LogLevel::Full {
      if let Some(telemetry) = self.telemetry.as_mut() {
        telemetry.served(arena, bytes);
      }
    }
  }

  pub fn budget(&self) -> &BudgetGuard {
    &self.budget
  }

  #[cfg(test)]
  pub fn system(&self) -> &S {
    &self.system
  }

  pub fn report(&self) {
    if let Some(telemetry) = self.telemetry.as_ref() {
      telemetry.report();
    }
  }
}
