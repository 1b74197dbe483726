use std::ptr::{self, NonNull};

use crate::align::{self, MAX_OFFSET};
use crate::chunk::{Chunk, ChunkAllocator, HEADER_SIZE};
use crate::error::{ArenaError, Op, Result};
use crate::sys::SystemAllocator;

/// One arena: an owned chain of chunks plus the index of the chunk being
/// bumped.
///
/// `dealloc` bumps `generation`. A chunk whose stamp is older than the
/// arena's holds nothing live and is rewound the first time the cursor
/// reaches it again.
#[derive(Debug)]
pub struct Arena {
  chunks: Vec<Chunk>,
  current: usize,
  block_size: usize,
  generation: u64,
}

impl Arena {
  /// Shapes `chunk_size` into a default block size and draws the first chunk.
  pub fn create<S: SystemAllocator>(
    id: usize,
    chunk_size: usize,
    source: &mut ChunkAllocator<S>,
  ) -> Result<Self> {
    if chunk_size > MAX_OFFSET {
      return Err(ArenaError::RequestTooLarge {
        op: Op::Create,
        arena: id,
        size: chunk_size,
      });
    }
    let block_size =
      align::chunk_block_size(chunk_size, HEADER_SIZE).ok_or(ArenaError::ChunkTooSmall {
        op: Op::Create,
        arena: id,
        size: chunk_size,
      })?;
    let first = source.allocate_chunk(Op::Create, id, block_size, 0)?;

    Ok(Self {
      chunks: vec![first],
      current: 0,
      block_size,
      generation: 0,
    })
  }

  /// Serves `size` bytes, `None` for a zero-byte request.
  #[inline]
  pub fn allocate<S: SystemAllocator>(
    &mut self,
    op: Op,
    id: usize,
    size: usize,
    source: &mut ChunkAllocator<S>,
  ) -> Result<Option<NonNull<u8>>> {
    if size == 0 {
      return Ok(None);
    }
    let request = align::pad(size).ok_or(ArenaError::RequestTooLarge { op, arena: id, size })?;

    let ptr = match self.chunks[self.current].try_bump(request) {
      Some(ptr) => ptr,
      None => self.allocate_slow(op, id, size, request, source)?,
    };
    source.served(id, size);
    Ok(Some(ptr))
  }

  /// Serves `nelem * elem_size` zeroed bytes.
  pub fn allocate_zeroed<S: SystemAllocator>(
    &mut self,
    id: usize,
    nelem: usize,
    elem_size: usize,
    source: &mut ChunkAllocator<S>,
  ) -> Result<Option<NonNull<u8>>> {
    let size = nelem.checked_mul(elem_size).ok_or(ArenaError::ArrayOverflow {
      op: Op::Calloc,
      arena: id,
      nelem,
      elem_size,
    })?;
    if size > MAX_OFFSET {
      return Err(ArenaError::RequestTooLarge {
        op: Op::Calloc,
        arena: id,
        size,
      });
    }

    let ptr = self.allocate(Op::Calloc, id, size, source)?;
    if let Some(ptr) = ptr {
      unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
    }
    Ok(ptr)
  }

  #[cold]
  fn allocate_slow<S: SystemAllocator>(
    &mut self,
    op: Op,
    id: usize,
    size: usize,
    request: align::Padded,
    source: &mut ChunkAllocator<S>,
  ) -> Result<NonNull<u8>> {
    for next in self.current + 1..self.chunks.len() {
      let chunk = &mut self.chunks[next];
      if chunk.generation() != self.generation {
        chunk.rewind(self.generation);
      }
      if let Some(ptr) = chunk.try_bump(request) {
        self.current = next;
        return Ok(ptr);
      }
    }

    let needed = align::with_header(request.bytes, HEADER_SIZE)
      .ok_or(ArenaError::RequestTooLarge { op, arena: id, size })?;
    let chunk = source.allocate_chunk(op, id, needed.max(self.block_size), self.generation)?;

    // Right after the chunk that was current, so chunks retained past it
    // stay ahead of the cursor for this generation.
    self.current += 1;
    self.chunks.insert(self.current, chunk);
    self.chunks[self.current]
      .try_bump(request)
      .ok_or(ArenaError::RequestTooLarge { op, arena: id, size })
  }

  /// Forgets every object while keeping all chunks for reuse.
  pub fn rewind(&mut self) {
    self.generation += 1;
    self.current = 0;
    self.chunks[0].rewind(self.generation);
  }

  /// Hands every chunk back to the system allocator.
  pub fn release<S: SystemAllocator>(
    self,
    id: usize,
    source: &mut ChunkAllocator<S>,
  ) {
    for chunk in self.chunks {
      source.release(id, chunk);
    }
  }

  /// Block size used for ordinary chunks.
  pub fn block_size(&self) -> usize {
    self.block_size
  }

  /// Bytes this arena holds from the system allocator.
  pub fn drawn(&self) -> usize {
    self.chunks.iter().map(Chunk::size).sum()
  }

  pub fn chunks(&self) -> &[Chunk] {
    &self.chunks
  }

  #[cfg(test)]
  pub fn current(&self) -> &Chunk {
    &self.chunks[self.current]
  }

  /// Whether `len` bytes at `ptr` lie inside one of this arena's chunks.
  pub fn owns(
    &self,
    ptr: *const u8,
    len: usize,
  ) -> bool {
    self.chunks.iter().any(|chunk| chunk.contains(ptr, len))
  }
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;
  use crate::align::MAX_ALIGN;
  use crate::budget::BudgetGuard;
  use crate::config::LogLevel;
  use crate::sys::Malloc;
  use crate::sys::testing::Limited;

  fn source() -> ChunkAllocator<Malloc> {
    ChunkAllocator::new(Malloc, BudgetGuard::new(1 << 30), None, LogLevel::Off)
  }

  fn addr(ptr: Option<NonNull<u8>>) -> usize {
    ptr.unwrap().as_ptr() as usize
  }

  #[test]
  fn test_alloc() {
    let mut source = source();
    let mut arena = Arena::create(0, 4096, &mut source).unwrap();
    assert_eq!(arena.block_size(), 4080);

    let first = addr(arena.allocate(Op::Alloc, 0, 100, &mut source).unwrap());
    assert_eq!(first, arena.chunks()[0].start().as_ptr() as usize);
    assert_eq!(first % MAX_ALIGN, 0);

    let second = addr(arena.allocate(Op::Alloc, 0, 100, &mut source).unwrap());
    assert_eq!(second - first, 112);

    arena.rewind();
    let third = addr(arena.allocate(Op::Alloc, 0, 50, &mut source).unwrap());
    assert_eq!(third, first);

    arena.release(0, &mut source);
    assert_eq!(source.budget().drawn(), 0);
  }

  #[test]
  fn test_zero_size_is_no_allocation() {
    let mut source = source();
    let mut arena = Arena::create(0, 1024, &mut source).unwrap();
    assert_eq!(arena.allocate(Op::Alloc, 0, 0, &mut source), Ok(None));
    assert_eq!(arena.allocate_zeroed(0, 0, 8, &mut source), Ok(None));
    assert_eq!(arena.allocate_zeroed(0, 8, 0, &mut source), Ok(None));
    assert_eq!(arena.current().available(), arena.current().capacity());
    arena.release(0, &mut source);
  }

  #[test]
  fn test_degenerate_chunk_size() {
    let mut source = source();
    for size in [0, 7, 23, 39] {
      let err = Arena::create(4, size, &mut source).unwrap_err();
      assert_eq!(err, ArenaError::ChunkTooSmall { op: Op::Create, arena: 4, size });
    }
    assert!(matches!(
      Arena::create(4, usize::MAX, &mut source),
      Err(ArenaError::RequestTooLarge { op: Op::Create, .. })
    ));

    let arena = Arena::create(4, 40, &mut source).unwrap();
    assert_eq!(arena.current().capacity(), 16);
    arena.release(4, &mut source);
  }

  #[test]
  fn test_overflowing_requests_are_fatal() {
    let mut source = source();
    let mut arena = Arena::create(1, 1024, &mut source).unwrap();

    for size in [usize::MAX, MAX_OFFSET, MAX_OFFSET + 1] {
      let err = arena.allocate(Op::Alloc, 1, size, &mut source).unwrap_err();
      assert_eq!(err, ArenaError::RequestTooLarge { op: Op::Alloc, arena: 1, size });
    }

    // Fits in MAX_OFFSET once padded, but not with a chunk header in front.
    let size = MAX_OFFSET - 15;
    let err = arena.allocate(Op::Alloc, 1, size, &mut source).unwrap_err();
    assert_eq!(err, ArenaError::RequestTooLarge { op: Op::Alloc, arena: 1, size });

    let err = arena.allocate_zeroed(1, usize::MAX, 2, &mut source).unwrap_err();
    assert!(matches!(err, ArenaError::ArrayOverflow { nelem: usize::MAX, elem_size: 2, .. }));

    let err = arena.allocate_zeroed(1, MAX_OFFSET, 2, &mut source).unwrap_err();
    assert!(matches!(err, ArenaError::RequestTooLarge { op: Op::Calloc, .. }));

    assert!(arena.chunks().len() == 1);
    arena.release(1, &mut source);
  }

  #[test]
  fn test_oversized_request_gets_its_own_chunk() {
    let mut source = source();
    let mut arena = Arena::create(0, 1024, &mut source).unwrap();

    let big = arena.allocate(Op::Alloc, 0, 10_000, &mut source).unwrap();
    assert_eq!(arena.chunks().len(), 2);
    assert_eq!(arena.current().capacity(), 10_000);
    assert_eq!(arena.current().available(), 0);
    assert!(arena.owns(big.unwrap().as_ptr(), 10_000));

    // The next ordinary chunk is back to the default size.
    arena.allocate(Op::Alloc, 0, 8, &mut source).unwrap();
    assert_eq!(arena.chunks().len(), 3);
    assert_eq!(arena.current().size(), arena.block_size());

    arena.release(0, &mut source);
  }

  #[test]
  fn test_growth_links_new_chunk() {
    let mut source = source();
    let mut arena = Arena::create(0, 1024, &mut source).unwrap();
    let capacity = arena.current().capacity();

    arena.allocate(Op::Alloc, 0, capacity - 16, &mut source).unwrap();
    assert_eq!(arena.chunks().len(), 1);
    let spill = arena.allocate(Op::Alloc, 0, 32, &mut source).unwrap();
    assert_eq!(arena.chunks().len(), 2);
    assert_eq!(spill, Some(arena.chunks()[1].start()));
    assert_eq!(source.budget().drawn(), 2 * arena.block_size());

    arena.release(0, &mut source);
  }

  #[test]
  fn test_rewind_reuses_every_chunk() {
    let mut source = source();
    let mut arena = Arena::create(0, 256, &mut source).unwrap();
    let capacity = arena.current().capacity();

    let mut first_round = Vec::new();
    for _ in 0..3 {
      first_round.push(addr(arena.allocate(Op::Alloc, 0, capacity, &mut source).unwrap()));
    }
    assert_eq!(arena.chunks().len(), 3);
    let drawn = source.budget().drawn();

    arena.rewind();
    for &expected in &first_round {
      assert_eq!(addr(arena.allocate(Op::Alloc, 0, capacity, &mut source).unwrap()), expected);
    }
    assert_eq!(arena.chunks().len(), 3);
    assert_eq!(source.budget().drawn(), drawn);

    arena.release(0, &mut source);
  }

  #[test]
  fn test_scan_skips_chunks_too_small() {
    let mut source = source();
    let mut arena = Arena::create(0, 256, &mut source).unwrap();
    let capacity = arena.current().capacity();

    arena.allocate(Op::Alloc, 0, capacity, &mut source).unwrap();
    arena.allocate(Op::Alloc, 0, capacity, &mut source).unwrap();
    arena.rewind();

    // Larger than any retained chunk: walks the whole chain, then grows.
    arena.allocate(Op::Alloc, 0, 4 * capacity, &mut source).unwrap();
    assert_eq!(arena.chunks().len(), 3);
    assert!(arena.chunks().iter().all(|chunk| chunk.generation() == 1));

    arena.release(0, &mut source);
  }

  #[test]
  fn test_growth_after_rewind_keeps_retained_chunks_reachable() {
    let mut source = source();
    let mut arena = Arena::create(0, 256, &mut source).unwrap();
    let capacity = arena.current().capacity();

    let mut retained = Vec::new();
    for _ in 0..3 {
      retained.push(arena.allocate(Op::Alloc, 0, capacity, &mut source).unwrap());
    }
    arena.rewind();
    assert_eq!(arena.allocate(Op::Alloc, 0, capacity, &mut source).unwrap(), retained[0]);

    // Skips the two retained chunks, then draws one of its own.
    arena.allocate(Op::Alloc, 0, 4 * capacity, &mut source).unwrap();
    assert_eq!(arena.chunks().len(), 4);
    let drawn = source.budget().drawn();

    assert_eq!(arena.allocate(Op::Alloc, 0, capacity, &mut source).unwrap(), retained[1]);
    assert_eq!(arena.allocate(Op::Alloc, 0, capacity, &mut source).unwrap(), retained[2]);
    assert_eq!(arena.chunks().len(), 4);
    assert_eq!(source.budget().drawn(), drawn);

    arena.allocate(Op::Alloc, 0, capacity, &mut source).unwrap();
    assert_eq!(arena.chunks().len(), 5);

    arena.release(0, &mut source);
  }

  #[test]
  fn test_out_of_memory_leaves_arena_unchanged() {
    let budget = BudgetGuard::new(1 << 20);
    let mut source = ChunkAllocator::new(Limited::new(1), budget, None, LogLevel::Off);
    let mut arena = Arena::create(0, 256, &mut source).unwrap();
    let capacity = arena.current().capacity();
    arena.allocate(Op::Alloc, 0, capacity - 32, &mut source).unwrap();

    let err = arena.allocate(Op::Alloc, 0, 64, &mut source).unwrap_err();
    assert_eq!(err, ArenaError::OutOfMemory { op: Op::Alloc, arena: 0, bytes: 240 });
    assert_eq!(arena.chunks().len(), 1);
    assert_eq!(arena.current().available(), 32);

    // Still serves what fits.
    assert!(arena.allocate(Op::Alloc, 0, 32, &mut source).unwrap().is_some());

    arena.release(0, &mut source);
    assert_eq!(source.system().live, 0);
  }

  #[test]
  fn test_budget_exhaustion_is_fatal() {
    let mut source = ChunkAllocator::new(Malloc, BudgetGuard::new(4080), None, LogLevel::Off);
    let mut arena = Arena::create(0, 4096, &mut source).unwrap();

    let err = arena.allocate(Op::Alloc, 0, 5000, &mut source).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
      err,
      ArenaError::BudgetExceeded { bytes: 5024, drawn: 4080, ceiling: 4080, .. }
    ));

    arena.release(0, &mut source);
  }

  #[test]
  fn test_calloc_zeroes_whole_region() {
    let mut source = source();
    let mut arena = Arena::create(0, 1024, &mut source).unwrap();
    let start = arena.current().start();
    unsafe { ptr::write_bytes(start.as_ptr(), 0xFF, arena.current().capacity()) };

    let ptr = arena.allocate_zeroed(0, 25, 4, &mut source).unwrap().unwrap();
    assert_eq!(ptr, start);
    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 112) };
    assert!(bytes.iter().all(|&b| b == 0));

    arena.release(0, &mut source);
  }

  proptest! {
    #[test]
    fn allocations_are_aligned_disjoint_and_owned(sizes in prop::collection::vec(1usize..3000, 1..64)) {
      let mut source = source();
      let mut arena = Arena::create(0, 1024, &mut source).unwrap();

      let mut served: Vec<(usize, usize, usize)> = Vec::new();
      for &size in &sizes {
        let ptr = arena.allocate(Op::Alloc, 0, size, &mut source).unwrap().unwrap();
        let at = ptr.as_ptr() as usize;
        prop_assert_eq!(at % MAX_ALIGN, 0);
        prop_assert!(arena.owns(ptr.as_ptr(), size));

        // Same chunk as the previous one means strictly further along it.
        if let Some(&(prev_at, prev_size, prev_chunks)) = served.last() {
          if prev_chunks == arena.chunks().len() {
            prop_assert!(at >= prev_at + prev_size);
          }
        }
        served.push((at, size, arena.chunks().len()));
      }

      served.sort();
      for pair in served.windows(2) {
        prop_assert!(pair[0].0 + pair[0].1 <= pair[1].0);
      }
      arena.release(0, &mut source);
    }

    #[test]
    fn rewind_keeps_the_budget(sizes in prop::collection::vec(1usize..2000, 1..32), reuse in 1usize..256) {
      let mut source = source();
      let mut arena = Arena::create(0, 512, &mut source).unwrap();
      let first = arena.current().start();

      for &size in &sizes {
        arena.allocate(Op::Alloc, 0, size, &mut source).unwrap();
      }
      let drawn = source.budget().drawn();
      prop_assert_eq!(drawn, arena.drawn());

      arena.rewind();
      prop_assert_eq!(arena.allocate(Op::Alloc, 0, reuse, &mut source).unwrap(), Some(first));
      prop_assert_eq!(source.budget().drawn(), drawn);

      arena.release(0, &mut source);
      prop_assert_eq!(source.budget().drawn(), 0);
    }
  }
}
