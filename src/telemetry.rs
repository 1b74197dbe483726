//! Optional usage reporting.
//!
//! The registry calls a [`Telemetry`] observer when chunks are drawn or
//! released and, at [`LogLevel::Full`](crate::LogLevel::Full), for every
//! request it serves. None of this affects allocation.

use std::cell::RefCell;
use std::rc::Rc;

/// glibc switches from the heap to `mmap` for blocks of this size.
pub const MMAP_THRESHOLD: usize = 128 * 1024;

/// Where the system allocator most likely placed a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkClass {
  Heap,
  Mapped,
}

impl ChunkClass {
  pub fn of(bytes: usize) -> Self {
    if bytes < MMAP_THRESHOLD {
      ChunkClass::Heap
    } else {
      ChunkClass::Mapped
    }
  }
}

pub trait Telemetry {
  fn chunk_drawn(
    &mut self,
    arena: usize,
    bytes: usize,
    class: ChunkClass,
  );

  fn chunk_released(
    &mut self,
    _arena: usize,
    _bytes: usize,
  ) {
  }

  fn served(
    &mut self,
    _arena: usize,
    _bytes: usize,
  ) {
  }

  /// Called once when the registry is torn down.
  fn report(&self) {}
}

impl<T: Telemetry> Telemetry for Rc<RefCell<T>> {
  fn chunk_drawn(
    &mut self,
    arena: usize,
    bytes: usize,
    class: ChunkClass,
  ) {
    self.borrow_mut().chunk_drawn(arena, bytes, class)
  }

  fn chunk_released(
    &mut self,
    arena: usize,
    bytes: usize,
  ) {
    self.borrow_mut().chunk_released(arena, bytes)
  }

  fn served(
    &mut self,
    arena: usize,
    bytes: usize,
  ) {
    self.borrow_mut().served(arena, bytes)
  }

  fn report(&self) {
    self.borrow().report()
  }
}

/// Counters for one arena.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArenaUsage {
  pub granted_bytes: u64,
  pub chunk_count: u64,
  pub heap_chunks: u64,
  pub mapped_chunks: u64,
  pub released_bytes: u64,
  pub served_bytes: u64,
  pub served_count: u64,
}

/// Per-arena counters that log as they go and print a report at teardown.
#[derive(Debug, Clone)]
pub struct UsageCounters {
  arenas: Vec<ArenaUsage>,
}

impl UsageCounters {
  pub fn new(count: usize) -> Self {
    Self {
      arenas: vec![ArenaUsage::default(); count],
    }
  }

  pub fn arena(
    &self,
    arena: usize,
  ) -> Option<&ArenaUsage> {
    self.arenas.get(arena)
  }

  pub fn arenas(&self) -> &[ArenaUsage] {
    &self.arenas
  }

  /// Counters of `arena`, growing the table when the registry holds more
  /// arenas than these counters were sized for.
  fn usage_mut(
    &mut self,
    arena: usize,
  ) -> &mut ArenaUsage {
    if arena >= self.arenas.len() {
      self.arenas.resize_with(arena + 1, ArenaUsage::default);
    }
    &mut self.arenas[arena]
  }
}

impl Telemetry for UsageCounters {
  fn chunk_drawn(
    &mut self,
    arena: usize,
    bytes: usize,
    class: ChunkClass,
  ) {
    log::debug!("arena {arena}: drew a {bytes} byte chunk ({class:?})");
    let usage = self.usage_mut(arena);
    usage.granted_bytes += bytes as u64;
    usage.chunk_count += 1;
    match class {
      ChunkClass::Heap => usage.heap_chunks += 1,
      ChunkClass::Mapped => usage.mapped_chunks += 1,
    }
  }

  fn chunk_released(
    &mut self,
    arena: usize,
    bytes: usize,
  ) {
    log::debug!("arena {arena}: released a {bytes} byte chunk");
    self.usage_mut(arena).released_bytes += bytes as u64;
  }

  fn served(
    &mut self,
    arena: usize,
    bytes: usize,
  ) {
    log::trace!("arena {arena}: served {bytes} bytes");
    let usage = self.usage_mut(arena);
    usage.served_bytes += bytes as u64;
    usage.served_count += 1;
  }

  fn report(&self) {
    log::info!("Report of arena memory usage:");
    for (i, usage) in self.arenas.iter().enumerate() {
      log::info!(
        "Arena nr {i} was granted {} bytes of memory in {} allocations.",
        usage.granted_bytes,
        usage.chunk_count
      );
      if usage.served_count > 0 {
        log::info!(
          "Arena nr {i} gave away {} bytes of memory in {} serves.",
          usage.served_bytes,
          usage.served_count
        );
      }
    }
  }
}
