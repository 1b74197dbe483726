use std::ptr::NonNull;

use crate::budget::BudgetGuard;
use crate::bump::Arena;
use crate::chunk::ChunkAllocator;
use crate::config::{Config, LogLevel};
use crate::error::{ArenaError, Op, Result};
use crate::sys::{self, Malloc, SystemAllocator};
use crate::telemetry::{Telemetry, UsageCounters};

/// Smallest chunk size [`Registry::create`] accepts.
pub const MIN_CHUNK_SIZE: usize = 40;

/// Chunk sizes below this still work but waste a large share of each block.
const SMALL_CHUNK_SIZE: usize = 1024;

/// Fixed table of arenas addressed by small integer handles.
///
/// The registry owns every chunk of every arena together with the memory
/// budget. It is meant to be built once at startup and handed by reference
/// to the code that allocates; dropping it releases all chunks and emits the
/// telemetry report.
///
/// The registry performs no locking and is neither `Send` nor `Sync`.
/// Threads that need arenas get their own registry.
pub struct Registry<S: SystemAllocator = Malloc> {
  slots: Vec<Option<Arena>>,
  chunks: ChunkAllocator<S>,
}

impl Registry<Malloc> {
  /// Sets up `count` arenas over malloc, configured from the environment.
  pub fn init_arenas(count: usize) -> Result<Self> {
    Self::with_config(count, Config::from_env())
  }

  pub fn with_config(
    count: usize,
    config: Config,
  ) -> Result<Self> {
    Self::with_system(count, config, Malloc, None)
  }
}

impl<S: SystemAllocator> Registry<S> {
  /// Sets up `count` arenas over `system`.
  ///
  /// Without a `telemetry` observer, [`UsageCounters`] are installed when the
  /// configured level is above `Off`.
  pub fn with_system(
    count: usize,
    config: Config,
    system: S,
    telemetry: Option<Box<dyn Telemetry>>,
  ) -> Result<Self> {
    if count == 0 {
      return Err(ArenaError::NoArenas { op: Op::Init });
    }

    let ceiling = config.budget_ceiling.unwrap_or_else(sys::available_memory);
    let telemetry = match telemetry {
      Some(telemetry) => Some(telemetry),
      None if config.log_level > LogLevel::Off => {
        Some(Box::new(UsageCounters::new(count)) as Box<dyn Telemetry>)
      }
      None => None,
    };
    log::debug!(
      "initialized {count} arenas, budget {ceiling} bytes, telemetry {:?}",
      config.log_level
    );

    Ok(Self {
      slots: (0..count).map(|_| None).collect(),
      chunks: ChunkAllocator::new(system, BudgetGuard::new(ceiling), telemetry, config.log_level),
    })
  }

  /// Creates arena `id` and draws its first chunk.
  ///
  /// `chunk_size` is the size of malloc's blocks for this arena: malloc's
  /// own overhead and the chunk header come out of it. Page sized chunks, or
  /// whole multiples and fractions of the page size, keep the heap tidy.
  pub fn create(
    &mut self,
    id: usize,
    chunk_size: usize,
  ) -> Result<()> {
    let slot = self.slot(Op::Create, id)?;
    if slot.is_some() {
      return Err(ArenaError::AlreadyCreated { op: Op::Create, arena: id });
    }
    if chunk_size < MIN_CHUNK_SIZE {
      return Err(ArenaError::ChunkTooSmall {
        op: Op::Create,
        arena: id,
        size: chunk_size,
      });
    }

    let page = *sys::PAGE_SIZE;
    if chunk_size < SMALL_CHUNK_SIZE {
      log::warn!("arena {id}: chunk size {chunk_size} is below {SMALL_CHUNK_SIZE} bytes");
    } else if chunk_size % page != 0 && page % chunk_size != 0 {
      log::debug!("arena {id}: chunk size {chunk_size} does not line up with the {page} byte page");
    }

    let arena = Arena::create(id, chunk_size, &mut self.chunks)?;
    log::debug!(
      "arena {id}: created with {} byte chunks, {} usable",
      arena.block_size(),
      arena.chunks()[0].capacity()
    );
    self.slots[id] = Some(arena);
    Ok(())
  }

  /// Serves `size` bytes from arena `id`, aligned to
  /// [`MAX_ALIGN`](crate::MAX_ALIGN).
  ///
  /// Returns `Ok(None)` for a zero-byte request. Only the last byte and the
  /// padding after it are zeroed; use [`calloc`](Self::calloc) for zeroed
  /// memory. The pointer stays valid until the next `dealloc` or `destroy`
  /// of the arena.
  #[inline]
  pub fn alloc(
    &mut self,
    id: usize,
    size: usize,
  ) -> Result<Option<NonNull<u8>>> {
    let (arena, chunks) = self.arena(Op::Alloc, id)?;
    arena.allocate(Op::Alloc, id, size, chunks)
  }

  /// Serves a zeroed array of `nelem` elements of `elem_size` bytes.
  pub fn calloc(
    &mut self,
    id: usize,
    nelem: usize,
    elem_size: usize,
  ) -> Result<Option<NonNull<u8>>> {
    let (arena, chunks) = self.arena(Op::Calloc, id)?;
    arena.allocate_zeroed(id, nelem, elem_size, chunks)
  }

  /// Ends the lifetime of everything allocated from arena `id`.
  ///
  /// Chunks are kept and reused by the next allocations, so the budget is
  /// unchanged. Does nothing for an arena that was never created.
  pub fn dealloc(
    &mut self,
    id: usize,
  ) -> Result<()> {
    match self.slot(Op::Dealloc, id)? {
      Some(arena) => arena.rewind(),
      None => log::debug!("arena {id}: dealloc of an arena that was never created"),
    }
    Ok(())
  }

  /// Returns every chunk of arena `id` to the system allocator.
  ///
  /// The slot can be created again afterwards.
  pub fn destroy(
    &mut self,
    id: usize,
  ) -> Result<()> {
    if let Some(arena) = self.slot(Op::Destroy, id)?.take() {
      log::debug!("arena {id}: destroyed, releasing {} bytes", arena.drawn());
      arena.release(id, &mut self.chunks);
    }
    Ok(())
  }

  /// Number of arena slots.
  pub fn count(&self) -> usize {
    self.slots.len()
  }

  pub fn is_created(
    &self,
    id: usize,
  ) -> bool {
    matches!(self.slots.get(id), Some(Some(_)))
  }

  /// Bytes arena `id` holds from the system allocator; zero if not created.
  pub fn arena_drawn(
    &self,
    id: usize,
  ) -> usize {
    self.created(id).map_or(0, Arena::drawn)
  }

  pub fn chunk_count(
    &self,
    id: usize,
  ) -> usize {
    self.created(id).map_or(0, |arena| arena.chunks().len())
  }

  /// Whether `len` bytes at `ptr` lie inside a chunk of arena `id`.
  pub fn owns(
    &self,
    id: usize,
    ptr: *const u8,
    len: usize,
  ) -> bool {
    self.created(id).is_some_and(|arena| arena.owns(ptr, len))
  }

  pub fn budget(&self) -> &BudgetGuard {
    self.chunks.budget()
  }

  fn created(
    &self,
    id: usize,
  ) -> Option<&Arena> {
    self.slots.get(id).and_then(Option::as_ref)
  }

  fn slot(
    &mut self,
    op: Op,
    id: usize,
  ) -> Result<&mut Option<Arena>> {
    let count = self.slots.len();
    self.slots.get_mut(id).ok_or(ArenaError::BadArena { op, arena: id, count })
  }

  fn arena(
    &mut self,
    op: Op,
    id: usize,
  ) -> Result<(&mut Arena, &mut ChunkAllocator<S>)> {
    let count = self.slots.len();
    match self.slots.get_mut(id) {
      Some(Some(arena)) => Ok((arena, &mut self.chunks)),
      Some(None) => Err(ArenaError::NotCreated { op, arena: id }),
      None => Err(ArenaError::BadArena { op, arena: id, count }),
    }
  }
}

impl<S: SystemAllocator> Drop for Registry<S> {
  fn drop(&mut self) {
    for (id, slot) in self.slots.iter_mut().enumerate() {
      if let Some(arena) = slot.take() {
        arena.release(id, &mut self.chunks);
      }
    }
    self.chunks.report();
  }
}
