use std::fmt;

/// Operation that produced an [`ArenaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
  Init,
  Create,
  Alloc,
  Calloc,
  Dealloc,
  Destroy,
}

impl fmt::Display for Op {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str(match self {
      Op::Init => "arena_init_arenas",
      Op::Create => "arena_create",
      Op::Alloc => "arena_alloc",
      Op::Calloc => "arena_calloc",
      Op::Dealloc => "arena_dealloc",
      Op::Destroy => "arena_destroy",
    })
  }
}

/// Failures of the arena registry.
///
/// Only [`ArenaError::OutOfMemory`] from `alloc` or `calloc` is recoverable.
/// Everything else, an arena whose first chunk can't be drawn included, is
/// fatal and should end the process, see [`ArenaError::terminate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
  /// The system allocator could not hand out a chunk.
  #[error("{op}: out of memory drawing a {bytes} byte chunk for arena {arena}")]
  OutOfMemory { op: Op, arena: usize, bytes: usize },
  #[error("{op}: the registry needs at least one arena")]
  NoArenas { op: Op },
  #[error("{op}: bad arena {arena}: the registry holds {count} arenas")]
  BadArena { op: Op, arena: usize, count: usize },
  #[error("{op}: arena {arena} has not been created")]
  NotCreated { op: Op, arena: usize },
  #[error("{op}: arena {arena} is already created")]
  AlreadyCreated { op: Op, arena: usize },
  #[error("{op}: the chunk size requested for arena {arena} is too small: {size}")]
  ChunkTooSmall { op: Op, arena: usize, size: usize },
  #[error("{op}: request of {size} bytes for arena {arena} can never be satisfied")]
  RequestTooLarge { op: Op, arena: usize, size: usize },
  #[error("{op}: {nelem} elements of {elem_size} bytes overflow for arena {arena}")]
  ArrayOverflow {
    op: Op,
    arena: usize,
    nelem: usize,
    elem_size: usize,
  },
  #[error(
    "{op}: drawing {bytes} bytes for arena {arena} exceeds the memory budget ({drawn} of {ceiling} bytes drawn)"
  )]
  BudgetExceeded {
    op: Op,
    arena: usize,
    bytes: usize,
    drawn: usize,
    ceiling: usize,
  },
}

impl ArenaError {
  /// `false` only when the system allocator runs dry while serving a request.
  pub fn is_fatal(&self) -> bool {
    !matches!(
      self,
      ArenaError::OutOfMemory {
        op: Op::Alloc | Op::Calloc,
        ..
      }
    )
  }

  /// Reports the error and aborts the process.
  pub fn terminate(&self) -> ! {
    log::error!("{self}");
    eprintln!("{self}\nAborting.");
    std::process::abort()
  }
}

pub type Result<T, E = ArenaError> = std::result::Result<T, E>;
