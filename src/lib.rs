//! # chunkarena - Lifetime-Based Arena Allocation
//!
//! This crate provides **arenas** layered on top of the C library's `malloc`:
//! many small, short-lived objects are bump-allocated out of large chunks and
//! released all at once when their lifetime ends.
//!
//! ## Overview
//!
//! ```text
//!   Arena 0:
//!
//!   ┌──────────────────────┐   ┌──────────────────────┐   ┌────────────────────────────┐
//!   │ hdr │ A1 │ A2 │ A3 │ │ → │ hdr │ A4 │ A5 │      │ → │ hdr │ B1 (oversized)       │
//!   └──────────────────────┘   └──────────────────────┘   └────────────────────────────┘
//!                                              ▲
//!                                              └── cursor of the current chunk
//!
//!   Each allocation bumps the cursor of the current chunk: O(1).
//!   A full chunk links a new one, sized max(default, request).
//! ```
//!
//! Arenas live in a fixed table, the [`Registry`], addressed by small integer
//! handles. An arena can be
//!
//! - **deallocated** ([`Registry::dealloc`]): every object is forgotten but
//!   the chunks are kept and reused by the next allocations;
//! - **destroyed** ([`Registry::destroy`]): every chunk goes back to malloc.
//!
//! ## Crate Structure
//!
//! ```text
//!   chunkarena
//!   ├── align      - Overflow-safe padding and chunk sizing (align_down!)
//!   ├── budget     - Process-wide cap on bytes drawn from malloc
//!   ├── bump       - Bump allocation over an arena's chunk chain
//!   ├── chunk      - Chunk layout and the chunk allocator
//!   ├── config     - ARENAS_LOG_LEVEL and budget settings
//!   ├── error      - ArenaError, recoverable vs fatal
//!   ├── registry   - The arena table
//!   ├── sys        - Page size, physical memory, malloc
//!   └── telemetry  - Optional usage counters and exit report
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use chunkarena::{Config, Registry};
//!
//! let mut arenas = Registry::with_config(2, Config::from_env()).unwrap_or_else(|e| e.terminate());
//! arenas.create(0, 4096).unwrap_or_else(|e| e.terminate());
//!
//! let first = arenas.alloc(0, 100).unwrap().unwrap();
//! let second = arenas.alloc(0, 100).unwrap().unwrap();
//! assert_eq!(second.as_ptr() as usize - first.as_ptr() as usize, 112);
//!
//! // End of the lifetime: everything goes, the memory stays.
//! arenas.dealloc(0).unwrap();
//! assert_eq!(arenas.alloc(0, 50).unwrap(), Some(first));
//! ```
//!
//! ## Chunk Sizing
//!
//! ```text
//!   chunk_size (e.g. 4096) = what malloc really carves from the heap
//!   ┌──────────┬────────┬──────────────────────────────────────┬───────┐
//!   │ malloc 8 │ hdr 16 │         usable storage (4064)        │ pad 8 │
//!   └──────────┴────────┴──────────────────────────────────────┴───────┘
//!              └──────── block asked of malloc (4080) ─────────┘
//!
//!   The pad is whatever rounding the block down to MAX_ALIGN drops.
//! ```
//!
//! Malloc's per-block overhead is subtracted before the block is requested,
//! so page sized chunks (or whole multiples and fractions of a page) keep the
//! heap tidy. [`recommended_chunk_size`] returns the page size.
//!
//! ## Errors
//!
//! Running out of memory in malloc while serving `alloc` or `calloc` is the
//! only recoverable failure ([`ArenaError::OutOfMemory`]). An arena that
//! can't get its first chunk, bad handles, degenerate chunk sizes,
//! overflowing requests and an exceeded budget are caller bugs: they come
//! back as fatal [`ArenaError`] variants, which the caller is expected to end
//! the process with ([`ArenaError::terminate`]).
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization; give each thread its own
//!   registry
//! - **No individual free or realloc**: use malloc for growable buffers
//! - **No drop**: objects in an arena are never dropped
//! - **Unix-only**: requires `libc` (POSIX systems)
//!
//! ## Safety
//!
//! Pointers handed out are raw. They stay valid until the next
//! [`dealloc`](Registry::dealloc) or [`destroy`](Registry::destroy) of their
//! arena, and dereferencing them is up to the caller.

pub mod align;
mod budget;
mod bump;
mod chunk;
mod config;
mod error;
mod registry;
mod sys;
mod telemetry;

pub use align::{MALLOC_OVERHEAD, MAX_ALIGN, MAX_OFFSET};
pub use budget::BudgetGuard;
pub use chunk::HEADER_SIZE;
pub use config::{Config, LOG_LEVEL_VAR, LogLevel};
pub use error::{ArenaError, Op, Result};
pub use registry::{MIN_CHUNK_SIZE, Registry};
pub use sys::{Malloc, PAGE_SIZE, SystemAllocator, available_memory, recommended_chunk_size};
pub use telemetry::{ArenaUsage, ChunkClass, MMAP_THRESHOLD, Telemetry, UsageCounters};
