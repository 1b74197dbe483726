//! Overflow-safe size arithmetic.
//!
//! Sizes are validated against [`MAX_OFFSET`] and then handled as signed
//! offsets, so a subtraction that goes slightly negative stays a small
//! negative number instead of wrapping into a huge unsigned one.

/// Alignment of every pointer handed out by an arena.
pub const MAX_ALIGN: usize = 16;

/// Largest byte count an arena will consider.
pub const MAX_OFFSET: usize = isize::MAX as usize;

/// Bytes the system allocator keeps for itself in front of each block.
pub const MALLOC_OVERHEAD: usize = 8;

/// Rounds `value` down to a multiple of `align`, which must be a power of two.
///
/// # Examples
///
/// ```rust
/// use chunkarena::align_down;
///
/// assert_eq!(align_down!(4088, 16), 4080);
/// assert_eq!(align_down!(4096, 16), 4096);
/// ```
#[macro_export]
macro_rules! align_down {
  ($value:expr, $align:expr) => {
    ($value) & !(($align) - 1)
  };
}

/// A request rounded up so the next one starts on a `MAX_ALIGN` boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padded {
  /// Request plus padding.
  pub bytes: usize,
  /// Trailing bytes added to the request.
  pub padding: usize,
}

/// Padding that brings `size` up to the next `MAX_ALIGN` boundary.
#[inline]
pub const fn padding(size: isize) -> isize {
  size.wrapping_neg() & (MAX_ALIGN as isize - 1)
}

/// Pads a non-zero request, or `None` if the padded size leaves `MAX_OFFSET`.
#[inline]
pub fn pad(size: usize) -> Option<Padded> {
  if size == 0 || size > MAX_OFFSET {
    return None;
  }
  let size = size as isize;
  let padding = padding(size);
  if size > isize::MAX - padding {
    return None;
  }
  Some(Padded {
    bytes: (size + padding) as usize,
    padding: padding as usize,
  })
}

/// `bytes + header`, refusing to compute a wrapped result.
#[inline]
pub fn with_header(
  bytes: usize,
  header: usize,
) -> Option<usize> {
  let (bytes, header) = (isize::try_from(bytes).ok()?, isize::try_from(header).ok()?);
  if bytes > isize::MAX - header {
    return None;
  }
  Some((bytes + header) as usize)
}

/// Block size for a configured chunk size.
///
/// The system allocator's own overhead is taken off first and the result is
/// rounded down to `MAX_ALIGN`, so a chunk size of 4096 keeps malloc's real
/// block at exactly one page. `None` when nothing usable would remain past
/// `header`.
pub fn chunk_block_size(
  chunk_size: usize,
  header: usize,
) -> Option<usize> {
  if chunk_size > MAX_OFFSET {
    return None;
  }
  let net = chunk_size.checked_sub(MALLOC_OVERHEAD)?;
  if net < MAX_ALIGN {
    return None;
  }
  let block = align_down!(net, MAX_ALIGN);
  (block > header).then_some(block)
}
