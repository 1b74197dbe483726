use std::ptr::{self, NonNull};

use chunkarena::{Config, LogLevel, Registry, recommended_chunk_size};

const PARSE: usize = 0;
const SCRATCH: usize = 1;

/// Prints where a request landed and how the budget moved.
fn print_alloc(
  arenas: &Registry,
  arena: usize,
  size: usize,
  addr: Option<NonNull<u8>>,
) {
  println!(
    "Arena {} served {} bytes, address = {:?}, chunks = {}, drawn = {} bytes",
    arena,
    size,
    addr.map(NonNull::as_ptr),
    arenas.chunk_count(arena),
    arenas.budget().drawn(),
  );
}

fn main() {
  // Set ARENAS_LOG_LEVEL=2 and RUST_LOG=trace to see every chunk and serve.
  env_logger::init();

  let mut config = Config::from_env();
  if config.log_level == LogLevel::Off {
    config = config.with_log_level(LogLevel::Chunks);
  }
  let mut arenas = Registry::with_config(2, config).unwrap_or_else(|e| e.terminate());
  let page = recommended_chunk_size();
  println!("Page size {page}, budget {} bytes", arenas.budget().ceiling());

  arenas.create(PARSE, page).unwrap_or_else(|e| e.terminate());
  arenas.create(SCRATCH, page / 4).unwrap_or_else(|e| e.terminate());

  // --------------------------------------------------------------------
  // 1) A handful of small objects: consecutive, 16-byte aligned.
  // --------------------------------------------------------------------
  println!("\n[1] Small objects");
  let first = arenas.alloc(PARSE, 100).unwrap_or_else(|e| e.terminate());
  print_alloc(&arenas, PARSE, 100, first);
  let second = arenas.alloc(PARSE, 100).unwrap_or_else(|e| e.terminate());
  print_alloc(&arenas, PARSE, 100, second);

  // --------------------------------------------------------------------
  // 2) A zeroed array in the scratch arena.
  // --------------------------------------------------------------------
  println!("\n[2] Zeroed array of 64 u32");
  let table = arenas.calloc(SCRATCH, 64, 4).unwrap_or_else(|e| e.terminate());
  print_alloc(&arenas, SCRATCH, 256, table);
  if let Some(table) = table {
    let table = table.cast::<u32>().as_ptr();
    unsafe {
      for i in 0..64 {
        table.add(i).write(i as u32 * 3);
      }
      println!("[2] table[63] = {}", table.add(63).read());
    }
  }

  // --------------------------------------------------------------------
  // 3) Fill the scratch arena past its first chunk.
  // --------------------------------------------------------------------
  println!("\n[3] Grow the scratch arena");
  for _ in 0..40 {
    let addr = arenas.alloc(SCRATCH, 48).unwrap_or_else(|e| e.terminate());
    if let Some(addr) = addr {
      unsafe { ptr::write_bytes(addr.as_ptr(), 0xAB, 48) };
    }
  }
  print_alloc(&arenas, SCRATCH, 48, None);

  // --------------------------------------------------------------------
  // 4) One request bigger than a whole chunk gets a chunk of its own.
  // --------------------------------------------------------------------
  println!("\n[4] Oversized request");
  let big = arenas.alloc(PARSE, 64 * 1024).unwrap_or_else(|e| e.terminate());
  print_alloc(&arenas, PARSE, 64 * 1024, big);

  // --------------------------------------------------------------------
  // 5) End of the parse lifetime: reuse the memory.
  // --------------------------------------------------------------------
  println!("\n[5] Deallocate the parse arena");
  let drawn = arenas.budget().drawn();
  arenas.dealloc(PARSE).unwrap_or_else(|e| e.terminate());
  let again = arenas.alloc(PARSE, 50).unwrap_or_else(|e| e.terminate());
  print_alloc(&arenas, PARSE, 50, again);
  println!(
    "[5] again == first? {}, budget unchanged? {}",
    if again == first { "Yes, the first chunk is reused" } else { "No" },
    arenas.budget().drawn() == drawn
  );

  // --------------------------------------------------------------------
  // 6) Destroy the scratch arena: its chunks go back to malloc.
  // --------------------------------------------------------------------
  println!("\n[6] Destroy the scratch arena");
  arenas.destroy(SCRATCH).unwrap_or_else(|e| e.terminate());
  println!("[6] drawn = {} bytes", arenas.budget().drawn());

  // Dropping the registry releases the rest and logs the usage report.
  println!("\n[7] End of example.");
}
