//! Column storage: raw byte buffers (heap or memory-mapped) and the
//! per-run column allocator.

mod alloc;
mod buffer;

pub use alloc::{ColumnAllocator, ARENA_BYTES_PER_ROW};
pub use buffer::ColumnBuffer;
