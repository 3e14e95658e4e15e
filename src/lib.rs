//! rapidframe columnar data-table engine
//!
//! A high-performance columnar table engine whose core is a parallel
//! delimited-text reader: memory-mapped input, a multi-threaded
//! parse-and-commit pipeline, and a lock-light shared string arena.

pub mod data;
pub mod frame;
pub mod read;
pub mod storage;

// Re-export main types
pub use data::{ColumnType, FieldType};
pub use frame::{Column, Frame};
pub use read::{read_csv, DefaultHooks, InputSource, ReadOptions, ReaderHooks};

/// Engine error type
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Allocation failed: {0}")]
    Allocation(String),

    #[error("Parse error at row {row}: {message}")]
    Parse { row: usize, message: String },

    #[error("Column override rejected: {0}")]
    Negotiation(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Column index {index} is invalid for a frame with {ncols} columns")]
    ColumnIndexOutOfRange { index: i64, ncols: usize },

    #[error("Cannot run multiple reads in parallel")]
    ConcurrentRun,

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
