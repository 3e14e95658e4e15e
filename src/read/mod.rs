//! Parallel delimited-text reader
//!
//! Entry point and per-run wiring: the input buffer, the parse engine, and
//! the columnar sink. A process-wide guard rejects a second concurrent
//! read before any state is touched; all other run state is owned by the
//! controller objects and torn down on every exit path.

mod arena;
mod encoding;
mod engine;
mod hooks;
mod input;
mod options;
mod sink;
mod stage;

pub use hooks::{DefaultHooks, ReaderHooks};
pub use input::{InputBuffer, InputSource};
pub use options::ReadOptions;

use crate::frame::Frame;
use crate::{FrameError, Result};
use engine::ParseEngine;
use sink::FrameSink;
use std::sync::atomic::{AtomicBool, Ordering};

static READ_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Marks this process as running a read; released on drop.
struct ActiveReadGuard;

impl ActiveReadGuard {
    fn acquire() -> Result<Self> {
        if READ_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FrameError::ConcurrentRun);
        }
        Ok(ActiveReadGuard)
    }
}

impl Drop for ActiveReadGuard {
    fn drop(&mut self) {
        READ_ACTIVE.store(false, Ordering::Release);
    }
}

/// Read delimited text into a [`Frame`].
///
/// The three hook calls (`override_columns`, `choose_destination`,
/// `progress`) are the only places this function calls out; pass
/// [`DefaultHooks`] for an in-memory read with no overrides.
pub fn read_csv(
    source: InputSource,
    options: &ReadOptions,
    hooks: &dyn ReaderHooks,
) -> Result<Frame> {
    let _guard = ActiveReadGuard::acquire()?;
    let input = InputBuffer::open(source)?;
    let mut sink = FrameSink::new(options, hooks);
    let mut engine = ParseEngine::new(input.data(), options, hooks);
    engine.run(&mut sink)?;
    sink.into_frame()
}
