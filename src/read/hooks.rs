//! External collaborator hooks
//!
//! The reader calls out in exactly three places: once to let the host
//! override detected column names/types, once to choose where columns are
//! materialised, and repeatedly to report progress. The hooks are
//! synchronous and must not re-enter the reader.

use crate::data::FieldType;
use std::path::PathBuf;

/// Capability set handed to the reader at construction.
pub trait ReaderHooks: Sync {
    /// Inspect the detected column names and revise `types` in place:
    /// set entries to [`FieldType::Drop`] to exclude columns, or promote
    /// them to wider types. Returning an error rejects the read.
    fn override_columns(
        &self,
        names: &[String],
        types: &mut [FieldType],
    ) -> std::result::Result<(), String> {
        let _ = (names, types);
        Ok(())
    }

    /// Pick the backing strategy given the estimated total byte footprint:
    /// `None` keeps columns on the heap, `Some(dir)` materialises them as
    /// memory-mapped files under `dir`.
    fn choose_destination(&self, estimated_bytes: usize) -> Option<PathBuf> {
        let _ = estimated_bytes;
        None
    }

    /// Progress report, `percent` in `[0, 100]`.
    fn progress(&self, percent: f64) {
        let _ = percent;
    }

    /// Verbose-mode diagnostics.
    fn log_debug(&self, message: &str) {
        log::debug!("{message}");
    }
}

/// No-op hooks: heap columns, no overrides, debug output to the log facade.
pub struct DefaultHooks;

impl ReaderHooks for DefaultHooks {}
