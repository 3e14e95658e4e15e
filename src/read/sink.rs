//! Columnar sink: the pipeline callbacks that materialise a frame
//!
//! The parse engine drives a [`ParseSink`] through a fixed callback order
//! per pass: negotiate (once), allocate, then per worker prepare →
//! postprocess → order (serialised) → commit, and finally finalise. The
//! sink owns the columns under construction, the global string arenas, and
//! the allocator; all run state lives here so that nothing survives a read
//! but the returned frame.

use super::arena::GlobalArena;
use super::encoding::{decode_windows_1252, is_valid_utf8};
use super::hooks::ReaderHooks;
use super::options::ReadOptions;
use super::stage::{RowBuffers, RowLayout, WorkerStage};
use crate::data::{FieldType, LenOff};
use crate::frame::{Column, Frame};
use crate::storage::{ColumnAllocator, ARENA_BYTES_PER_ROW};
use crate::{FrameError, Result};

/// Callback surface the parse engine drives.
///
/// `negotiate`, `allocate`, and `finalise` run on the controlling thread;
/// the remaining callbacks may run concurrently in any number of workers,
/// except `order`, which the engine serialises in source chunk order.
/// Worker teardown is the drop of the [`WorkerStage`].
pub trait ParseSink: Sync {
    /// Present detected names and types to the override hook; `types` is
    /// revised in place. Called exactly once, before the first `allocate`.
    fn negotiate(&mut self, names: Vec<String>, types: &mut Vec<FieldType>) -> Result<()>;

    /// Create or re-shape the columns for a pass over `nrows` rows.
    fn allocate(&mut self, types: &[FieldType], nrows: usize) -> Result<()>;

    /// Staging layout for the current types. Valid after `allocate`.
    fn layout(&self) -> &RowLayout;

    /// Per-worker scratch for one pass.
    fn prepare_worker(&self) -> WorkerStage;

    /// Repair and stage the string bytes of one tokenized chunk, rewriting
    /// each `{len, off}` cell to its scratch end cursor.
    fn postprocess(&self, stage: &mut WorkerStage, rows: &mut RowBuffers, anchor: &[u8]);

    /// Reserve arena regions for this worker's staged bytes. Serialised in
    /// source chunk order by the engine.
    fn order(&self, stage: &mut WorkerStage) -> Result<()>;

    /// Move staged bytes into the arenas and stripe-copy the fixed-width
    /// cells into rows `row0 ..`. Safe to run concurrently across workers.
    fn commit(&self, stage: &WorkerStage, rows: &RowBuffers, row0: usize);

    /// Trim every column to the final row count.
    fn finalise(&mut self, nrows: usize) -> Result<()>;
}

/// Raw column write pointer, valid for one parallel phase.
struct SyncPtr(*mut u8);

// Safety: each pointer targets a column buffer that is only resized between
// parallel phases, and workers write disjoint row ranges.
unsafe impl Send for SyncPtr {}
unsafe impl Sync for SyncPtr {}

/// [`ParseSink`] building an in-memory or on-disk [`Frame`].
pub struct FrameSink<'a> {
    opts: &'a ReadOptions,
    hooks: &'a dyn ReaderHooks,
    names: Vec<String>,
    types: Vec<FieldType>,
    columns: Vec<Column>,
    arenas: Vec<GlobalArena>,
    allocator: Option<ColumnAllocator>,
    layout: RowLayout,
    targets: Vec<SyncPtr>,
    final_nrows: Option<usize>,
}

impl<'a> FrameSink<'a> {
    pub fn new(opts: &'a ReadOptions, hooks: &'a dyn ReaderHooks) -> Self {
        Self {
            opts,
            hooks,
            names: Vec::new(),
            types: Vec::new(),
            columns: Vec::new(),
            arenas: Vec::new(),
            allocator: None,
            layout: RowLayout::default(),
            targets: Vec::new(),
            final_nrows: None,
        }
    }

    /// Consume the sink after a successful read.
    pub fn into_frame(self) -> Result<Frame> {
        let nrows = self.final_nrows.ok_or_else(|| {
            FrameError::Invariant("frame requested before finalisation".to_string())
        })?;
        let names = self
            .names
            .iter()
            .zip(&self.types)
            .filter(|(_, t)| **t != FieldType::Drop)
            .map(|(n, _)| n.clone())
            .collect();
        Ok(Frame::new(self.columns, names, nrows))
    }

    fn debug(&self, msg: &str) {
        if self.opts.verbose {
            self.hooks.log_debug(msg);
        }
    }
}

impl ParseSink for FrameSink<'_> {
    fn negotiate(&mut self, names: Vec<String>, types: &mut Vec<FieldType>) -> Result<()> {
        self.hooks
            .override_columns(&names, types)
            .map_err(FrameError::Negotiation)?;
        self.names = names;
        Ok(())
    }

    fn allocate(&mut self, types: &[FieldType], nrows: usize) -> Result<()> {
        let first_pass = self.allocator.is_none();
        self.layout = RowLayout::new(types);

        if first_pass {
            // Estimate the output footprint and let the host pick the
            // backing strategy before any column exists.
            let mut footprint = 0usize;
            for &t in types {
                if let Some(ct) = t.column_type() {
                    footprint += ct.elem_size() * nrows;
                    if ct.is_string() {
                        footprint += ARENA_BYTES_PER_ROW * nrows;
                    }
                }
            }
            let dir = self.hooks.choose_destination(footprint);
            if let Some(d) = &dir {
                self.debug(&format!(
                    "Materialising {} columns (~{} bytes) under {}",
                    self.layout.ncols_out,
                    footprint,
                    d.display()
                ));
            }
            let allocator = ColumnAllocator::new(dir, types.len());

            for (i, &t) in types.iter().enumerate() {
                let Some(ct) = t.column_type() else { continue };
                let j = self.layout.slots[i].map(|s| s.col).unwrap_or(i);
                self.columns.push(allocator.alloc(ct, nrows, j)?);
            }
            self.allocator = Some(allocator);
        } else {
            // Type-bump pass: keep the column vector, re-shape only the
            // columns whose type changed.
            let allocator = self.allocator.as_ref().unwrap();
            for (i, &t) in types.iter().enumerate() {
                let Some(ct) = t.column_type() else { continue };
                let j = self.layout.slots[i]
                    .map(|s| s.col)
                    .ok_or_else(|| FrameError::Invariant("typed field without slot".into()))?;
                if self.columns[j].ctype() != ct {
                    self.debug(&format!(
                        "Column {} re-allocated as {:?} after type bump",
                        j, ct
                    ));
                }
                allocator.realloc(&mut self.columns[j], ct, nrows, j)?;
            }
        }
        self.types = types.to_vec();

        // Hand each string column's arena to its shared wrapper, reusing
        // wrappers that survived from the previous pass.
        let mut old = std::mem::take(&mut self.arenas);
        for slot in &self.layout.strings {
            if let Some(pos) = old.iter().position(|a| a.col_index() == slot.col) {
                let mut arena = old.swap_remove(pos);
                arena.reset();
                self.arenas.push(arena);
            } else {
                let buf = self.columns[slot.col].take_arena().ok_or_else(|| {
                    FrameError::Invariant("string column allocated without arena".into())
                })?;
                self.arenas.push(GlobalArena::new(buf, slot.col));
            }
        }

        // Raw write targets for the parallel commit phase; the buffers are
        // not resized again until finalisation.
        self.targets = self
            .columns
            .iter_mut()
            .map(|c| SyncPtr(c.data_mut().as_mut_ptr()))
            .collect();
        Ok(())
    }

    fn layout(&self) -> &RowLayout {
        &self.layout
    }

    fn prepare_worker(&self) -> WorkerStage {
        WorkerStage::new(&self.layout)
    }

    fn postprocess(&self, stage: &mut WorkerStage, rows: &mut RowBuffers, anchor: &[u8]) {
        let quote = self.opts.quote;
        let WorkerStage { strbufs, tmp } = stage;
        for s in strbufs.iter_mut() {
            // One-based end cursor within this worker's scratch.
            let mut off: i32 = 1;
            for n in 0..rows.nrows {
                let mut lo = LenOff::from_bits(rows.get8(n, s.idx8));
                if lo.len > 0 {
                    let len = lo.len as usize;
                    let start = lo.off as usize;
                    let mut src = &anchor[start..start + len];
                    // A field is quoted iff the byte before its span is the
                    // quote character; only then are doubled quotes escapes.
                    if quote != 0 && start > 0 && anchor[start - 1] == quote {
                        if let Some(collapsed) = collapse_doubled_quotes(src, quote, tmp) {
                            src = collapsed;
                        }
                    }
                    let cursor = (off - 1) as usize;
                    // Worst case the repair triples the field; grow so the
                    // write below can never run past the scratch.
                    if s.buf.len() < cursor + 3 * src.len() {
                        let newsize = s.buf.len() * 2 + 3 * src.len();
                        s.buf.resize(newsize, 0);
                    }
                    let written = if is_valid_utf8(src) {
                        s.buf[cursor..cursor + src.len()].copy_from_slice(src);
                        src.len()
                    } else {
                        decode_windows_1252(src, &mut s.buf[cursor..cursor + 3 * src.len()])
                    };
                    off += written as i32;
                    lo.off = off;
                } else if lo.len == 0 {
                    lo.off = off;
                } else {
                    debug_assert!(lo.is_na());
                    lo.off = -off;
                }
                rows.put8(n, s.idx8, lo.to_bits());
            }
            s.cursor = (off - 1) as usize;
        }
    }

    fn order(&self, stage: &mut WorkerStage) -> Result<()> {
        for (k, s) in stage.strbufs.iter_mut().enumerate() {
            s.base = self.arenas[k].reserve(s.cursor)?;
        }
        Ok(())
    }

    fn commit(&self, stage: &WorkerStage, rows: &RowBuffers, row0: usize) {
        // String columns: arena copy-in, then offsets rebased to the
        // reserved region (the sign carries NA-ness through unchanged).
        for (k, s) in stage.strbufs.iter().enumerate() {
            self.arenas[k].commit(s.base, &s.buf[..s.cursor]);
            let dest = self.targets[s.col].0 as *mut i32;
            let base = s.base as i32;
            for n in 0..rows.nrows {
                let lo = LenOff::from_bits(rows.get8(n, s.idx8));
                let v = if lo.off < 0 { lo.off - base } else { lo.off + base };
                unsafe { dest.add(row0 + 1 + n).write_unaligned(v) };
            }
        }

        // Fixed-width columns: stripe copies into disjoint row ranges.
        for (i, slot) in self.layout.slots.iter().enumerate() {
            let Some(slot) = slot else { continue };
            if self.types[i].is_string() {
                continue;
            }
            let ptr = self.targets[slot.col].0;
            match slot.width {
                8 => {
                    let dest = ptr as *mut u64;
                    for n in 0..rows.nrows {
                        let bits = rows.buf8[n * rows.size8 + slot.index];
                        unsafe { dest.add(row0 + n).write_unaligned(bits) };
                    }
                }
                4 => {
                    let dest = ptr as *mut u32;
                    for n in 0..rows.nrows {
                        let bits = rows.buf4[n * rows.size4 + slot.index];
                        unsafe { dest.add(row0 + n).write_unaligned(bits) };
                    }
                }
                _ => {
                    for n in 0..rows.nrows {
                        let byte = rows.buf1[n * rows.size1 + slot.index];
                        unsafe { ptr.add(row0 + n).write(byte) };
                    }
                }
            }
        }
    }

    fn finalise(&mut self, nrows: usize) -> Result<()> {
        // Return each arena to its column, trimmed to the committed cursor.
        for arena in std::mem::take(&mut self.arenas) {
            let j = arena.col_index();
            let (mut buf, cursor) = arena.finish()?;
            buf.resize(cursor)?;
            buf.flush()?;
            self.columns[j].set_arena(buf);
        }
        for col in &mut self.columns {
            let bytes = if col.ctype().is_string() {
                4 * (nrows + 1)
            } else {
                col.ctype().elem_size() * nrows
            };
            col.data_mut().resize(bytes)?;
            if col.ctype().is_string() {
                col.data_mut().as_mut_slice()[..4].copy_from_slice(&1i32.to_ne_bytes());
            }
            col.data_mut().flush()?;
            col.set_nrows(nrows);
        }
        self.targets.clear();
        self.final_nrows = Some(nrows);
        self.debug(&format!(
            "Finalised {} columns x {} rows",
            self.columns.len(),
            nrows
        ));
        Ok(())
    }
}

/// Collapse doubled quote characters in a quoted field. Returns `None` when
/// the field contains none (the common case, copied straight from source).
fn collapse_doubled_quotes<'t>(src: &[u8], quote: u8, tmp: &'t mut Vec<u8>) -> Option<&'t [u8]> {
    if !src.windows(2).any(|w| w[0] == quote && w[1] == quote) {
        return None;
    }
    tmp.clear();
    let mut i = 0;
    while i < src.len() {
        tmp.push(src[i]);
        if src[i] == quote && i + 1 < src.len() && src[i + 1] == quote {
            i += 2;
        } else {
            i += 1;
        }
    }
    Some(tmp.as_slice())
}
