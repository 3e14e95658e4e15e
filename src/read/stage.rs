//! Per-worker staging: cell layout, stripe buffers, string scratch
//!
//! The tokenizer writes one row at a time into three row-major stripe
//! buffers (8-, 4-, and 1-byte cells). String cells stage a `{len, off}`
//! descriptor in an 8-byte slot; their bytes are carried per worker in a
//! growable scratch buffer until the ordered commit moves them into the
//! global arena.

use crate::data::FieldType;

/// Staging slot of one non-dropped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlot {
    /// Cell width in bytes: 1, 4, or 8.
    pub width: u8,
    /// Index among the slots of the same width.
    pub index: usize,
    /// Output column index in the frame.
    pub col: usize,
}

/// Slot bookkeeping for one string field.
#[derive(Debug, Clone, Copy)]
pub struct StrSlot {
    /// Index among the 8-byte slots.
    pub idx8: usize,
    /// Output column index in the frame.
    pub col: usize,
}

/// Row-major staging layout derived from the field types. Dropped fields
/// consume no slot in any stripe buffer and no output column index.
#[derive(Debug, Default)]
pub struct RowLayout {
    /// Per input field; `None` for dropped fields.
    pub slots: Vec<Option<FieldSlot>>,
    /// 8-, 4-, and 1-byte cells per row.
    pub size8: usize,
    pub size4: usize,
    pub size1: usize,
    /// One entry per string field, in field order.
    pub strings: Vec<StrSlot>,
    /// Output column count.
    pub ncols_out: usize,
}

impl RowLayout {
    pub fn new(types: &[FieldType]) -> Self {
        let mut layout = RowLayout::default();
        let (mut off8, mut off4, mut off1) = (0usize, 0usize, 0usize);
        let mut col = 0usize;
        for &t in types {
            let slot = match t.cell_size() {
                0 => None,
                1 => {
                    off1 += 1;
                    Some(FieldSlot { width: 1, index: off1 - 1, col })
                }
                4 => {
                    off4 += 1;
                    Some(FieldSlot { width: 4, index: off4 - 1, col })
                }
                _ => {
                    off8 += 1;
                    Some(FieldSlot { width: 8, index: off8 - 1, col })
                }
            };
            if let Some(s) = slot {
                if t.is_string() {
                    layout.strings.push(StrSlot { idx8: s.index, col });
                }
                col += 1;
            }
            layout.slots.push(slot);
        }
        layout.size8 = off8;
        layout.size4 = off4;
        layout.size1 = off1;
        layout.ncols_out = col;
        layout
    }
}

/// Row-major cell staging for one chunk.
#[derive(Debug, Default)]
pub struct RowBuffers {
    pub buf8: Vec<u64>,
    pub buf4: Vec<u32>,
    pub buf1: Vec<u8>,
    pub size8: usize,
    pub size4: usize,
    pub size1: usize,
    pub nrows: usize,
}

impl RowBuffers {
    pub fn new(layout: &RowLayout) -> Self {
        Self {
            size8: layout.size8,
            size4: layout.size4,
            size1: layout.size1,
            ..Default::default()
        }
    }

    /// Size for a chunk of `nrows` rows, reusing the allocations.
    pub fn reset(&mut self, nrows: usize) {
        self.nrows = nrows;
        self.buf8.clear();
        self.buf8.resize(nrows * self.size8, 0);
        self.buf4.clear();
        self.buf4.resize(nrows * self.size4, 0);
        self.buf1.clear();
        self.buf1.resize(nrows * self.size1, 0);
    }

    #[inline]
    pub fn put8(&mut self, row: usize, index: usize, bits: u64) {
        self.buf8[row * self.size8 + index] = bits;
    }

    #[inline]
    pub fn put4(&mut self, row: usize, index: usize, bits: u32) {
        self.buf4[row * self.size4 + index] = bits;
    }

    #[inline]
    pub fn put1(&mut self, row: usize, index: usize, byte: u8) {
        self.buf1[row * self.size1 + index] = byte;
    }

    #[inline]
    pub fn get8(&self, row: usize, index: usize) -> u64 {
        self.buf8[row * self.size8 + index]
    }
}

/// Initial capacity of a worker's per-column string scratch.
const SCRATCH_INIT: usize = 4096;

/// Per-worker scratch for one string column.
#[derive(Debug)]
pub struct StrScratch {
    /// Staged bytes; kept fully initialised, `cursor` marks the write head.
    pub buf: Vec<u8>,
    /// Bytes staged so far for the current chunk.
    pub cursor: usize,
    /// Index of this column's descriptor among the 8-byte slots.
    pub idx8: usize,
    /// Output column index in the frame.
    pub col: usize,
    /// Arena base handed out by the ordered reserve stage.
    pub base: usize,
}

impl StrScratch {
    fn new(slot: &StrSlot) -> Self {
        Self {
            buf: vec![0; SCRATCH_INIT],
            cursor: 0,
            idx8: slot.idx8,
            col: slot.col,
            base: 0,
        }
    }
}

/// Scratch owned by one worker for the duration of one pass. Dropping the
/// stage releases everything, which is how the pipeline's teardown step is
/// guaranteed on every exit path.
#[derive(Debug)]
pub struct WorkerStage {
    pub strbufs: Vec<StrScratch>,
    /// Shared temporary for quote-unescaping before encoding repair.
    pub tmp: Vec<u8>,
}

impl WorkerStage {
    pub fn new(layout: &RowLayout) -> Self {
        Self {
            strbufs: layout.strings.iter().map(StrScratch::new).collect(),
            tmp: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_assigns_slots_by_width() {
        use FieldType::*;
        // bool, i32, dropped, i64, string, f64
        let layout = RowLayout::new(&[Bool, Int32Bare, Drop, Int64, String, Float64Bare]);
        assert_eq!(layout.size1, 1);
        assert_eq!(layout.size4, 1);
        assert_eq!(layout.size8, 3);
        assert_eq!(layout.ncols_out, 5);
        assert!(layout.slots[2].is_none());
        // string took the second 8-byte slot, mapping to output column 3
        assert_eq!(layout.strings.len(), 1);
        assert_eq!(layout.strings[0].idx8, 1);
        assert_eq!(layout.strings[0].col, 3);
        // dropped field shifts later output column indices down
        assert_eq!(layout.slots[3].unwrap().col, 2);
        assert_eq!(layout.slots[5].unwrap().col, 4);
    }

    #[test]
    fn test_row_buffers_striping() {
        let layout = RowLayout::new(&[FieldType::Int64, FieldType::Int32Bare, FieldType::Bool]);
        let mut rows = RowBuffers::new(&layout);
        rows.reset(3);
        rows.put8(2, 0, 42);
        rows.put4(1, 0, 7);
        rows.put1(0, 0, 1);
        assert_eq!(rows.buf8, vec![0, 0, 42]);
        assert_eq!(rows.buf4, vec![0, 7, 0]);
        assert_eq!(rows.buf1, vec![1, 0, 0]);
    }

    #[test]
    fn test_stage_scratch_per_string_column() {
        let layout = RowLayout::new(&[FieldType::String, FieldType::Int32Bare, FieldType::String]);
        let stage = WorkerStage::new(&layout);
        assert_eq!(stage.strbufs.len(), 2);
        assert_eq!(stage.strbufs[0].col, 0);
        assert_eq!(stage.strbufs[1].col, 2);
        assert!(stage.strbufs.iter().all(|s| s.buf.len() == SCRATCH_INIT));
    }
}
