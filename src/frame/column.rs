//! Typed column over raw storage buffers

use crate::data::{ColumnType, NA_BOOL, NA_I32, NA_I64};
use crate::storage::ColumnBuffer;

/// One column: a declared element type, a row count, and a byte buffer.
///
/// String columns additionally carry an arena of concatenated UTF-8 bytes;
/// their element buffer holds `nrows + 1` signed 32-bit offsets. Entry
/// `i + 1` is the one-based end offset of row `i` into the arena, negated
/// when the row is missing; entry 0 is fixed to 1. Consecutive offsets
/// therefore locate every string regardless of NA-ness.
#[derive(Debug)]
pub struct Column {
    ctype: ColumnType,
    nrows: usize,
    data: ColumnBuffer,
    arena: Option<ColumnBuffer>,
}

impl Column {
    pub(crate) fn new(ctype: ColumnType, nrows: usize, data: ColumnBuffer) -> Self {
        Self {
            ctype,
            nrows,
            data,
            arena: None,
        }
    }

    pub(crate) fn new_string(nrows: usize, data: ColumnBuffer, arena: ColumnBuffer) -> Self {
        Self {
            ctype: ColumnType::String32,
            nrows,
            data,
            arena: Some(arena),
        }
    }

    pub fn ctype(&self) -> ColumnType {
        self.ctype
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn data(&self) -> &ColumnBuffer {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut ColumnBuffer {
        &mut self.data
    }

    pub(crate) fn set_nrows(&mut self, nrows: usize) {
        self.nrows = nrows;
    }

    pub(crate) fn take_arena(&mut self) -> Option<ColumnBuffer> {
        self.arena.take()
    }

    pub(crate) fn set_arena(&mut self, arena: ColumnBuffer) {
        self.arena = Some(arena);
    }

    /// The concatenated string bytes of a string column.
    pub fn arena_bytes(&self) -> &[u8] {
        self.arena.as_ref().map(|a| a.as_slice()).unwrap_or(&[])
    }

    fn cell(&self, row: usize, width: usize) -> &[u8] {
        &self.data.as_slice()[row * width..(row + 1) * width]
    }

    /// Signed offsets entry `i` of a string column (`0 ..= nrows`).
    pub fn offset_at(&self, i: usize) -> i32 {
        i32::from_ne_bytes(self.cell(i, 4).try_into().unwrap())
    }

    /// All `nrows + 1` offsets entries of a string column.
    pub fn offsets(&self) -> Vec<i32> {
        (0..=self.nrows).map(|i| self.offset_at(i)).collect()
    }

    pub fn get_bool(&self, row: usize) -> Option<bool> {
        let v = self.cell(row, 1)[0] as i8;
        if v == NA_BOOL {
            None
        } else {
            Some(v != 0)
        }
    }

    pub fn get_i32(&self, row: usize) -> Option<i32> {
        let v = i32::from_ne_bytes(self.cell(row, 4).try_into().unwrap());
        if v == NA_I32 {
            None
        } else {
            Some(v)
        }
    }

    pub fn get_i64(&self, row: usize) -> Option<i64> {
        let v = i64::from_ne_bytes(self.cell(row, 8).try_into().unwrap());
        if v == NA_I64 {
            None
        } else {
            Some(v)
        }
    }

    pub fn get_f32(&self, row: usize) -> Option<f32> {
        let v = f32::from_ne_bytes(self.cell(row, 4).try_into().unwrap());
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }

    pub fn get_f64(&self, row: usize) -> Option<f64> {
        let v = f64::from_ne_bytes(self.cell(row, 8).try_into().unwrap());
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }

    /// Row `row` of a string column; `None` for a missing value.
    pub fn get_str(&self, row: usize) -> Option<&str> {
        let end = self.offset_at(row + 1);
        if end < 0 {
            return None;
        }
        let start = self.offset_at(row).unsigned_abs() as usize - 1;
        let bytes = &self.arena_bytes()[start..end as usize - 1];
        // The reader repairs every arena byte to valid UTF-8 on the way in.
        Some(unsafe { std::str::from_utf8_unchecked(bytes) })
    }
}
