//! Per-run column allocation: heap vs on-disk backing

use super::ColumnBuffer;
use crate::data::ColumnType;
use crate::frame::Column;
use crate::Result;
use std::path::{Path, PathBuf};

/// Average string width assumed when preallocating a string arena; the
/// arena grows on demand if the data runs wider.
pub const ARENA_BYTES_PER_ROW: usize = 5;

/// Chooses and applies the backing strategy for every column of one run.
///
/// With no target directory all buffers are heap-allocated. With a target
/// directory each non-dropped column becomes a memory-mapped file named
/// `col<index>`, the index zero-padded to the decimal width of the total
/// column count; a string column's arena lives beside it as `col<index>.str`.
pub struct ColumnAllocator {
    target_dir: Option<PathBuf>,
    ndigits: usize,
}

impl ColumnAllocator {
    pub fn new(target_dir: Option<PathBuf>, ncols: usize) -> Self {
        let mut ndigits = 0;
        let mut nc = ncols;
        while nc > 0 {
            ndigits += 1;
            nc /= 10;
        }
        Self {
            target_dir,
            ndigits: ndigits.max(1),
        }
    }

    pub fn is_on_disk(&self) -> bool {
        self.target_dir.is_some()
    }

    pub fn target_dir(&self) -> Option<&Path> {
        self.target_dir.as_deref()
    }

    fn column_path(&self, index: usize, suffix: &str) -> Option<PathBuf> {
        self.target_dir
            .as_ref()
            .map(|dir| dir.join(format!("col{:0width$}{}", index, suffix, width = self.ndigits)))
    }

    fn make_buffer(&self, index: usize, size: usize, suffix: &str) -> Result<ColumnBuffer> {
        match self.column_path(index, suffix) {
            Some(path) => ColumnBuffer::mapped(&path, size),
            None => Ok(ColumnBuffer::heap(size)),
        }
    }

    /// Create a column of `ctype` with room for `nrows` elements. String
    /// columns get an offsets buffer of `nrows + 1` entries (the first fixed
    /// to 1) and an arena preallocated by the per-row heuristic.
    pub fn alloc(&self, ctype: ColumnType, nrows: usize, index: usize) -> Result<Column> {
        if ctype.is_string() {
            let mut data = self.make_buffer(index, 4 * (nrows + 1), "")?;
            data.as_mut_slice()[..4].copy_from_slice(&1i32.to_ne_bytes());
            let arena = self.make_buffer(index, ARENA_BYTES_PER_ROW * nrows, ".str")?;
            Ok(Column::new_string(nrows, data, arena))
        } else {
            let data = self.make_buffer(index, ctype.elem_size() * nrows, "")?;
            Ok(Column::new(ctype, nrows, data))
        }
    }

    /// Re-shape an existing column for another pass: a same-type realloc
    /// resizes the element buffer in place, a type change destroys the old
    /// column and allocates a fresh one.
    pub fn realloc(
        &self,
        col: &mut Column,
        ctype: ColumnType,
        nrows: usize,
        index: usize,
    ) -> Result<()> {
        if col.ctype() != ctype {
            *col = self.alloc(ctype, nrows, index)?;
            return Ok(());
        }
        let bytes = if ctype.is_string() {
            4 * (nrows + 1)
        } else {
            ctype.elem_size() * nrows
        };
        col.data_mut().resize(bytes)?;
        col.set_nrows(nrows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_heap_alloc() {
        let alloc = ColumnAllocator::new(None, 3);
        let col = alloc.alloc(ColumnType::Int32, 10, 0).unwrap();
        assert_eq!(col.ctype(), ColumnType::Int32);
        assert_eq!(col.data().len(), 40);
        assert!(col.data().path().is_none());
    }

    #[test]
    fn test_string_alloc_offsets_sentinel() {
        let alloc = ColumnAllocator::new(None, 1);
        let col = alloc.alloc(ColumnType::String32, 4, 0).unwrap();
        assert_eq!(col.data().len(), 4 * 5);
        assert_eq!(col.offset_at(0), 1);
    }

    #[test]
    fn test_on_disk_names_zero_padded() {
        let dir = tempdir().unwrap();
        let alloc = ColumnAllocator::new(Some(dir.path().to_path_buf()), 12);
        let col = alloc.alloc(ColumnType::Float64, 2, 7).unwrap();
        assert_eq!(
            col.data().path().unwrap().file_name().unwrap(),
            "col07",
            "index padded to the decimal width of the column count"
        );
        assert!(dir.path().join("col07").exists());
    }

    #[test]
    fn test_realloc_same_type_resizes() {
        let alloc = ColumnAllocator::new(None, 1);
        let mut col = alloc.alloc(ColumnType::Int64, 4, 0).unwrap();
        alloc.realloc(&mut col, ColumnType::Int64, 9, 0).unwrap();
        assert_eq!(col.data().len(), 72);
        assert_eq!(col.nrows(), 9);
    }

    #[test]
    fn test_realloc_type_change_recreates() {
        let alloc = ColumnAllocator::new(None, 1);
        let mut col = alloc.alloc(ColumnType::Int32, 4, 0).unwrap();
        alloc.realloc(&mut col, ColumnType::Float64, 4, 0).unwrap();
        assert_eq!(col.ctype(), ColumnType::Float64);
        assert_eq!(col.data().len(), 32);
    }
}
