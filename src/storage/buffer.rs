//! Raw column bytes with heap or memory-mapped file backing

use crate::Result;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// A resizable byte buffer backing one column (or one string arena).
///
/// Heap buffers live in a `Vec<u8>`; mapped buffers are backed by a file
/// created for the run and are remapped on every resize. Both variants are
/// zero-initialised on growth and keep their contents on shrink.
pub enum ColumnBuffer {
    Heap(Vec<u8>),
    Mapped(MappedBuffer),
}

/// File-backed variant of [`ColumnBuffer`].
pub struct MappedBuffer {
    file: File,
    path: PathBuf,
    /// `None` while the buffer is empty (a zero-length region cannot be mapped).
    mmap: Option<MmapMut>,
    len: usize,
}

impl ColumnBuffer {
    /// Create a zero-filled heap buffer.
    pub fn heap(size: usize) -> Self {
        ColumnBuffer::Heap(vec![0u8; size])
    }

    /// Create a file-backed buffer at `path`, sized and mapped for writing.
    pub fn mapped(path: &Path, size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size as u64)?;
        let mmap = if size > 0 {
            Some(unsafe { MmapOptions::new().map_mut(&file)? })
        } else {
            None
        };
        Ok(ColumnBuffer::Mapped(MappedBuffer {
            file,
            path: path.to_path_buf(),
            mmap,
            len: size,
        }))
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnBuffer::Heap(v) => v.len(),
            ColumnBuffer::Mapped(m) => m.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resize to exactly `new_len` bytes, preserving the common prefix.
    pub fn resize(&mut self, new_len: usize) -> Result<()> {
        match self {
            ColumnBuffer::Heap(v) => {
                v.resize(new_len, 0);
                Ok(())
            }
            ColumnBuffer::Mapped(m) => m.resize(new_len),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            ColumnBuffer::Heap(v) => v.as_slice(),
            ColumnBuffer::Mapped(m) => m.mmap.as_deref().unwrap_or(&[]),
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            ColumnBuffer::Heap(v) => v.as_mut_slice(),
            ColumnBuffer::Mapped(m) => match &mut m.mmap {
                Some(mm) => &mut mm[..],
                None => &mut [],
            },
        }
    }

    /// Raw write pointer. Null only when the buffer is empty.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        match self {
            ColumnBuffer::Heap(v) => v.as_mut_ptr(),
            ColumnBuffer::Mapped(m) => match &mut m.mmap {
                Some(mm) => mm.as_mut_ptr(),
                None => std::ptr::null_mut(),
            },
        }
    }

    /// Flush mapped contents to disk; no-op for heap buffers.
    pub fn flush(&self) -> Result<()> {
        if let ColumnBuffer::Mapped(m) = self {
            if let Some(mm) = &m.mmap {
                mm.flush()?;
            }
        }
        Ok(())
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ColumnBuffer::Heap(_) => None,
            ColumnBuffer::Mapped(m) => Some(&m.path),
        }
    }
}

impl MappedBuffer {
    /// Flush, unmap, set the file length, and remap.
    fn resize(&mut self, new_len: usize) -> Result<()> {
        if let Some(mm) = &self.mmap {
            mm.flush()?;
        }
        self.mmap = None;
        self.file.set_len(new_len as u64)?;
        if new_len > 0 {
            self.mmap = Some(unsafe { MmapOptions::new().map_mut(&self.file)? });
        }
        self.len = new_len;
        Ok(())
    }
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        // Try to flush on drop
        if let Some(mm) = &self.mmap {
            let _ = mm.flush();
        }
    }
}

impl std::fmt::Debug for ColumnBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnBuffer::Heap(v) => write!(f, "ColumnBuffer::Heap({} bytes)", v.len()),
            ColumnBuffer::Mapped(m) => {
                write!(f, "ColumnBuffer::Mapped({} bytes at {})", m.len, m.path.display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_heap_resize_preserves_prefix() {
        let mut buf = ColumnBuffer::heap(4);
        buf.as_mut_slice().copy_from_slice(&[1, 2, 3, 4]);
        buf.resize(8).unwrap();
        assert_eq!(&buf.as_slice()[..4], &[1, 2, 3, 4]);
        assert_eq!(&buf.as_slice()[4..], &[0, 0, 0, 0]);
        buf.resize(2).unwrap();
        assert_eq!(buf.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_mapped_create_resize_trim() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("col0");
        let mut buf = ColumnBuffer::mapped(&path, 16).unwrap();
        assert_eq!(buf.len(), 16);
        buf.as_mut_slice()[..5].copy_from_slice(b"hello");

        buf.resize(64).unwrap();
        assert_eq!(&buf.as_slice()[..5], b"hello");

        buf.resize(5).unwrap();
        buf.flush().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 5);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_mapped_zero_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("col0");
        let mut buf = ColumnBuffer::mapped(&path, 0).unwrap();
        assert!(buf.is_empty());
        assert!(buf.as_slice().is_empty());
        buf.resize(8).unwrap();
        assert_eq!(buf.len(), 8);
        buf.resize(0).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }
}
