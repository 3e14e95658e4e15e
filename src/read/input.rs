//! Input buffer: source bytes as one contiguous read-only range
//!
//! The buffer always exposes one byte more than the source: a readable
//! trailing sentinel the tokenizer may use as a stop marker. Release is
//! idempotent and happens on every exit path (drop).

use crate::Result;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::PathBuf;

/// Where the source bytes come from.
pub enum InputSource {
    /// In-memory text.
    Text(Vec<u8>),
    /// A file to open and map.
    Path(PathBuf),
    /// A caller-opened file, mapped in place.
    File(File),
}

impl InputSource {
    pub fn text(t: impl Into<Vec<u8>>) -> Self {
        InputSource::Text(t.into())
    }

    pub fn path(p: impl Into<PathBuf>) -> Self {
        InputSource::Path(p.into())
    }
}

enum Backing {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

/// The source presented as `(bytes, len)` with a guaranteed-readable
/// trailing sentinel byte of unspecified value.
pub struct InputBuffer {
    backing: Backing,
    /// Length of the real data, excluding the sentinel.
    data_len: usize,
}

/// Smallest page size assumed for the over-map check. Any real page size is
/// a multiple of this, so the check errs toward the copying fallback.
const MIN_PAGE: usize = 4096;

impl InputBuffer {
    pub fn open(source: InputSource) -> Result<Self> {
        match source {
            InputSource::Text(mut bytes) => {
                let data_len = bytes.len();
                bytes.push(0);
                Ok(Self {
                    backing: Backing::Owned(bytes),
                    data_len,
                })
            }
            InputSource::Path(path) => Self::from_file(File::open(path)?),
            InputSource::File(file) => Self::from_file(file),
        }
    }

    fn from_file(mut file: File) -> Result<Self> {
        use std::io::{Read, Seek, SeekFrom};

        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Ok(Self {
                backing: Backing::Owned(vec![0]),
                data_len: 0,
            });
        }
        if len % MIN_PAGE == 0 {
            // The byte after the data would fall on a fresh page with no
            // backing; fall back to reading into memory.
            let mut bytes = Vec::with_capacity(len + 1);
            file.seek(SeekFrom::Start(0))?;
            file.read_to_end(&mut bytes)?;
            bytes.push(0);
            let data_len = bytes.len() - 1;
            return Ok(Self {
                backing: Backing::Owned(bytes),
                data_len,
            });
        }
        // Map one byte past the end: it lands inside the final partly-used
        // page, which the kernel zero-fills, so the sentinel is readable.
        let mmap = unsafe { MmapOptions::new().len(len + 1).map(&file)? };
        Ok(Self {
            backing: Backing::Mapped(mmap),
            data_len: len,
        })
    }

    /// All bytes including the trailing sentinel.
    pub fn bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Owned(v) => v,
            Backing::Mapped(m) => m,
        }
    }

    /// The source bytes without the sentinel.
    pub fn data(&self) -> &[u8] {
        &self.bytes()[..self.data_len]
    }

    pub fn data_len(&self) -> usize {
        self.data_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_text_sentinel() {
        let buf = InputBuffer::open(InputSource::text("a,b\n")).unwrap();
        assert_eq!(buf.data(), b"a,b\n");
        assert_eq!(buf.bytes().len(), 5);
    }

    #[test]
    fn test_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        File::create(&path).unwrap();
        let buf = InputBuffer::open(InputSource::path(&path)).unwrap();
        assert_eq!(buf.data_len(), 0);
        assert_eq!(buf.bytes().len(), 1);
    }

    #[test]
    fn test_mapped_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, b"x\n1\n2\n").unwrap();
        let buf = InputBuffer::open(InputSource::path(&path)).unwrap();
        assert_eq!(buf.data(), b"x\n1\n2\n");
        // sentinel readable
        assert_eq!(buf.bytes().len(), buf.data_len() + 1);
        let _ = buf.bytes()[buf.data_len()];
    }

    #[test]
    fn test_caller_opened_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"a\n9\n").unwrap();
        drop(f);
        let buf = InputBuffer::open(InputSource::File(File::open(&path).unwrap())).unwrap();
        assert_eq!(buf.data(), b"a\n9\n");
    }

    #[test]
    fn test_page_multiple_falls_back_to_heap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("page.csv");
        let mut data = b"h\n".to_vec();
        data.resize(MIN_PAGE, b'x');
        std::fs::write(&path, &data).unwrap();
        let buf = InputBuffer::open(InputSource::path(&path)).unwrap();
        assert_eq!(buf.data(), &data[..]);
        assert_eq!(buf.bytes().len(), MIN_PAGE + 1);
    }
}
