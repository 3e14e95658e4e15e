//! Shared string arena with many-reader / one-grower coordination
//!
//! One arena exists per string column. Workers append their staged bytes in
//! a globally serialised order: the ordered stage reserves a region and
//! advances the cursor, then any worker copies its bytes into the reserved
//! region concurrently with other workers. A signed atomic use counter
//! partitions the two roles: positive values count in-flight copies, and a
//! large negative offset marks a pending buffer grow, so copies never
//! observe a resize.

use crate::storage::ColumnBuffer;
use crate::{FrameError, Result};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI64, AtomicPtr, AtomicUsize, Ordering};

/// Subtracted from the use counter while a grow is pending. Acts as a sign
/// bit: any committed copy keeps the counter far below this in magnitude.
const GROW_FLAG: i64 = 1_000_000;

/// Growable byte buffer for one string column, shared across workers.
pub struct GlobalArena {
    buf: UnsafeCell<ColumnBuffer>,
    /// Write pointer and capacity of `buf`, refreshed after every grow so
    /// committing workers never form a reference into the cell.
    ptr: AtomicPtr<u8>,
    cap: AtomicUsize,
    /// Committed byte count; advanced only by the serialised reserve stage.
    cursor: AtomicUsize,
    /// >= 0: number of copies in flight. < 0: a grow is pending and new
    /// copies must wait.
    uses: AtomicI64,
    /// Destination column index in the output frame.
    col_index: usize,
}

// Safety: `buf` is only accessed mutably inside `reserve` while `uses` is
// held at the negative grow flag (no copy in flight), and concurrent
// `commit` calls write through the cached pointer into disjoint
// `[base, base + len)` regions handed out by the serialised reserve stage.
unsafe impl Sync for GlobalArena {}
unsafe impl Send for GlobalArena {}

impl GlobalArena {
    pub fn new(mut buf: ColumnBuffer, col_index: usize) -> Self {
        let ptr = buf.as_mut_ptr();
        let cap = buf.len();
        Self {
            buf: UnsafeCell::new(buf),
            ptr: AtomicPtr::new(ptr),
            cap: AtomicUsize::new(cap),
            cursor: AtomicUsize::new(0),
            uses: AtomicI64::new(0),
            col_index,
        }
    }

    pub fn col_index(&self) -> usize {
        self.col_index
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Reset for another pass over the input, keeping the buffer capacity.
    pub fn reset(&mut self) {
        *self.cursor.get_mut() = 0;
        debug_assert_eq!(*self.uses.get_mut(), 0);
    }

    /// Reserve `len` bytes, growing the buffer if required. Must only be
    /// called from the serialised ordering stage; returns the base offset
    /// of the reserved region.
    pub fn reserve(&self, len: usize) -> Result<usize> {
        let base = self.cursor.load(Ordering::Relaxed);
        let needed = base + len;
        while needed > self.cap.load(Ordering::Acquire) {
            // (1) wait until all in-flight copies have drained
            while self.uses.load(Ordering::Acquire) > 0 {
                std::hint::spin_loop();
                std::thread::yield_now();
            }
            // (2) announce the grow
            let old = self.uses.fetch_sub(GROW_FLAG, Ordering::AcqRel);
            if old == 0 {
                // (3) no copy raced in between (1) and (2): resize. The
                // counter is negative, so this access is exclusive.
                let result = {
                    let buf = unsafe { &mut *self.buf.get() };
                    let r = buf.resize(needed * 2);
                    self.ptr.store(buf.as_mut_ptr(), Ordering::Release);
                    self.cap.store(buf.len(), Ordering::Release);
                    r
                };
                self.uses.fetch_add(GROW_FLAG, Ordering::AcqRel);
                result?;
            } else {
                // (4) a copy started in the window; back off and retry
                self.uses.fetch_add(GROW_FLAG, Ordering::AcqRel);
            }
        }
        self.cursor.store(needed, Ordering::Release);
        Ok(base)
    }

    /// Copy `bytes` into the region reserved at `base`. Runs concurrently
    /// with other commits; waits out any pending grow.
    pub fn commit(&self, base: usize, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        loop {
            let old = self.uses.fetch_add(1, Ordering::AcqRel);
            if old >= 0 {
                // Registered as a reader; no grow can start until we leave.
                unsafe {
                    let dst = self.ptr.load(Ordering::Acquire).add(base);
                    std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
                }
                self.uses.fetch_sub(1, Ordering::AcqRel);
                return;
            }
            // A grow is pending; undo the registration and wait it out.
            self.uses.fetch_sub(1, Ordering::AcqRel);
            while self.uses.load(Ordering::Acquire) < 0 {
                std::hint::spin_loop();
                std::thread::yield_now();
            }
        }
    }

    /// Tear down after the pipeline completes: no copy may be in flight.
    /// Returns the buffer and the committed byte count.
    pub fn finish(mut self) -> Result<(ColumnBuffer, usize)> {
        if *self.uses.get_mut() != 0 {
            return Err(FrameError::Invariant(
                "string arena torn down with copies in flight".to_string(),
            ));
        }
        let cursor = *self.cursor.get_mut();
        Ok((self.buf.into_inner(), cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_advances_cursor() {
        let arena = GlobalArena::new(ColumnBuffer::heap(8), 0);
        assert_eq!(arena.reserve(5).unwrap(), 0);
        assert_eq!(arena.reserve(3).unwrap(), 5);
        assert_eq!(arena.cursor(), 8);
    }

    #[test]
    fn test_reserve_grows_buffer() {
        let arena = GlobalArena::new(ColumnBuffer::heap(4), 0);
        let base = arena.reserve(100).unwrap();
        assert_eq!(base, 0);
        arena.commit(base, &[7u8; 100]);
        let (buf, cursor) = arena.finish().unwrap();
        assert_eq!(cursor, 100);
        assert!(buf.len() >= 100);
        assert_eq!(&buf.as_slice()[..100], &[7u8; 100]);
    }

    #[test]
    fn test_concurrent_commits_land_disjoint() {
        let arena = GlobalArena::new(ColumnBuffer::heap(16), 0);
        let nworkers = 8usize;
        let chunk = 4096usize;
        // Serialised reservations force repeated grows underneath the
        // concurrently running commits.
        std::thread::scope(|s| {
            let arena = &arena;
            let mut handles = Vec::new();
            for w in 0..nworkers {
                let base = arena.reserve(chunk).unwrap();
                handles.push(s.spawn(move || {
                    let bytes = vec![w as u8 + 1; chunk];
                    arena.commit(base, &bytes);
                }));
            }
            for h in handles {
                h.join().unwrap();
            }
        });
        let (buf, cursor) = arena.finish().unwrap();
        assert_eq!(cursor, nworkers * chunk);
        for w in 0..nworkers {
            let region = &buf.as_slice()[w * chunk..(w + 1) * chunk];
            assert!(region.iter().all(|&b| b == w as u8 + 1));
        }
    }
}
