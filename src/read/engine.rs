//! Parse engine: tokenizer, chunk scheduling, and the pass loop
//!
//! The engine owns everything the sink treats as external: locating the
//! data start, separator detection, the quote-aware row scan, field-type
//! inference, and the worker pool that tokenizes chunks and drives the
//! sink's callbacks in pipeline order. Rows land in the output in input
//! order because the ordering stage runs in source chunk order and each
//! commit targets a disjoint row range.

use super::encoding::{decode_windows_1252_string, is_valid_utf8};
use super::hooks::ReaderHooks;
use super::options::ReadOptions;
use super::sink::ParseSink;
use super::stage::RowBuffers;
use crate::data::{FieldType, LenOff, NA_BOOL, NA_I32, NA_I64};
use crate::{FrameError, Result};
use ahash::AHashSet;
use parking_lot::{Condvar, Mutex};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Upper bound on the rows sampled for type inference.
const SAMPLE_ROWS: usize = 200;

/// Chunks handed out per worker; more than one keeps the pool balanced
/// when chunk parse times vary.
const CHUNKS_PER_WORKER: usize = 4;

/// Separator candidates tried when `sep == 0`.
const SEP_CANDIDATES: [u8; 4] = [b',', b'\t', b';', b'|'];

/// One field's byte span within the input, quotes excluded.
#[derive(Debug, Clone, Copy)]
struct FieldSpan {
    start: usize,
    end: usize,
    quoted: bool,
}

impl FieldSpan {
    fn len(&self) -> usize {
        self.end - self.start
    }
}

/// A contiguous run of rows assigned to one worker in one pass.
struct Chunk {
    rows: Range<usize>,
    byte_lo: usize,
    byte_hi: usize,
}

/// Outcome of one parallel pass.
enum PassResult {
    Done,
    Bumped(Vec<FieldType>),
}

/// State shared by the workers of one pass.
struct Shared {
    /// Next chunk to hand out.
    next: AtomicUsize,
    /// Chunk index whose turn it is to run the ordering stage.
    turn: Mutex<usize>,
    cv: Condvar,
    stop: AtomicBool,
    restart: AtomicBool,
    /// Widened types accumulated by bump requests.
    types: Mutex<Vec<FieldType>>,
    error: Mutex<Option<FrameError>>,
}

impl Shared {
    fn new(types: Vec<FieldType>) -> Self {
        Self {
            next: AtomicUsize::new(0),
            turn: Mutex::new(0),
            cv: Condvar::new(),
            stop: AtomicBool::new(false),
            restart: AtomicBool::new(false),
            types: Mutex::new(types),
            error: Mutex::new(None),
        }
    }

    fn fail(&self, e: FrameError) {
        let mut guard = self.error.lock();
        if guard.is_none() {
            *guard = Some(e);
        }
        drop(guard);
        self.stop.store(true, Ordering::Release);
        self.cv.notify_all();
    }

    fn signal_restart(&self) {
        self.restart.store(true, Ordering::Release);
        self.stop.store(true, Ordering::Release);
        self.cv.notify_all();
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Drives one read over one input buffer.
pub struct ParseEngine<'a> {
    /// Source bytes, excluding the trailing sentinel.
    data: &'a [u8],
    opts: &'a ReadOptions,
    hooks: &'a dyn ReaderHooks,
    na_set: AHashSet<Vec<u8>>,
    sep: u8,
    ncols: usize,
    /// Byte range of the data rows, for progress reporting.
    progress_lo: usize,
    progress_hi: usize,
}

impl<'a> ParseEngine<'a> {
    pub fn new(data: &'a [u8], opts: &'a ReadOptions, hooks: &'a dyn ReaderHooks) -> Self {
        let na_set = opts
            .na_strings
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect();
        Self {
            data,
            opts,
            hooks,
            na_set,
            sep: opts.sep,
            ncols: 0,
            progress_lo: 0,
            progress_hi: 0,
        }
    }

    fn debug(&self, msg: &str) {
        if self.opts.verbose {
            self.hooks.log_debug(msg);
        }
    }

    /// Run the full read: scan, negotiate, pass loop, finalise. Returns the
    /// final row count.
    pub fn run<S: ParseSink>(&mut self, sink: &mut S) -> Result<usize> {
        self.debug(&format!("Input: {} bytes", self.data.len()));
        let start = self.locate_start()?;
        self.detect_sep(start)?;
        let all_rows = self.scan_rows(start)?;

        let (header_row, data_lo) = if self.opts.header && !all_rows.is_empty() {
            (Some(all_rows[0].clone()), 1)
        } else {
            (None, 0)
        };
        let mut data_rows = &all_rows[data_lo..];

        // Column count comes from the header, or the first data row.
        let mut fields = Vec::new();
        let shape_row = header_row.as_ref().or_else(|| data_rows.first());
        self.ncols = match shape_row {
            Some(span) => {
                self.split_row(span.clone(), &mut fields)
                    .map_err(|message| FrameError::Parse { row: 0, message })?;
                fields.len()
            }
            None => 0,
        };

        let names = self.parse_header(header_row, self.ncols)?;
        let mut types = self.infer_types(data_rows)?;
        self.debug(&format!("Detected {} columns, types {:?}", self.ncols, types));
        sink.negotiate(names, &mut types)?;

        if self.opts.nrow_limit >= 0 && (self.opts.nrow_limit as usize) < data_rows.len() {
            data_rows = &data_rows[..self.opts.nrow_limit as usize];
        }
        let nrows = data_rows.len();
        if let (Some(first), Some(last)) = (data_rows.first(), data_rows.last()) {
            self.progress_lo = first.start;
            self.progress_hi = last.end.max(first.start + 1);
        }

        loop {
            sink.allocate(&types, nrows)?;
            if nrows == 0 {
                break;
            }
            match self.run_pass(sink, data_rows, &types)? {
                PassResult::Done => break,
                PassResult::Bumped(wider) => {
                    self.debug(&format!("Re-reading after type bump: {:?}", wider));
                    types = wider;
                }
            }
        }
        sink.finalise(nrows)?;
        if self.opts.show_progress {
            self.hooks.progress(100.0);
        }
        self.debug(&format!("Read {} rows", nrows));
        Ok(nrows)
    }

    // ---------------------------------------------------------------------
    // Pre-scan: data start, separator, row boundaries
    // ---------------------------------------------------------------------

    fn locate_start(&self) -> Result<usize> {
        if let Some(pat) = &self.opts.skip_string {
            let pat = pat.as_bytes();
            if pat.is_empty() {
                return Ok(0);
            }
            let pos = self
                .data
                .windows(pat.len())
                .position(|w| w == pat)
                .ok_or_else(|| FrameError::Parse {
                    row: 0,
                    message: format!("skip string {:?} not found in input", pat.escape_ascii()),
                })?;
            let line_start = self.data[..pos]
                .iter()
                .rposition(|&b| b == b'\n')
                .map(|p| p + 1)
                .unwrap_or(0);
            return Ok(line_start);
        }
        if self.opts.skip_nrow > 0 {
            let mut skipped = 0i64;
            for (i, &b) in self.data.iter().enumerate() {
                if b == b'\n' {
                    skipped += 1;
                    if skipped == self.opts.skip_nrow {
                        return Ok(i + 1);
                    }
                }
            }
            return Ok(self.data.len());
        }
        Ok(0)
    }

    fn detect_sep(&mut self, start: usize) -> Result<()> {
        if self.opts.sep != 0 {
            self.sep = self.opts.sep;
            return Ok(());
        }
        let line_end = self.data[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| start + p)
            .unwrap_or(self.data.len());
        let line = &self.data[start..line_end];

        let mut counts = [0usize; SEP_CANDIDATES.len()];
        let mut in_quotes = false;
        for &b in line {
            if b == self.opts.quote && self.opts.quote != 0 {
                in_quotes = !in_quotes;
            } else if !in_quotes {
                if let Some(i) = SEP_CANDIDATES.iter().position(|&c| c == b) {
                    counts[i] += 1;
                }
            }
        }
        let best = (0..SEP_CANDIDATES.len()).max_by_key(|&i| counts[i]).unwrap();
        if counts[best] == 0 {
            self.sep = b',';
        } else {
            let tied = counts.iter().filter(|&&c| c == counts[best]).count() > 1;
            if tied && self.opts.warnings_are_errors {
                return Err(FrameError::Parse {
                    row: 0,
                    message: "ambiguous separator in first row".to_string(),
                });
            }
            self.sep = SEP_CANDIDATES[best];
        }
        self.debug(&format!("Detected separator {:?}", self.sep as char));
        Ok(())
    }

    /// Quote-aware scan producing the byte span of every row. Line
    /// terminators are excluded; a `\r` before the `\n` is trimmed.
    fn scan_rows(&self, start: usize) -> Result<Vec<Range<usize>>> {
        let mut rows = Vec::new();
        let mut line_start = start;
        let mut in_quotes = false;
        let quote = self.opts.quote;

        let mut push = |lo: usize, mut hi: usize, rows: &mut Vec<Range<usize>>| {
            if hi > lo && self.data[hi - 1] == b'\r' {
                hi -= 1;
            }
            if lo == hi && self.opts.skip_empty_lines {
                return;
            }
            rows.push(lo..hi);
        };

        for (pos, &b) in self.data.iter().enumerate().skip(start) {
            if b == quote && quote != 0 {
                in_quotes = !in_quotes;
            } else if b == b'\n' && !in_quotes {
                push(line_start, pos, &mut rows);
                line_start = pos + 1;
            }
        }
        if in_quotes {
            return Err(FrameError::Parse {
                row: rows.len() + 1,
                message: "unterminated quoted field at end of input".to_string(),
            });
        }
        if line_start < self.data.len() {
            push(line_start, self.data.len(), &mut rows);
        }
        Ok(rows)
    }

    // ---------------------------------------------------------------------
    // Field splitting and parsing
    // ---------------------------------------------------------------------

    /// Split one row into field spans. Spans of quoted fields exclude the
    /// quotes; doubled quotes inside them are collapsed downstream.
    fn split_row(
        &self,
        span: Range<usize>,
        out: &mut Vec<FieldSpan>,
    ) -> std::result::Result<(), String> {
        out.clear();
        let data = self.data;
        let end = span.end;
        let quote = self.opts.quote;
        let strip = self.opts.strip_white && self.sep != b' ';
        let mut pos = span.start;

        loop {
            let mut p = pos;
            if strip {
                while p < end && data[p] == b' ' {
                    p += 1;
                }
            }
            if quote != 0 && p < end && data[p] == quote {
                let content_start = p + 1;
                let mut q = content_start;
                loop {
                    if q >= end {
                        return Err("unterminated quoted field".to_string());
                    }
                    if data[q] == quote {
                        if q + 1 < end && data[q + 1] == quote {
                            q += 2;
                            continue;
                        }
                        break;
                    }
                    q += 1;
                }
                out.push(FieldSpan {
                    start: content_start,
                    end: q,
                    quoted: true,
                });
                let mut after = q + 1;
                if strip {
                    while after < end && data[after] == b' ' {
                        after += 1;
                    }
                }
                if after >= end {
                    break;
                }
                if data[after] != self.sep {
                    return Err("invalid character after quoted field".to_string());
                }
                pos = after + 1;
            } else {
                let mut q = p;
                while q < end && data[q] != self.sep {
                    q += 1;
                }
                let mut fend = q;
                if strip {
                    while fend > p && data[fend - 1] == b' ' {
                        fend -= 1;
                    }
                }
                out.push(FieldSpan {
                    start: p,
                    end: fend,
                    quoted: false,
                });
                if q >= end {
                    break;
                }
                pos = q + 1;
            }
        }
        Ok(())
    }

    fn is_na(&self, f: &FieldSpan) -> bool {
        if f.quoted {
            return false;
        }
        let bytes = &self.data[f.start..f.end];
        bytes.is_empty() || self.na_set.contains(bytes)
    }

    fn field_bytes(&self, f: &FieldSpan) -> &[u8] {
        &self.data[f.start..f.end]
    }

    // ---------------------------------------------------------------------
    // Header and type inference
    // ---------------------------------------------------------------------

    fn parse_header(&self, row: Option<Range<usize>>, ncols: usize) -> Result<Vec<String>> {
        let mut names = vec![String::new(); ncols];
        if let Some(span) = row {
            let mut fields = Vec::new();
            self.split_row(span, &mut fields)
                .map_err(|message| FrameError::Parse { row: 0, message })?;
            for (i, f) in fields.iter().take(ncols).enumerate() {
                let bytes = self.field_bytes(f);
                names[i] = if is_valid_utf8(bytes) {
                    String::from_utf8(bytes.to_vec()).unwrap()
                } else {
                    decode_windows_1252_string(bytes)
                };
            }
        }
        for (i, name) in names.iter_mut().enumerate() {
            if name.is_empty() {
                *name = format!("V{}", i + 1);
            }
        }
        Ok(names)
    }

    fn infer_types(&self, rows: &[Range<usize>]) -> Result<Vec<FieldType>> {
        let mut types = vec![FieldType::Bool; self.ncols];
        if rows.is_empty() || self.ncols == 0 {
            return Ok(types);
        }
        let step = (rows.len() / SAMPLE_ROWS).max(1);
        let mut fields = Vec::new();
        let sampled = (0..rows.len())
            .step_by(step)
            .chain(std::iter::once(rows.len() - 1));
        for r in sampled {
            self.split_row(rows[r].clone(), &mut fields)
                .map_err(|message| FrameError::Parse { row: r + 1, message })?;
            for (i, f) in fields.iter().take(self.ncols).enumerate() {
                if self.is_na(f) {
                    continue;
                }
                let bytes = self.field_bytes(f);
                while !self.parses_as(bytes, types[i]) {
                    types[i] = ladder_next(types[i]);
                }
            }
        }
        Ok(types)
    }

    fn parses_as(&self, bytes: &[u8], t: FieldType) -> bool {
        match t {
            FieldType::Drop => true,
            FieldType::Bool => parse_bool(bytes).is_some(),
            FieldType::Int32Bare | FieldType::Int32 => parse_i32(bytes).is_some(),
            FieldType::Int64 => parse_i64(bytes).is_some(),
            FieldType::Float32 => parse_f32(bytes, self.opts.dec).is_some(),
            FieldType::Float64Bare | FieldType::Float64 => {
                parse_f64(bytes, self.opts.dec).is_some()
            }
            FieldType::Float64Ext => parse_f64_ext(bytes, self.opts.dec).is_some(),
            FieldType::String => true,
        }
    }

    /// Narrowest type above `current` that can hold `bytes`.
    fn bump_target(&self, bytes: &[u8], current: FieldType) -> FieldType {
        let mut t = ladder_next(current);
        while t != FieldType::String && !self.parses_as(bytes, t) {
            t = ladder_next(t);
        }
        t
    }

    // ---------------------------------------------------------------------
    // Parallel pass
    // ---------------------------------------------------------------------

    fn run_pass<S: ParseSink>(
        &self,
        sink: &S,
        data_rows: &[Range<usize>],
        types: &[FieldType],
    ) -> Result<PassResult> {
        let nrows = data_rows.len();
        let nth = self.opts.nth.max(0) as usize;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(nth)
            .build()
            .map_err(|e| FrameError::Allocation(e.to_string()))?;
        let nworkers = pool.current_num_threads().max(1);

        let nchunks = (nworkers * CHUNKS_PER_WORKER).min(nrows).max(1);
        let per = nrows.div_ceil(nchunks);
        let chunks: Vec<Chunk> = (0..nrows)
            .step_by(per)
            .map(|lo| {
                let hi = (lo + per).min(nrows);
                Chunk {
                    rows: lo..hi,
                    byte_lo: data_rows[lo].start,
                    byte_hi: data_rows[hi - 1].end,
                }
            })
            .collect();

        let shared = Shared::new(types.to_vec());
        pool.scope(|s| {
            for _ in 0..nworkers {
                s.spawn(|_| self.worker(sink, &chunks, data_rows, types, &shared));
            }
        });

        if let Some(e) = shared.error.into_inner() {
            return Err(e);
        }
        if shared.restart.load(Ordering::Acquire) {
            return Ok(PassResult::Bumped(shared.types.into_inner()));
        }
        Ok(PassResult::Done)
    }

    fn worker<S: ParseSink>(
        &self,
        sink: &S,
        chunks: &[Chunk],
        data_rows: &[Range<usize>],
        types: &[FieldType],
        shared: &Shared,
    ) {
        let mut stage = sink.prepare_worker();
        let mut rows = RowBuffers::new(sink.layout());
        let mut fields: Vec<FieldSpan> = Vec::new();

        loop {
            if shared.stopped() {
                return;
            }
            let c = shared.next.fetch_add(1, Ordering::Relaxed);
            if c >= chunks.len() {
                return;
            }
            let chunk = &chunks[c];
            if self
                .parse_chunk(sink, chunk, data_rows, types, &mut rows, &mut fields, shared)
                .is_err()
            {
                return;
            }

            let anchor = &self.data[chunk.byte_lo..chunk.byte_hi];
            sink.postprocess(&mut stage, &mut rows, anchor);

            // Serialised ordering stage, in source chunk order.
            {
                let mut turn = shared.turn.lock();
                while *turn != c {
                    if shared.stopped() {
                        return;
                    }
                    shared.cv.wait(&mut turn);
                }
                if shared.stopped() {
                    return;
                }
                let ordered = sink.order(&mut stage);
                if self.opts.show_progress && self.progress_hi > self.progress_lo {
                    let done = chunk.byte_hi.saturating_sub(self.progress_lo) as f64;
                    let total = (self.progress_hi - self.progress_lo) as f64;
                    self.hooks.progress((done / total * 100.0).min(100.0));
                }
                *turn += 1;
                drop(turn);
                shared.cv.notify_all();
                if let Err(e) = ordered {
                    shared.fail(e);
                    return;
                }
            }

            sink.commit(&stage, &rows, chunk.rows.start);
        }
    }

    /// Tokenize one chunk into the worker's stripe buffers. An `Err` means
    /// the pass is over for this worker (failure or restart signalled).
    #[allow(clippy::too_many_arguments)]
    fn parse_chunk<S: ParseSink>(
        &self,
        sink: &S,
        chunk: &Chunk,
        data_rows: &[Range<usize>],
        types: &[FieldType],
        rows: &mut RowBuffers,
        fields: &mut Vec<FieldSpan>,
        shared: &Shared,
    ) -> std::result::Result<(), ()> {
        let layout = sink.layout();
        rows.reset(chunk.rows.len());
        let mut restart = false;

        for (n, r) in chunk.rows.clone().enumerate() {
            let span = data_rows[r].clone();
            let blank = span.is_empty();
            if let Err(message) = self.split_row(span, fields) {
                shared.fail(FrameError::Parse { row: r + 1, message });
                return Err(());
            }
            if !blank {
                let nf = fields.len();
                if nf > self.ncols {
                    shared.fail(FrameError::Parse {
                        row: r + 1,
                        message: format!("expected {} fields but found {}", self.ncols, nf),
                    });
                    return Err(());
                }
                if nf < self.ncols && !self.opts.fill {
                    shared.fail(FrameError::Parse {
                        row: r + 1,
                        message: format!(
                            "expected {} fields but found {} (use fill to pad short rows)",
                            self.ncols, nf
                        ),
                    });
                    return Err(());
                }
            }

            for i in 0..self.ncols {
                let Some(slot) = layout.slots[i] else { continue };
                let field = if blank { None } else { fields.get(i) };
                let na = field.map(|f| self.is_na(f)).unwrap_or(true);

                if types[i].is_string() {
                    let lo = match field {
                        Some(f) if !na => LenOff::new(
                            f.len() as i32,
                            (f.start - chunk.byte_lo) as i32,
                        ),
                        _ => LenOff::NA,
                    };
                    rows.put8(n, slot.index, lo.to_bits());
                    continue;
                }

                let bytes = field.map(|f| self.field_bytes(f));
                match self.parse_fixed_cell(types[i], bytes, na) {
                    Ok(bits) => match slot.width {
                        8 => rows.put8(n, slot.index, bits),
                        4 => rows.put4(n, slot.index, bits as u32),
                        _ => rows.put1(n, slot.index, bits as u8),
                    },
                    Err(()) => {
                        // Observed data wider than the inferred type: note
                        // the widened type and finish the row so sibling
                        // bumps in the same row batch into one re-read.
                        let wanted = self.bump_target(bytes.unwrap(), types[i]);
                        let mut t = shared.types.lock();
                        t[i] = t[i].widen(wanted);
                        restart = true;
                    }
                }
            }
            if restart {
                shared.signal_restart();
                return Err(());
            }
        }
        Ok(())
    }

    /// Parse one non-string cell to its staged bit pattern; `Err` asks for
    /// a type bump.
    fn parse_fixed_cell(
        &self,
        t: FieldType,
        bytes: Option<&[u8]>,
        na: bool,
    ) -> std::result::Result<u64, ()> {
        if na || bytes.map(|b| b.is_empty()).unwrap_or(true) {
            return Ok(match t {
                FieldType::Bool => NA_BOOL as u8 as u64,
                FieldType::Int32Bare | FieldType::Int32 => NA_I32 as u32 as u64,
                FieldType::Int64 => NA_I64 as u64,
                FieldType::Float32 => f32::NAN.to_bits() as u64,
                _ => f64::NAN.to_bits(),
            });
        }
        let bytes = bytes.unwrap();
        match t {
            FieldType::Bool => parse_bool(bytes).map(|v| v as u8 as u64).ok_or(()),
            FieldType::Int32Bare | FieldType::Int32 => {
                parse_i32(bytes).map(|v| v as u32 as u64).ok_or(())
            }
            FieldType::Int64 => parse_i64(bytes).map(|v| v as u64).ok_or(()),
            FieldType::Float32 => parse_f32(bytes, self.opts.dec)
                .map(|v| v.to_bits() as u64)
                .ok_or(()),
            FieldType::Float64Bare | FieldType::Float64 => {
                parse_f64(bytes, self.opts.dec).map(f64::to_bits).ok_or(())
            }
            FieldType::Float64Ext => parse_f64_ext(bytes, self.opts.dec)
                .map(f64::to_bits)
                .ok_or(()),
            FieldType::Drop | FieldType::String => unreachable!("handled by caller"),
        }
    }
}

// -------------------------------------------------------------------------
// Scalar field parsers
// -------------------------------------------------------------------------

fn ladder_next(t: FieldType) -> FieldType {
    match t {
        FieldType::Drop | FieldType::Bool => FieldType::Int32Bare,
        FieldType::Int32Bare | FieldType::Int32 => FieldType::Int64,
        FieldType::Int64 | FieldType::Float32 => FieldType::Float64Bare,
        _ => FieldType::String,
    }
}

fn parse_bool(bytes: &[u8]) -> Option<i8> {
    match bytes {
        b"true" | b"True" | b"TRUE" => Some(1),
        b"false" | b"False" | b"FALSE" => Some(0),
        _ => None,
    }
}

fn parse_i64(bytes: &[u8]) -> Option<i64> {
    let (neg, digits) = match bytes.split_first()? {
        (b'-', rest) => (true, rest),
        (b'+', rest) => (false, rest),
        _ => (false, bytes),
    };
    if digits.is_empty() {
        return None;
    }
    let mut acc: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        acc = acc.checked_mul(10)?.checked_add((b - b'0') as i64)?;
    }
    Some(if neg { -acc } else { acc })
}

fn parse_i32(bytes: &[u8]) -> Option<i32> {
    let v = parse_i64(bytes)?;
    // i32::MIN is reserved for the missing-value sentinel.
    if v <= i32::MIN as i64 || v > i32::MAX as i64 {
        return None;
    }
    Some(v as i32)
}

/// Normalise a numeric field into a short ASCII buffer: maps the decimal
/// separator to `.` and rejects anything outside the plain decimal shape.
fn normalise_decimal(bytes: &[u8], dec: u8, buf: &mut [u8; 64]) -> Option<usize> {
    if bytes.len() > buf.len() {
        return None;
    }
    let mut ndigits = 0;
    for (i, &b) in bytes.iter().enumerate() {
        buf[i] = if b == dec {
            b'.'
        } else {
            match b {
                b'0'..=b'9' => {
                    ndigits += 1;
                    b
                }
                b'+' | b'-' | b'e' | b'E' => b,
                _ => return None,
            }
        };
    }
    if ndigits == 0 {
        return None;
    }
    Some(bytes.len())
}

fn parse_f64(bytes: &[u8], dec: u8) -> Option<f64> {
    let mut buf = [0u8; 64];
    let n = normalise_decimal(bytes, dec, &mut buf)?;
    std::str::from_utf8(&buf[..n]).ok()?.parse().ok()
}

fn parse_f32(bytes: &[u8], dec: u8) -> Option<f32> {
    let mut buf = [0u8; 64];
    let n = normalise_decimal(bytes, dec, &mut buf)?;
    std::str::from_utf8(&buf[..n]).ok()?.parse().ok()
}

/// Extended float form: the bare shape plus signed `NaN`/`Inf`/`Infinity`.
fn parse_f64_ext(bytes: &[u8], dec: u8) -> Option<f64> {
    let (neg, word) = match bytes.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        _ => (false, bytes),
    };
    if word.eq_ignore_ascii_case(b"nan") {
        return Some(f64::NAN);
    }
    if word.eq_ignore_ascii_case(b"inf") || word.eq_ignore_ascii_case(b"infinity") {
        return Some(if neg { f64::NEG_INFINITY } else { f64::INFINITY });
    }
    parse_f64(bytes, dec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::hooks::DefaultHooks;

    fn engine<'a>(data: &'a [u8], opts: &'a ReadOptions) -> ParseEngine<'a> {
        ParseEngine::new(data, opts, &DefaultHooks)
    }

    #[test]
    fn test_parse_bool_word_forms() {
        assert_eq!(parse_bool(b"true"), Some(1));
        assert_eq!(parse_bool(b"FALSE"), Some(0));
        assert_eq!(parse_bool(b"1"), None);
        assert_eq!(parse_bool(b"yes"), None);
    }

    #[test]
    fn test_parse_integers() {
        assert_eq!(parse_i32(b"42"), Some(42));
        assert_eq!(parse_i32(b"-7"), Some(-7));
        assert_eq!(parse_i32(b"+9"), Some(9));
        assert_eq!(parse_i32(b"2147483647"), Some(i32::MAX));
        assert_eq!(parse_i32(b"2147483648"), None, "overflow promotes");
        assert_eq!(parse_i32(b"-2147483648"), None, "sentinel is reserved");
        assert_eq!(parse_i64(b"2147483648"), Some(2147483648));
        assert_eq!(parse_i64(b"12.5"), None);
        assert_eq!(parse_i64(b""), None);
        assert_eq!(parse_i64(b"-"), None);
    }

    #[test]
    fn test_parse_floats() {
        assert_eq!(parse_f64(b"3.5", b'.'), Some(3.5));
        assert_eq!(parse_f64(b"-1e3", b'.'), Some(-1000.0));
        assert_eq!(parse_f64(b"3,5", b','), Some(3.5));
        assert_eq!(parse_f64(b"3.5", b','), None, "wrong decimal separator");
        assert_eq!(parse_f64(b"inf", b'.'), None, "bare form rejects words");
        assert_eq!(parse_f64_ext(b"-Inf", b'.'), Some(f64::NEG_INFINITY));
        assert!(parse_f64_ext(b"NaN", b'.').unwrap().is_nan());
    }

    #[test]
    fn test_ladder() {
        assert_eq!(ladder_next(FieldType::Bool), FieldType::Int32Bare);
        assert_eq!(ladder_next(FieldType::Int32Bare), FieldType::Int64);
        assert_eq!(ladder_next(FieldType::Int64), FieldType::Float64Bare);
        assert_eq!(ladder_next(FieldType::Float64Bare), FieldType::String);
        assert_eq!(ladder_next(FieldType::String), FieldType::String);
    }

    #[test]
    fn test_split_row_quotes_and_strip() {
        let opts = ReadOptions::default().sep(b',');
        let data = b"a, \"b,c\" ,  d ";
        let mut eng = engine(data, &opts);
        eng.sep = b',';
        let mut fields = Vec::new();
        eng.split_row(0..data.len(), &mut fields).unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(eng.field_bytes(&fields[0]), b"a");
        assert_eq!(eng.field_bytes(&fields[1]), b"b,c");
        assert!(fields[1].quoted);
        assert_eq!(eng.field_bytes(&fields[2]), b"d");
    }

    #[test]
    fn test_split_row_trailing_sep_yields_empty_field() {
        let opts = ReadOptions::default().sep(b',');
        let data = b"a,";
        let mut eng = engine(data, &opts);
        eng.sep = b',';
        let mut fields = Vec::new();
        eng.split_row(0..data.len(), &mut fields).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].len(), 0);
    }

    #[test]
    fn test_scan_rows_quoted_newline() {
        let opts = ReadOptions::default().sep(b',');
        let data = b"a,b\n\"x\ny\",2\n";
        let eng = engine(data, &opts);
        let rows = eng.scan_rows(0).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(&data[rows[1].clone()], b"\"x\ny\",2");
    }

    #[test]
    fn test_scan_rows_crlf_and_empty() {
        let opts = ReadOptions::default();
        let data = b"a\r\n\r\nb\r\n";
        let eng = engine(data, &opts);
        let rows = eng.scan_rows(0).unwrap();
        assert_eq!(rows.len(), 2, "empty line skipped by default");
        assert_eq!(&data[rows[0].clone()], b"a");
        assert_eq!(&data[rows[1].clone()], b"b");
    }

    #[test]
    fn test_detect_sep_prefers_most_frequent() {
        let opts = ReadOptions::default();
        let data = b"a;b;c,d\n1;2;3,4\n";
        let mut eng = engine(data, &opts);
        eng.detect_sep(0).unwrap();
        assert_eq!(eng.sep, b';');
    }
}
