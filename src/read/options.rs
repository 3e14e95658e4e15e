//! Reader configuration

use serde::{Deserialize, Serialize};

/// Options controlling one read.
///
/// `sep`, `dec`, and `quote` are single bytes; a `sep` of 0 asks the reader
/// to detect the separator from the first rows. `nth` is the worker count
/// (0 means one worker per available core).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadOptions {
    pub sep: u8,
    pub dec: u8,
    pub quote: u8,
    pub nrow_limit: i64,
    pub skip_nrow: i64,
    pub skip_string: Option<String>,
    pub header: bool,
    pub verbose: bool,
    pub na_strings: Vec<String>,
    pub strip_white: bool,
    pub skip_empty_lines: bool,
    pub fill: bool,
    pub show_progress: bool,
    pub nth: i32,
    pub warnings_are_errors: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            sep: 0,
            dec: b'.',
            quote: b'"',
            nrow_limit: i64::MAX,
            skip_nrow: 0,
            skip_string: None,
            header: true,
            verbose: false,
            na_strings: vec!["NA".to_string()],
            strip_white: true,
            skip_empty_lines: true,
            fill: false,
            show_progress: false,
            nth: 0,
            warnings_are_errors: false,
        }
    }
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the field separator byte (0 = detect).
    pub fn sep(mut self, sep: u8) -> Self {
        self.sep = sep;
        self
    }

    /// Set the decimal separator byte.
    pub fn dec(mut self, dec: u8) -> Self {
        self.dec = dec;
        self
    }

    /// Set the quote byte.
    pub fn quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    /// Cap the number of data rows read.
    pub fn nrow_limit(mut self, limit: i64) -> Self {
        self.nrow_limit = limit;
        self
    }

    /// Skip this many raw lines before reading.
    pub fn skip_nrow(mut self, n: i64) -> Self {
        self.skip_nrow = n;
        self
    }

    /// Start reading at the line containing this string.
    pub fn skip_string(mut self, s: impl Into<String>) -> Self {
        self.skip_string = Some(s.into());
        self
    }

    /// Whether the first row holds column names.
    pub fn header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Strings that read as missing values.
    pub fn na_strings(mut self, na: Vec<String>) -> Self {
        self.na_strings = na;
        self
    }

    pub fn strip_white(mut self, strip: bool) -> Self {
        self.strip_white = strip;
        self
    }

    pub fn skip_empty_lines(mut self, skip: bool) -> Self {
        self.skip_empty_lines = skip;
        self
    }

    /// Complete short rows with missing values instead of failing.
    pub fn fill(mut self, fill: bool) -> Self {
        self.fill = fill;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Worker thread count (0 = one per core).
    pub fn nth(mut self, nth: i32) -> Self {
        self.nth = nth;
        self
    }

    pub fn warnings_are_errors(mut self, strict: bool) -> Self {
        self.warnings_are_errors = strict;
        self
    }
}
