//! Resumable Stream Reader
//!
//! Streams a dump file one line at a time and keeps a running count of the
//! bytes consumed. The counter is seeded by [`DumpReader::skip`] or
//! [`DumpReader::seek_to`], so progress stays correct after a resume.
//!
//! ## Core Functionality
//!
//! - **Lazy lines**: [`DumpReader`] is a forward-only iterator of [`Line`]s;
//!   nothing beyond the current line is buffered
//! - **Byte accounting**: every line adds its raw length (newline included) to
//!   the counter, regardless of how it decoded
//! - **Lossy decoding**: invalid UTF-8 sequences are replaced, never fatal
//! - **Progress gate**: [`ProgressGate`] turns the byte counter into a
//!   percentage and only reports it when the integer value increases
//!
//! ## Run States
//!
//! `Idle -> Opened -> (Skipping)? -> Streaming -> {Completed | Aborted}`
//!
//! `total_bytes` is the size at open time; a file that grows or shrinks while
//! it is being read reports an inaccurate percentage.

use crate::error::StreamError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

const READ_BUFFER_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Opened,
    Skipping,
    Streaming,
    Completed,
    Aborted,
}

/// One raw line of the dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// 1-based line number
    pub number: u64,
    /// Decoded text without the line terminator
    pub text: String,
    /// Raw byte length including the terminator
    pub bytes: u64,
}

pub struct DumpReader {
    reader: BufReader<File>,
    buf: Vec<u8>,
    total_bytes: u64,
    bytes_consumed: u64,
    next_line: u64,
    state: RunState,
}

impl DumpReader {
    pub fn open(path: &Path) -> Result<Self, StreamError> {
        let open_err = |source| StreamError::Open {
            path: path.display().to_string(),
            source,
        };
        let file = File::open(path).map_err(open_err)?;
        let total_bytes = file.metadata().map_err(open_err)?.len();
        debug!("Opened {} ({} bytes)", path.display(), total_bytes);

        Ok(Self {
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, file),
            buf: Vec::new(),
            total_bytes,
            bytes_consumed: 0,
            next_line: 1,
            state: RunState::Opened,
        })
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    /// Number of the line the next read returns.
    pub fn next_line_number(&self) -> u64 {
        self.next_line
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Discard up to `n` lines and return the bytes they occupied.
    ///
    /// Stops early at end of file; the shortfall is not an error.
    pub fn skip(&mut self, n: u64) -> Result<u64, StreamError> {
        if n == 0 {
            return Ok(0);
        }
        self.state = RunState::Skipping;
        let start = self.bytes_consumed;
        for _ in 0..n {
            if self.read_raw()?.is_none() {
                break;
            }
        }
        let skipped = self.bytes_consumed - start;
        debug!("Skipped to line {} ({} bytes)", self.next_line, skipped);
        Ok(skipped)
    }

    /// Jump straight to `offset`, which must be the start of line `line`.
    pub fn seek_to(&mut self, offset: u64, line: u64) -> Result<(), StreamError> {
        if offset > self.total_bytes {
            return Err(StreamError::SeekPastEnd {
                offset,
                total: self.total_bytes,
            });
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        self.bytes_consumed = offset;
        self.next_line = line.max(1);
        debug!("Seeked to byte {} (line {})", offset, self.next_line);
        Ok(())
    }

    /// Mark the run as ended by a fault.
    pub fn abort(&mut self) {
        self.state = RunState::Aborted;
    }

    fn read_raw(&mut self) -> Result<Option<u64>, StreamError> {
        self.buf.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .map_err(|source| StreamError::Read {
                line: self.next_line.saturating_sub(1),
                source,
            })?;
        if n == 0 {
            return Ok(None);
        }
        self.bytes_consumed += n as u64;
        self.next_line += 1;
        Ok(Some(n as u64))
    }
}

impl Iterator for DumpReader {
    type Item = Result<Line, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            RunState::Completed | RunState::Aborted => return None,
            _ => self.state = RunState::Streaming,
        }

        let number = self.next_line;
        match self.read_raw() {
            Ok(Some(bytes)) => {
                let mut raw: &[u8] = &self.buf;
                if let Some(stripped) = raw.strip_suffix(b"\n") {
                    raw = stripped.strip_suffix(b"\r").unwrap_or(stripped);
                }
                Some(Ok(Line {
                    number,
                    text: String::from_utf8_lossy(raw).into_owned(),
                    bytes,
                }))
            }
            Ok(None) => {
                self.state = RunState::Completed;
                None
            }
            Err(e) => {
                self.state = RunState::Aborted;
                Some(Err(e))
            }
        }
    }
}

/// Integer percentage of `total` covered by `consumed`, capped at 100.
///
/// An empty file counts as fully consumed.
pub fn progress(consumed: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (consumed as u128 * 100) / total as u128;
    pct.min(100) as u8
}

/// Reports a percentage only when it moves past the last reported value
#[derive(Debug, Default)]
pub struct ProgressGate {
    last: Option<u8>,
}

impl ProgressGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, consumed: u64, total: u64) -> Option<u8> {
        let pct = progress(consumed, total);
        match self.last {
            Some(last) if pct <= last => None,
            _ => {
                self.last = Some(pct);
                Some(pct)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn dump(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_lines_and_byte_counter() {
        let file = dump(b"first\r\nsecond\nthird");
        let mut reader = DumpReader::open(file.path()).unwrap();
        assert_eq!(reader.state(), RunState::Opened);
        assert_eq!(reader.total_bytes(), 19);

        let lines: Vec<Line> = reader.by_ref().map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "first");
        assert_eq!(lines[0].bytes, 7);
        assert_eq!(lines[1].number, 2);
        assert_eq!(lines[2].text, "third");
        assert_eq!(lines[2].bytes, 5);
        assert_eq!(reader.bytes_consumed(), 19);
        assert_eq!(reader.state(), RunState::Completed);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_bytes_count_raw_length_not_characters() {
        // "é" is two bytes, the invalid byte decodes to one replacement char
        let file = dump(b"caf\xc3\xa9\n\xffx\n");
        let mut reader = DumpReader::open(file.path()).unwrap();

        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.text, "café");
        assert_eq!(first.bytes, 6);

        let second = reader.next().unwrap().unwrap();
        assert_eq!(second.text, "\u{FFFD}x");
        assert_eq!(second.bytes, 3);
    }

    #[test]
    fn test_skip_seeds_counter() {
        let file = dump(b"aa\nbbb\ncccc\n");
        let mut reader = DumpReader::open(file.path()).unwrap();

        assert_eq!(DumpReader::skip(&mut reader, 2).unwrap(), 7);
        assert_eq!(reader.state(), RunState::Skipping);
        let line = reader.next().unwrap().unwrap();
        assert_eq!(line.number, 3);
        assert_eq!(line.text, "cccc");
        assert_eq!(reader.bytes_consumed(), reader.total_bytes());
    }

    #[test]
    fn test_skip_past_end_stops_at_eof() {
        let file = dump(b"one\ntwo\n");
        let mut reader = DumpReader::open(file.path()).unwrap();
        assert_eq!(DumpReader::skip(&mut reader, 10).unwrap(), 8);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_seek_to_offset() {
        let file = dump(b"aa\nbbb\ncccc\n");
        let mut reader = DumpReader::open(file.path()).unwrap();
        reader.seek_to(3, 2).unwrap();

        let line = reader.next().unwrap().unwrap();
        assert_eq!(line.number, 2);
        assert_eq!(line.text, "bbb");
        assert_eq!(reader.bytes_consumed(), 7);

        let err = reader.seek_to(100, 1).unwrap_err();
        assert!(matches!(err, StreamError::SeekPastEnd { offset: 100, total: 12 }));
    }

    #[test]
    fn test_open_missing_file() {
        let err = DumpReader::open(Path::new("/nonexistent/Posts.xml")).err().unwrap();
        assert!(matches!(err, StreamError::Open { .. }));
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress(0, 200), 0);
        assert_eq!(progress(199, 200), 99);
        assert_eq!(progress(200, 200), 100);
        assert_eq!(progress(300, 200), 100);
        assert_eq!(progress(0, 0), 100);
    }

    #[test]
    fn test_progress_gate_only_reports_increases() {
        let mut gate = ProgressGate::new();
        assert_eq!(gate.update(0, 1000), Some(0));
        assert_eq!(gate.update(5, 1000), None);
        assert_eq!(gate.update(10, 1000), Some(1));
        assert_eq!(gate.update(19, 1000), None);
        assert_eq!(gate.update(500, 1000), Some(50));
        assert_eq!(gate.update(500, 1000), None);
        assert_eq!(gate.update(1000, 1000), Some(100));
    }
}
