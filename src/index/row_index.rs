//! Row offset index (C1): a byte-offset table over the data rows of a CSV file, built by a
//! single streaming pass and incrementally extended on tail growth.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, trace};

use crate::error::{Error, Result};

const READ_BLOCK: usize = 128 * 1024;

/// One indexed data row: its byte offset and length, excluding the line terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowEntry {
    pub offset: u64,
    pub len: u32,
}

/// Byte-offset table over a CSV file's data rows (header excluded).
#[derive(Debug, Clone, Default)]
pub struct RowIndex {
    pub entries: Vec<RowEntry>,
    /// Byte offset where the header line ends and data rows begin.
    pub header_end: u64,
    /// First byte beyond the last fully-indexed row; the resume point for `append_from`.
    pub resume_offset: u64,
    /// Bytes of the last indexed row, kept to detect in-place edits on resume.
    last_row_snapshot: Vec<u8>,
}

impl RowIndex {
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Builds the index from scratch: locates the header line, then records the offset and
    /// length of every subsequent complete data row.
    ///
    /// # Errors
    ///
    /// Returns `EmptyFile` for a zero-byte file, `NoHeader` if the header line is never
    /// terminated, or `Io` on any underlying I/O failure.
    pub fn build(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Err(Error::EmptyFile);
        }
        let mut scanner = LineScanner::new(file)?;
        let Some(header) = scanner.next_line()? else {
            return Err(Error::NoHeader);
        };
        let header_end = header.offset + u64::from(header.consumed);

        let mut index = Self {
            entries: Vec::new(),
            header_end,
            resume_offset: header_end,
            last_row_snapshot: Vec::new(),
        };
        index.drain_from(scanner)?;
        debug!(target: "index", rows = index.total_rows(), "row index built");
        Ok(index)
    }

    /// Resumes scanning from `self.resume_offset`, appending newly-completed rows.
    ///
    /// Returns the number of rows appended. If the bytes previously recorded for the last
    /// indexed row no longer match what is on disk, the index is stale and the caller must
    /// discard it and call [`RowIndex::build`] again, signalled by `IndexInvalidated`.
    ///
    /// # Errors
    ///
    /// Returns `IndexInvalidated` if the file's indexed prefix changed underneath us, or `Io`
    /// on any underlying I/O failure.
    pub fn append_from(&mut self, path: &Path) -> Result<u64> {
        let mut file = File::open(path)?;

        if let Some(last) = self.entries.last().copied() {
            let mut observed = vec![0u8; last.len as usize];
            file.seek(SeekFrom::Start(last.offset))?;
            if file.read_exact(&mut observed).is_err() || observed != self.last_row_snapshot {
                return Err(Error::IndexInvalidated {
                    details: "previously indexed row changed underneath the engine".into(),
                });
            }
        }

        let scanner = LineScanner::new_at(file, self.resume_offset)?;
        let before = self.entries.len() as u64;
        self.drain_from(scanner)?;
        let appended = self.entries.len() as u64 - before;
        trace!(target: "index", appended, "row index extended");
        Ok(appended)
    }

    /// Re-reads the last indexed row's bytes from disk and compares them against the snapshot
    /// taken when it was indexed, used by the tail follower to detect in-place edits that leave
    /// the file's size unchanged.
    ///
    /// # Errors
    ///
    /// Returns `Io` on read failure.
    pub fn last_row_bytes_changed(&self, path: &Path) -> Result<bool> {
        let Some(last) = self.entries.last().copied() else {
            return Ok(false);
        };
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(last.offset))?;
        let mut observed = vec![0u8; last.len as usize];
        if file.read_exact(&mut observed).is_err() {
            return Ok(true);
        }
        Ok(observed != self.last_row_snapshot)
    }

    fn drain_from(&mut self, mut scanner: LineScanner) -> Result<()> {
        while let Some(line) = scanner.next_line()? {
            self.entries.push(RowEntry {
                offset: line.offset,
                len: line.content_len,
            });
            self.resume_offset = line.offset + u64::from(line.consumed);
            self.last_row_snapshot = line.bytes;
        }
        Ok(())
    }
}

struct Line {
    offset: u64,
    content_len: u32,
    consumed: u32,
    bytes: Vec<u8>,
}

/// Scans a file in large buffered blocks, yielding complete LF/CRLF-terminated lines. A
/// trailing partial line (no terminator before EOF) is never yielded.
struct LineScanner {
    reader: BufReader<File>,
    block: Vec<u8>,
    pos: usize,
    filled: usize,
    block_start: u64,
    cursor: u64,
}

impl LineScanner {
    fn new(file: File) -> Result<Self> {
        Self::new_at(file, 0)
    }

    fn new_at(mut file: File, start: u64) -> Result<Self> {
        file.seek(SeekFrom::Start(start))?;
        Ok(Self {
            reader: BufReader::with_capacity(READ_BLOCK, file),
            block: vec![0u8; READ_BLOCK],
            pos: 0,
            filled: 0,
            block_start: start,
            cursor: start,
        })
    }

    fn fill(&mut self) -> Result<bool> {
        self.block_start = self.cursor;
        self.filled = self.reader.read(&mut self.block)?;
        self.pos = 0;
        Ok(self.filled > 0)
    }

    /// Returns the next complete line, or `None` at end-of-stream (including a trailing
    /// partial line).
    fn next_line(&mut self) -> Result<Option<Line>> {
        let start_offset = self.cursor;
        let mut bytes = Vec::new();
        loop {
            if self.pos >= self.filled && !self.fill()? {
                return Ok(None);
            }
            let window = &self.block[self.pos..self.filled];
            if let Some(nl) = window.iter().position(|&b| b == b'\n') {
                bytes.extend_from_slice(&window[..nl]);
                self.pos += nl + 1;
                self.cursor = self.block_start + self.pos as u64;
                let mut content_len = bytes.len();
                if content_len > 0 && bytes[content_len - 1] == b'\r' {
                    content_len -= 1;
                    bytes.truncate(content_len);
                }
                let consumed = u32::try_from(self.cursor - start_offset).unwrap_or(u32::MAX);
                let content_len = u32::try_from(content_len).unwrap_or(u32::MAX);
                return Ok(Some(Line {
                    offset: start_offset,
                    content_len,
                    consumed,
                    bytes,
                }));
            }
            bytes.extend_from_slice(window);
            self.pos = self.filled;
            self.cursor = self.block_start + self.pos as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn indexes_lf_rows() {
        let f = write_tmp("t,a\n0,1\n1,2\n2,3\n");
        let idx = RowIndex::build(f.path()).unwrap();
        assert_eq!(idx.total_rows(), 3);
    }

    #[test]
    fn indexes_crlf_rows_without_extra_malformed() {
        let f = write_tmp("t,a\r\n0,1\r\n1,2\r\n");
        let idx = RowIndex::build(f.path()).unwrap();
        assert_eq!(idx.total_rows(), 2);
        assert_eq!(idx.entries[0].len, 3); // "0,1" excludes \r\n
    }

    #[test]
    fn trailing_partial_line_not_indexed() {
        let f = write_tmp("t,a\n0,1\n1,2");
        let idx = RowIndex::build(f.path()).unwrap();
        assert_eq!(idx.total_rows(), 1);
    }

    #[test]
    fn empty_body_is_legal() {
        let f = write_tmp("t,a\n");
        let idx = RowIndex::build(f.path()).unwrap();
        assert_eq!(idx.total_rows(), 0);
    }

    #[test]
    fn empty_file_is_an_error() {
        let f = write_tmp("");
        assert!(matches!(RowIndex::build(f.path()), Err(Error::EmptyFile)));
    }

    #[test]
    fn append_from_extends_prefix_unchanged() {
        let mut f = write_tmp("t,a\n0,1\n1,2\n");
        let mut idx = RowIndex::build(f.path()).unwrap();
        let original_first = idx.entries[0];
        f.write_all(b"2,3\n3,4\n").unwrap();
        f.flush().unwrap();
        let appended = idx.append_from(f.path()).unwrap();
        assert_eq!(appended, 2);
        assert_eq!(idx.total_rows(), 4);
        assert_eq!(idx.entries[0], original_first);
    }

    #[test]
    fn partial_line_growth_is_indexed_on_next_append() {
        let mut f = write_tmp("t,a\n0,1\n");
        let mut idx = RowIndex::build(f.path()).unwrap();
        f.write_all(b"1,2").unwrap(); // partial line, no terminator yet
        f.flush().unwrap();
        idx.append_from(f.path()).unwrap();
        assert_eq!(idx.total_rows(), 1);
        f.write_all(b"\n").unwrap();
        f.flush().unwrap();
        idx.append_from(f.path()).unwrap();
        assert_eq!(idx.total_rows(), 2);
    }
}
