use crate::core::error::{AnalysisError, MalformedKind, Result};
use crate::core::model::{Block, Header, RawRow};
use std::io::BufRead;
use std::sync::Arc;

pub const DEFAULT_CHUNK_SIZE: usize = 5000;
const PREALLOC_ROWS: usize = 1 << 16;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

enum LineEnd {
    Newline,
    Unterminated,
    Eof,
}

/// Pull-based reader yielding blocks of at most `chunk_size` rows.
///
/// The header is consumed by [`BlockReader::new`], so the sample columns are
/// known before the first block is requested. After an error the reader is
/// exhausted.
pub struct BlockReader<R> {
    input: R,
    delimiter: u8,
    chunk_size: usize,
    header: Header,
    buf: Vec<u8>,
    line_no: u64,
    rows_read: u64,
    next_index: usize,
    done: bool,
}

impl<R: BufRead> BlockReader<R> {
    /// A `chunk_size` of zero is treated as one.
    pub fn new(mut input: R, delimiter: u8, chunk_size: usize) -> Result<Self> {
        let mut buf = Vec::new();
        let mut line_no = 0u64;
        loop {
            if let LineEnd::Eof = read_line(&mut input, &mut buf)? {
                return Err(AnalysisError::malformed(
                    line_no + 1,
                    MalformedKind::MissingHeader,
                ));
            }
            line_no += 1;
            if buf.starts_with(UTF8_BOM) {
                buf.drain(..UTF8_BOM.len());
            }
            if !buf.is_empty() {
                break;
            }
        }

        let text = std::str::from_utf8(&buf)
            .map_err(|_| AnalysisError::malformed(line_no, MalformedKind::InvalidUtf8))?;
        let mut names = text.split(delimiter as char).map(str::to_string);
        let id_column = names.next().unwrap_or_default();
        let samples: Arc<[String]> = names.collect();

        Ok(Self {
            input,
            delimiter,
            chunk_size: chunk_size.max(1),
            header: Header { id_column, samples },
            buf,
            line_no,
            rows_read: 0,
            next_index: 0,
            done: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    fn next_row(&mut self) -> Result<Option<RawRow>> {
        loop {
            let end = read_line(&mut self.input, &mut self.buf)?;
            if let LineEnd::Eof = end {
                return Ok(None);
            }
            self.line_no += 1;
            if self.buf.is_empty() {
                continue;
            }

            let expected = self.header.width();
            let found = memchr::memchr_iter(self.delimiter, &self.buf).count() + 1;
            if found != expected {
                let kind = match end {
                    LineEnd::Unterminated => MalformedKind::TruncatedRow { expected, found },
                    _ => MalformedKind::ColumnCount { expected, found },
                };
                return Err(AnalysisError::malformed(self.line_no, kind));
            }

            let text = std::str::from_utf8(&self.buf)
                .map_err(|_| AnalysisError::malformed(self.line_no, MalformedKind::InvalidUtf8))?;
            let mut fields = text.split(self.delimiter as char);
            let gene = fields.next().unwrap_or_default().to_string();
            let values = fields.map(str::to_string).collect();
            return Ok(Some(RawRow { gene, values }));
        }
    }
}

impl<R: BufRead> Iterator for BlockReader<R> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let first_row = self.rows_read;
        let mut rows = Vec::with_capacity(self.chunk_size.min(PREALLOC_ROWS));
        while rows.len() < self.chunk_size {
            match self.next_row() {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        if rows.is_empty() {
            return None;
        }
        self.rows_read += rows.len() as u64;
        let block = Block {
            index: self.next_index,
            first_row,
            rows,
        };
        self.next_index += 1;
        Some(Ok(block))
    }
}

/// Reads one line into `buf` without its `\n` / `\r\n` terminator.
fn read_line<R: BufRead>(input: &mut R, buf: &mut Vec<u8>) -> Result<LineEnd> {
    buf.clear();
    let n = input.read_until(b'\n', buf)?;
    if n == 0 {
        return Ok(LineEnd::Eof);
    }
    let end = if buf.last() == Some(&b'\n') {
        buf.pop();
        LineEnd::Newline
    } else {
        LineEnd::Unterminated
    };
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(end)
}
