use std::io::{self, prelude::*};
use std::ops::Index;
use std::slice::Iter;

use memchr::memchr;
use thiserror::Error;

use crate::codec::CompressionType;

/// The position of one `BinData` payload as reported while parsing, and the
/// compression its element declared.
///
/// `line` and `column` are 1-based, and `column` counts bytes, so the payload
/// starts `column - 1` bytes after the start of `line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BinDataRecord {
    pub line: u64,
    pub column: u64,
    pub compression: CompressionType,
}

impl BinDataRecord {
    pub const fn new(line: u64, column: u64, compression: CompressionType) -> Self {
        Self {
            line,
            column,
            compression,
        }
    }
}

/**
The absolute byte offsets of every `BinData` payload in a document, in
document order. Entry `i` is the first byte of the payload of block `i`.
*/
#[derive(Default, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ByteOffsetTable {
    offsets: Vec<u64>,
}

impl ByteOffsetTable {
    pub fn new(offsets: Vec<u64>) -> Self {
        Self { offsets }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<u64> {
        self.offsets.get(index).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, u64> {
        self.offsets.iter()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.offsets
    }
}

impl Index<usize> for ByteOffsetTable {
    type Output = u64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.offsets[index]
    }
}

#[derive(Debug, Error)]
pub enum OffsetResolutionError {
    #[error("The stream ended on line {reached_line} before reaching line {line} of block {block_index}")]
    StreamExhausted {
        block_index: usize,
        line: u64,
        reached_line: u64,
    },
    #[error("Block {block_index} at line {line}, column {column} precedes the block before it")]
    OutOfOrder {
        block_index: usize,
        line: u64,
        column: u64,
    },
    #[error("An IO error occurred while resolving offsets: {0}")]
    IOError(#[from] io::Error),
}

impl From<OffsetResolutionError> for io::Error {
    fn from(value: OffsetResolutionError) -> Self {
        match value {
            OffsetResolutionError::IOError(e) => e,
            _ => io::Error::new(io::ErrorKind::UnexpectedEof, value),
        }
    }
}

/// Consume bytes through the next newline, returning how many were consumed, or
/// `None` if the stream ended first.
fn skip_line<R: BufRead>(reader: &mut R) -> io::Result<Option<u64>> {
    let mut consumed = 0u64;
    loop {
        let (found, used) = {
            let buf = reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(None);
            }
            match memchr(b'\n', buf) {
                Some(i) => (true, i + 1),
                None => (false, buf.len()),
            }
        };
        reader.consume(used);
        consumed += used as u64;
        if found {
            return Ok(Some(consumed));
        }
    }
}

/// Convert line and column positions into absolute byte offsets.
///
/// `reader` must be positioned where parsing began, at absolute offset `start_offset`.
/// Whole lines are skipped without being buffered, so memory use does not depend on
/// how long the lines holding payloads are.
pub fn resolve_offsets<R: BufRead>(
    reader: &mut R,
    start_offset: u64,
    records: &[BinDataRecord],
) -> Result<ByteOffsetTable, OffsetResolutionError> {
    let mut offsets = Vec::with_capacity(records.len());
    let mut current_line = 1u64;
    let mut line_start = 0u64;
    let mut last: Option<(u64, u64)> = None;

    for (block_index, record) in records.iter().enumerate() {
        if let Some(prev) = last {
            if (record.line, record.column) <= prev {
                return Err(OffsetResolutionError::OutOfOrder {
                    block_index,
                    line: record.line,
                    column: record.column,
                });
            }
        }
        last = Some((record.line, record.column));

        while current_line < record.line {
            match skip_line(reader)? {
                Some(n) => {
                    line_start += n;
                    current_line += 1;
                }
                None => {
                    return Err(OffsetResolutionError::StreamExhausted {
                        block_index,
                        line: record.line,
                        reached_line: current_line,
                    })
                }
            }
        }
        offsets.push(start_offset + line_start + record.column.saturating_sub(1));
    }
    Ok(ByteOffsetTable::new(offsets))
}
