//! Line-oriented spooling of row metadata.
//!
//! Row sets too large for memory are written to disk one `id,parent_id` line
//! at a time and replayed later. An absent parent is written as `NULL`. There
//! is no header and no escaping; every line must hold exactly two fields.

use crate::core::RowMetadata;
use crate::error::{MigrateError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Field delimiter within a spooled line.
pub const DELIMITER: char = ',';

/// Token written in place of an absent parent id.
pub const NULL_MARKER: &str = "NULL";

/// Serializes row metadata as delimited lines.
pub struct RowMetadataWriter<W: Write> {
    out: BufWriter<W>,
    rows_written: u64,
}

impl<W: Write> RowMetadataWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            out: BufWriter::new(inner),
            rows_written: 0,
        }
    }

    /// Append one row.
    pub fn write(&mut self, row: &RowMetadata) -> Result<()> {
        match row.parent_id {
            Some(parent) => writeln!(self.out, "{}{}{}", row.id, DELIMITER, parent)?,
            None => writeln!(self.out, "{}{}{}", row.id, DELIMITER, NULL_MARKER)?,
        }
        self.rows_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.out
            .into_inner()
            .map_err(|e| MigrateError::Io(e.into_error()))
    }
}

/// Lazily parses spooled lines back into row metadata.
///
/// Yields `None` once the input is exhausted. A malformed line yields one
/// error, after which the reader stays exhausted.
pub struct RowMetadataReader<R: BufRead> {
    input: R,
    line: String,
    line_number: u64,
    done: bool,
}

impl<R: BufRead> RowMetadataReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line: String::new(),
            line_number: 0,
            done: false,
        }
    }

    /// Number of lines consumed so far.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    fn read_next(&mut self) -> Result<Option<RowMetadata>> {
        self.line.clear();
        if self.input.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        let trimmed = self.line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            // Blank line ends the stream, but only if nothing follows it.
            let mut rest = String::new();
            if self.input.read_line(&mut rest)? == 0 {
                return Ok(None);
            }
            return Err(self.parse_error("blank line in the middle of a spool"));
        }
        parse_line(trimmed).map(Some).map_err(|m| self.parse_error(m))
    }

    fn parse_error(&self, message: impl Into<String>) -> MigrateError {
        MigrateError::SpoolParse {
            line: self.line_number,
            message: message.into(),
        }
    }
}

impl<R: BufRead> Iterator for RowMetadataReader<R> {
    type Item = Result<RowMetadata>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn parse_line(line: &str) -> std::result::Result<RowMetadata, String> {
    let fields: Vec<&str> = line.split(DELIMITER).collect();
    if fields.len() != 2 {
        return Err(format!(
            "expected 2 fields separated by '{}', found {}: {:?}",
            DELIMITER,
            fields.len(),
            line
        ));
    }
    let id = fields[0]
        .parse::<i64>()
        .map_err(|e| format!("invalid id {:?}: {}", fields[0], e))?;
    let parent_id = if fields[1] == NULL_MARKER {
        None
    } else {
        Some(
            fields[1]
                .parse::<i64>()
                .map_err(|e| format!("invalid parent id {:?}: {}", fields[1], e))?,
        )
    };
    Ok(RowMetadata { id, parent_id })
}

/// A spool backed by a file that can be replayed any number of times.
#[derive(Debug, Clone)]
pub struct SpoolFile {
    path: PathBuf,
}

impl SpoolFile {
    /// Refer to an existing spool file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create (or truncate) the file and return a writer for it.
    pub fn create(path: impl Into<PathBuf>) -> Result<(Self, RowMetadataWriter<File>)> {
        let path = path.into();
        let file = File::create(&path)?;
        Ok((Self { path }, RowMetadataWriter::new(file)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh reader positioned at the first row.
    pub fn open(&self) -> Result<RowMetadataReader<BufReader<File>>> {
        let file = File::open(&self.path)?;
        Ok(RowMetadataReader::new(BufReader::new(file)))
    }

    /// Read the whole spool into memory.
    pub fn read_all(&self) -> Result<Vec<RowMetadata>> {
        self.open()?.collect()
    }
}
