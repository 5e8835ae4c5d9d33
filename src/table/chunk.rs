//! Row reassembly for the ReadRows response stream.
//!
//! The service sends rows as a sequence of cell chunks. A chunk only carries
//! the row key, family and qualifier when they change, a large value may be
//! split over several chunks, and a row is only final once a chunk sets
//! `commit_row`. `reset_row` throws away everything received for the row in
//! progress.

use crate::error::{Error, Result};
use crate::row::Row;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellChunk {
    pub row_key: Option<String>,
    pub family: Option<String>,
    pub qualifier: Option<String>,
    pub timestamp_micros: i64,
    pub value: Vec<u8>,
    /// Non-zero while more pieces of this value follow.
    pub value_size: i32,
    pub reset_row: bool,
    pub commit_row: bool,
}

#[derive(Debug)]
struct PartialCell {
    timestamp_micros: i64,
    value: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct ChunkMerger {
    last_key: Option<String>,
    row: Option<Row>,
    family: Option<String>,
    qualifier: Option<String>,
    cell: Option<PartialCell>,
}

impl ChunkMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the row it completed, if any.
    pub fn push(&mut self, chunk: CellChunk) -> Result<Option<Row>> {
        if chunk.reset_row {
            self.reset(&chunk)?;
            return Ok(None);
        }

        let CellChunk {
            row_key,
            family,
            qualifier,
            timestamp_micros,
            value,
            value_size,
            commit_row,
            ..
        } = chunk;

        if let Some(cell) = self.cell.as_mut() {
            if row_key.is_some() || family.is_some() || qualifier.is_some() {
                return Err(protocol("split value interrupted by a new cell"));
            }
            cell.value.extend_from_slice(&value);
        } else {
            self.start_row(row_key)?;
            self.set_column(family, qualifier)?;
            self.cell = Some(PartialCell {
                timestamp_micros,
                value,
            });
        }

        if value_size > 0 {
            if commit_row {
                return Err(protocol("commit_row on a split value"));
            }
            return Ok(None);
        }

        self.finish_cell()?;
        if commit_row {
            return self.commit().map(Some);
        }
        Ok(None)
    }

    /// Check that the stream did not end in the middle of a row.
    pub fn finish(&self) -> Result<()> {
        if self.row.is_some() || self.cell.is_some() {
            return Err(protocol("stream ended with an uncommitted row"));
        }
        Ok(())
    }

    fn reset(&mut self, chunk: &CellChunk) -> Result<()> {
        if self.row.is_none() {
            return Err(protocol("reset_row with no row in progress"));
        }
        if chunk.row_key.is_some()
            || chunk.family.is_some()
            || chunk.qualifier.is_some()
            || !chunk.value.is_empty()
            || chunk.commit_row
        {
            return Err(protocol("reset_row chunk carries data"));
        }
        self.row = None;
        self.family = None;
        self.qualifier = None;
        self.cell = None;
        Ok(())
    }

    fn start_row(&mut self, row_key: Option<String>) -> Result<()> {
        match (row_key, self.row.as_ref()) {
            (Some(key), Some(row)) => {
                if key != row.key() {
                    return Err(protocol("new row key before the previous row committed"));
                }
            }
            (Some(key), None) => {
                if key.is_empty() {
                    return Err(protocol("empty row key"));
                }
                if let Some(last) = &self.last_key {
                    if key.as_str() <= last.as_str() {
                        return Err(protocol("row keys out of order"));
                    }
                }
                self.row = Some(Row::new(key));
                self.family = None;
                self.qualifier = None;
            }
            (None, Some(_)) => {}
            (None, None) => return Err(protocol("cell chunk without a row key")),
        }
        Ok(())
    }

    fn set_column(&mut self, family: Option<String>, qualifier: Option<String>) -> Result<()> {
        if let Some(family) = family {
            if qualifier.is_none() {
                return Err(protocol("family changed without a qualifier"));
            }
            self.family = Some(family);
        }
        if let Some(qualifier) = qualifier {
            if self.family.is_none() {
                return Err(protocol("qualifier without a family"));
            }
            self.qualifier = Some(qualifier);
        }
        if self.qualifier.is_none() {
            return Err(protocol("cell chunk without a column"));
        }
        Ok(())
    }

    fn finish_cell(&mut self) -> Result<()> {
        let (Some(cell), Some(row), Some(family), Some(qualifier)) = (
            self.cell.take(),
            self.row.as_mut(),
            self.family.as_deref(),
            self.qualifier.as_deref(),
        ) else {
            return Err(protocol("cell finished outside a row"));
        };
        row.push(family, qualifier, cell.timestamp_micros, cell.value);
        Ok(())
    }

    fn commit(&mut self) -> Result<Row> {
        let row = self
            .row
            .take()
            .ok_or_else(|| protocol("commit_row with no row in progress"))?;
        self.family = None;
        self.qualifier = None;
        self.last_key = Some(row.key().to_string());
        Ok(row)
    }
}

fn protocol(msg: &str) -> Error {
    Error::Decode(format!("read rows: {msg}"))
}
