use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::TableName;
use crate::error::{Error, Result};
use crate::filter::{CellRef, RowFilter};
use crate::key::RowSet;
use crate::row::Row;
use crate::table::Table;

/// One read issued against a [`MemoryTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub rows: RowSet,
    pub filter: Option<RowFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureCell {
    #[serde(default = "default_family")]
    pub family: String,
    pub qualifier: String,
    pub timestamp_micros: i64,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureRow {
    pub key: String,
    pub cells: Vec<FixtureCell>,
}

fn default_family() -> String {
    crate::query::COLUMN_FAMILY.to_string()
}

#[derive(Debug, Clone)]
struct StoredCell {
    family: String,
    qualifier: String,
    timestamp_micros: i64,
    value: Vec<u8>,
}

/// Table held in process memory.
///
/// Evaluates row sets and filters the way the service does and records every
/// read, so tests can see exactly what a query asked for.
#[derive(Debug)]
pub struct MemoryTable {
    name: TableName,
    rows: BTreeMap<String, Vec<StoredCell>>,
    requests: RefCell<Vec<ReadRequest>>,
}

impl MemoryTable {
    pub fn new(name: TableName) -> Self {
        Self {
            name,
            rows: BTreeMap::new(),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn from_fixture(name: TableName, rows: Vec<FixtureRow>) -> Self {
        let mut table = Self::new(name);
        for row in rows {
            for cell in row.cells {
                table.insert(
                    &row.key,
                    &cell.family,
                    &cell.qualifier,
                    cell.timestamp_micros,
                    cell.value.into_bytes(),
                );
            }
        }
        table
    }

    /// Load a JSON array of [`FixtureRow`] from `path`.
    pub fn load_fixture(name: TableName, path: &Path) -> Result<Self> {
        let wrap = |source: Error| Error::Fixture {
            path: path.to_path_buf(),
            source: Box::new(source),
        };
        let text = fs::read_to_string(path).map_err(|e| wrap(e.into()))?;
        let rows: Vec<FixtureRow> = serde_json::from_str(&text).map_err(|e| wrap(e.into()))?;
        log::debug!("loaded {} fixture rows from {}", rows.len(), path.display());
        Ok(Self::from_fixture(name, rows))
    }

    /// Write one cell version. A version with the same column and timestamp
    /// is overwritten.
    pub fn insert(
        &mut self,
        key: &str,
        family: &str,
        qualifier: &str,
        timestamp_micros: i64,
        value: Vec<u8>,
    ) {
        let cells = self.rows.entry(key.to_string()).or_default();
        let order = |c: &StoredCell| {
            (
                c.family.as_str().cmp(family),
                c.qualifier.as_str().cmp(qualifier),
                timestamp_micros.cmp(&c.timestamp_micros),
            )
        };
        match cells.binary_search_by(|c| {
            let (f, q, t) = order(c);
            f.then(q).then(t)
        }) {
            Ok(idx) => cells[idx].value = value,
            Err(idx) => cells.insert(
                idx,
                StoredCell {
                    family: family.to_string(),
                    qualifier: qualifier.to_string(),
                    timestamp_micros,
                    value,
                },
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn requests(&self) -> Vec<ReadRequest> {
        self.requests.borrow().clone()
    }
}

impl Table for MemoryTable {
    fn name(&self) -> &TableName {
        &self.name
    }

    async fn read_rows<F>(&self, rows: &RowSet, filter: Option<&RowFilter>, mut on_row: F) -> Result<()>
    where
        F: FnMut(&Row) -> Result<bool>,
    {
        self.requests.borrow_mut().push(ReadRequest {
            rows: rows.clone(),
            filter: filter.cloned(),
        });
        let compiled = filter.map(RowFilter::compile).transpose()?;

        for (key, cells) in self.rows.iter().filter(|(key, _)| rows.contains(key)) {
            let refs: Vec<CellRef<'_>> = cells
                .iter()
                .map(|c| (c.family.as_str(), c.qualifier.as_str(), c.timestamp_micros))
                .collect();
            let keep = match &compiled {
                Some(filter) => filter.select(&refs),
                None => (0..cells.len()).collect(),
            };
            if keep.is_empty() {
                continue;
            }

            let mut row = Row::new(key.as_str());
            for idx in keep {
                let cell = &cells[idx];
                row.push(
                    &cell.family,
                    &cell.qualifier,
                    cell.timestamp_micros,
                    cell.value.clone(),
                );
            }
            if !on_row(&row)? {
                break;
            }
        }
        Ok(())
    }
}
