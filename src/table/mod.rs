//! Read access to a wide-column table.
//!
//! Queries are written against [`Table`] so that the remote service and the
//! in-memory table are interchangeable.

use crate::config::TableName;
use crate::error::Result;
use crate::filter::RowFilter;
use crate::key::RowSet;
use crate::row::Row;

pub mod chunk;
pub mod memory;
pub mod rest;

pub use memory::{MemoryTable, ReadRequest};
pub use rest::RestTable;

#[allow(async_fn_in_trait)]
pub trait Table {
    fn name(&self) -> &TableName;

    /// Stream the rows of `rows` in key order into `on_row`.
    ///
    /// Delivery stops early when `on_row` returns `Ok(false)`; an `Err` from
    /// the callback aborts the read and is returned as-is.
    async fn read_rows<F>(&self, rows: &RowSet, filter: Option<&RowFilter>, on_row: F) -> Result<()>
    where
        F: FnMut(&Row) -> Result<bool>;

    /// Read a single row. `None` when the key does not exist or the filter
    /// left no cells.
    async fn read_row(&self, key: &str, filter: Option<&RowFilter>) -> Result<Option<Row>> {
        let mut found = None;
        self.read_rows(&RowSet::single(key), filter, |row| {
            found = Some(row.clone());
            Ok(false)
        })
        .await?;
        Ok(found)
    }
}
