//! Canned queries over the NYC bus-location table in Cloud Bigtable.
//!
//! Rows are keyed `Agency/Route/HourBucketMillis/Vehicle` and carry
//! `VehicleLocation.Latitude` / `VehicleLocation.Longitude` versions in the
//! `cf` family. Each query issues one read (point lookup, prefix scan or
//! multi-range scan) and prints the coordinates it finds.

pub mod config;
pub mod coords;
pub mod error;
pub mod filter;
pub mod key;
pub mod query;
pub mod row;
pub mod table;

pub use config::{ClientConfig, QueryArgs, TableName};
pub use error::{Error, ErrorKind, Result};
pub use filter::RowFilter;
pub use key::{RowKey, RowRange, RowSet};
pub use query::{run_query, Query};
pub use row::{ReadItem, Row};
pub use table::{MemoryTable, RestTable, Table};
