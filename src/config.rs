use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_ENDPOINT: &str = "https://bigtable.googleapis.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fully-qualified table handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub project: String,
    pub instance: String,
    pub table: String,
}

impl TableName {
    pub fn new(
        project: impl Into<String>,
        instance: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            instance: instance.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/instances/{}/tables/{}",
            self.project, self.instance, self.table
        )
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub table: TableName,
    pub endpoint: String,
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            access_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// The four flags every invocation must carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryArgs {
    pub project: String,
    pub instance: String,
    pub table: String,
    pub query: String,
}

impl QueryArgs {
    /// Reject empty values, in flag order.
    pub fn validate(&self) -> Result<()> {
        for (flag, value) in [
            ("project", &self.project),
            ("instance", &self.instance),
            ("table", &self.table),
            ("query", &self.query),
        ] {
            if value.is_empty() {
                return Err(Error::MissingFlag(flag));
            }
        }
        Ok(())
    }

    pub fn table_name(&self) -> TableName {
        TableName::new(&self.project, &self.instance, &self.table)
    }
}
