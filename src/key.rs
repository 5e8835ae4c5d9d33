//! Row keys for the bus telemetry table and the row sets that scan them.
//!
//! Keys have the shape `AgencyID/RouteID/TimeBucketMillis/VehicleID`. Every
//! component sorts lexicographically, so all vehicles of a route in one hour
//! bucket are contiguous and all buckets of a route follow each other.

use std::fmt;

pub const KEY_SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub agency: String,
    pub route: String,
    pub bucket_millis: u64,
    pub vehicle: String,
}

impl RowKey {
    pub fn new(
        agency: impl Into<String>,
        route: impl Into<String>,
        bucket_millis: u64,
        vehicle: impl Into<String>,
    ) -> Self {
        Self {
            agency: agency.into(),
            route: route.into(),
            bucket_millis,
            vehicle: vehicle.into(),
        }
    }

    /// `Agency/Route`: every bucket and vehicle of one route.
    pub fn route_prefix(agency: &str, route: &str) -> String {
        format!("{agency}{KEY_SEPARATOR}{route}")
    }

    /// `Agency/Route/Bucket`: every vehicle of one route within one hour.
    pub fn hour_prefix(agency: &str, route: &str, bucket_millis: u64) -> String {
        format!("{agency}{KEY_SEPARATOR}{route}{KEY_SEPARATOR}{bucket_millis}")
    }

    /// Range covering exactly one hour bucket of a route.
    ///
    /// The end bound is the next millisecond bucket, which sorts after every
    /// `.../bucket/vehicle` key of the hour because `/` sorts before digits.
    pub fn hour_range(agency: &str, route: &str, bucket_millis: u64) -> RowRange {
        RowRange::new(
            Self::hour_prefix(agency, route, bucket_millis),
            Self::hour_prefix(agency, route, bucket_millis + 1),
        )
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{KEY_SEPARATOR}{}",
            Self::hour_prefix(&self.agency, &self.route, self.bucket_millis),
            self.vehicle
        )
    }
}

/// Half-open key range `[start, end)`. An empty `end` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRange {
    pub start: String,
    pub end: String,
}

impl RowRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn prefix(prefix: &str) -> Self {
        Self {
            start: prefix.to_string(),
            end: prefix_successor(prefix),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        key >= self.start.as_str() && (self.end.is_empty() || key < self.end.as_str())
    }
}

impl fmt::Display for RowRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?},{:?})", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSet {
    Keys(Vec<String>),
    Prefix(String),
    Ranges(Vec<RowRange>),
}

impl RowSet {
    pub fn single(key: impl Into<String>) -> Self {
        RowSet::Keys(vec![key.into()])
    }

    /// The row set expressed as explicit keys and ranges, the way it goes
    /// over the wire.
    pub fn normalize(&self) -> (Vec<String>, Vec<RowRange>) {
        match self {
            RowSet::Keys(keys) => (keys.clone(), Vec::new()),
            RowSet::Prefix(prefix) => (Vec::new(), vec![RowRange::prefix(prefix)]),
            RowSet::Ranges(ranges) => (Vec::new(), ranges.clone()),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        match self {
            RowSet::Keys(keys) => keys.iter().any(|k| k == key),
            RowSet::Prefix(prefix) => key.starts_with(prefix.as_str()),
            RowSet::Ranges(ranges) => ranges.iter().any(|r| r.contains(key)),
        }
    }
}

impl fmt::Display for RowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowSet::Keys(keys) => write!(f, "row key {}", keys.join(",")),
            RowSet::Prefix(prefix) => write!(f, "row key {prefix}"),
            RowSet::Ranges(ranges) => {
                f.write_str("row ranges [")?;
                for (i, range) in ranges.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{range}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Smallest key greater than every key starting with `prefix`.
///
/// Works on chars rather than bytes so the result stays valid UTF-8; UTF-8
/// byte order matches code point order, so the bound is the same one the
/// service compares against. Returns an empty string (unbounded) when no such
/// key exists.
pub fn prefix_successor(prefix: &str) -> String {
    let mut key = prefix.to_string();
    while let Some(last) = key.pop() {
        if let Some(next) = next_char(last) {
            key.push(next);
            return key;
        }
    }
    String::new()
}

fn next_char(c: char) -> Option<char> {
    match c {
        '\u{D7FF}' => Some('\u{E000}'),
        char::MAX => None,
        c => char::from_u32(c as u32 + 1),
    }
}
