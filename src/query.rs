//! The canned bus queries and their dispatcher.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::coords::print_lat_long_pairs;
use crate::error::{Error, Result};
use crate::filter::RowFilter;
use crate::key::{RowKey, RowSet};
use crate::table::Table;

pub const COLUMN_FAMILY: &str = "cf";
pub const COLUMN_REGEX: &str = "VehicleLocation.*";

const AGENCY: &str = "MTA";
const ROUTE: &str = "M86-SBS";
const VEHICLE: &str = "NYCT_5824";
/// June 1, 2017, 12:00am.
const HOUR_BUCKET_MILLIS: u64 = 1_496_275_200_000;

pub const MANHATTAN_BUS_LINES: &[&str] = &[
    "M1", "M2", "M3", "M4", "M5", "M7", "M8", "M9", "M10", "M11", "M12", "M15", "M20", "M21",
    "M22", "M31", "M35", "M42", "M50", "M55", "M57", "M66", "M72", "M96", "M98", "M100", "M101",
    "M102", "M103", "M104", "M106", "M116", "M14A", "M34A-SBS", "M14D", "M15-SBS", "M23-SBS",
    "M34-SBS", "M60-SBS", "M79-SBS", "M86-SBS",
];

pub const USAGE: &str = "Please provide one of the following queries: lookupVehicleInGivenHour, \
scanBusLineInGivenHour, scanEntireBusLine, filterBusesGoingEast, filterBusesGoingWest, \
scanManhattanBusesInGivenHour.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    LookupVehicleInGivenHour,
    ScanBusLineInGivenHour,
    ScanEntireBusLine,
    ScanManhattanBusesInGivenHour,
    FilterBusesGoingEast,
    FilterBusesGoingWest,
}

impl Query {
    pub const ALL: [Query; 6] = [
        Query::LookupVehicleInGivenHour,
        Query::ScanBusLineInGivenHour,
        Query::ScanEntireBusLine,
        Query::ScanManhattanBusesInGivenHour,
        Query::FilterBusesGoingEast,
        Query::FilterBusesGoingWest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Query::LookupVehicleInGivenHour => "lookupVehicleInGivenHour",
            Query::ScanBusLineInGivenHour => "scanBusLineInGivenHour",
            Query::ScanEntireBusLine => "scanEntireBusLine",
            Query::ScanManhattanBusesInGivenHour => "scanManhattanBusesInGivenHour",
            Query::FilterBusesGoingEast => "filterBusesGoingEast",
            Query::FilterBusesGoingWest => "filterBusesGoingWest",
        }
    }

    pub async fn run<T: Table>(self, table: &T, out: &mut dyn Write) -> Result<()> {
        match self {
            Query::LookupVehicleInGivenHour => lookup_vehicle_in_given_hour(table, out).await,
            Query::ScanBusLineInGivenHour => scan_bus_line_in_given_hour(table, out).await,
            Query::ScanEntireBusLine => scan_entire_bus_line(table, out).await,
            Query::ScanManhattanBusesInGivenHour => {
                scan_manhattan_buses_in_given_hour(table, out).await
            }
            Query::FilterBusesGoingEast => filter_buses_going_east(table, out),
            Query::FilterBusesGoingWest => filter_buses_going_west(table, out),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownQuery(pub String);

impl fmt::Display for UnknownQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown query: {}", self.0)
    }
}

impl std::error::Error for UnknownQuery {}

impl FromStr for Query {
    type Err = UnknownQuery;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Query::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| UnknownQuery(s.to_string()))
    }
}

/// Run the query called `name`. An unknown name prints [`USAGE`] and reads
/// nothing.
pub async fn run_query<T: Table>(table: &T, name: &str, out: &mut dyn Write) -> Result<()> {
    match name.parse::<Query>() {
        Ok(query) => {
            log::debug!("running {query} against {}", table.name());
            query.run(table, out).await
        }
        Err(_) => {
            writeln!(out, "{USAGE}")?;
            Ok(())
        }
    }
}

fn column_filter() -> RowFilter {
    RowFilter::column(COLUMN_REGEX)
}

pub async fn lookup_vehicle_in_given_hour<T: Table>(table: &T, out: &mut dyn Write) -> Result<()> {
    let row_key = RowKey::new(AGENCY, ROUTE, HOUR_BUCKET_MILLIS, VEHICLE).to_string();

    let row = table
        .read_row(&row_key, Some(&column_filter()))
        .await
        .map_err(|e| Error::read(format!("row with key {row_key}"), e))?;

    writeln!(
        out,
        "Lookup a specific vehicle on the M86 route on June 1, 2017 from 12:00am to 1:00am:"
    )?;
    match row {
        Some(row) => print_lat_long_pairs(&row, out)?,
        None => log::warn!("no row with key {row_key}"),
    }
    Ok(())
}

pub async fn scan_bus_line_in_given_hour<T: Table>(table: &T, out: &mut dyn Write) -> Result<()> {
    let prefix = RowKey::hour_prefix(AGENCY, ROUTE, HOUR_BUCKET_MILLIS);

    writeln!(out, "Scan for all M86 buses on June 1, 2017 from 12:00am to 1:00am:")?;
    scan(table, RowSet::Prefix(prefix), column_filter(), out).await
}

pub async fn scan_entire_bus_line<T: Table>(table: &T, out: &mut dyn Write) -> Result<()> {
    let prefix = RowKey::route_prefix(AGENCY, ROUTE);
    // Latest version only: one month of data.
    let filter = RowFilter::chain([column_filter(), RowFilter::LatestN(1)]);

    writeln!(out, "Scan for all m86 during the month:")?;
    scan(table, RowSet::Prefix(prefix), filter, out).await
}

pub async fn scan_manhattan_buses_in_given_hour<T: Table>(
    table: &T,
    out: &mut dyn Write,
) -> Result<()> {
    let ranges = MANHATTAN_BUS_LINES
        .iter()
        .map(|line| RowKey::hour_range(AGENCY, line, HOUR_BUCKET_MILLIS))
        .collect();

    writeln!(out, "Scan for all buses on June 1, 2017 from 12:00am to 1:00am:")?;
    scan(table, RowSet::Ranges(ranges), column_filter(), out).await
}

pub fn filter_buses_going_east<T: Table>(table: &T, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "Table: {}", table.name())?;
    Ok(())
}

pub fn filter_buses_going_west<T: Table>(table: &T, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "Table: {}", table.name())?;
    Ok(())
}

async fn scan<T: Table>(
    table: &T,
    rows: RowSet,
    filter: RowFilter,
    out: &mut dyn Write,
) -> Result<()> {
    let mut count = 0usize;
    table
        .read_rows(&rows, Some(&filter), |row| {
            count += 1;
            print_lat_long_pairs(row, out)?;
            Ok(true)
        })
        .await
        .map_err(|e| Error::read(rows.to_string(), e))?;
    log::debug!("{count} rows for {rows}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for query in Query::ALL {
            assert_eq!(query.as_str().parse::<Query>(), Ok(query));
        }
        assert!("scanentirebusline".parse::<Query>().is_err());
    }

    #[test]
    fn usage_lists_every_query() {
        for query in Query::ALL {
            assert!(USAGE.contains(query.as_str()), "{query} missing from usage");
        }
    }

    #[test]
    fn manhattan_lines_are_unique() {
        let mut lines = MANHATTAN_BUS_LINES.to_vec();
        lines.sort_unstable();
        lines.dedup();
        assert_eq!(lines.len(), 41);
        assert_eq!(MANHATTAN_BUS_LINES.len(), 41);
    }
}
