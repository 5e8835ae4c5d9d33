use std::io::Write;

use crate::error::{Error, Result};
use crate::row::Row;

/// Print the latitude/longitude pairs of every column family in `row`.
///
/// Each family is expected to hold N latitude versions followed by N
/// longitude versions; version `i` of one pairs with version `i` of the other.
pub fn print_lat_long_pairs(row: &Row, out: &mut dyn Write) -> Result<()> {
    for (_, cells) in row.families() {
        if cells.len() % 2 != 0 {
            return Err(Error::OddCellCount {
                row_key: row.key().to_string(),
                count: cells.len(),
            });
        }

        let span = cells.len() / 2;
        for (lat, long) in cells[..span].iter().zip(&cells[span..]) {
            writeln!(out, "{}, {}", lat.value_str(), long.value_str())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_with(cells: &[(&str, &str)]) -> Row {
        let mut row = Row::new("MTA/M86-SBS/1496275200000/NYCT_5824");
        for (i, (qualifier, value)) in cells.iter().enumerate() {
            row.push("cf", qualifier, 100 - i as i64, value.as_bytes().to_vec());
        }
        row
    }

    #[test]
    fn pairs_first_half_with_second_half() {
        let row = row_with(&[
            ("VehicleLocation.Latitude", "40.781"),
            ("VehicleLocation.Latitude", "40.782"),
            ("VehicleLocation.Latitude", "40.783"),
            ("VehicleLocation.Longitude", "-73.951"),
            ("VehicleLocation.Longitude", "-73.952"),
            ("VehicleLocation.Longitude", "-73.953"),
        ]);
        let mut out = Vec::new();
        print_lat_long_pairs(&row, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "40.781, -73.951\n40.782, -73.952\n40.783, -73.953\n"
        );
    }

    #[test]
    fn odd_cell_count_is_an_error() {
        let row = row_with(&[
            ("VehicleLocation.Latitude", "40.781"),
            ("VehicleLocation.Latitude", "40.782"),
            ("VehicleLocation.Longitude", "-73.951"),
        ]);
        let mut out = Vec::new();
        let err = print_lat_long_pairs(&row, &mut out).unwrap_err();
        assert!(matches!(err, Error::OddCellCount { count: 3, .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn empty_row_prints_nothing() {
        let mut out = Vec::new();
        print_lat_long_pairs(&Row::new("k"), &mut out).unwrap();
        assert!(out.is_empty());
    }
}
