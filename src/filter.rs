use std::fmt;

use regex::Regex;

use crate::error::Result;

/// Server-side row filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFilter {
    /// Keep cells whose column qualifier fully matches the RE2 pattern.
    ColumnRegex(String),
    /// Keep only the newest `n` versions of every column.
    LatestN(u32),
    /// Apply filters in sequence, each to the output of the previous one.
    Chain(Vec<RowFilter>),
}

impl RowFilter {
    pub fn column(pattern: impl Into<String>) -> Self {
        RowFilter::ColumnRegex(pattern.into())
    }

    pub fn chain(filters: impl IntoIterator<Item = RowFilter>) -> Self {
        RowFilter::Chain(filters.into_iter().collect())
    }

    /// Compile the filter for local evaluation.
    pub fn compile(&self) -> Result<CompiledFilter> {
        Ok(match self {
            RowFilter::ColumnRegex(pattern) => {
                CompiledFilter::Column(Regex::new(&format!("^(?:{pattern})$"))?)
            }
            RowFilter::LatestN(n) => CompiledFilter::Latest(*n as usize),
            RowFilter::Chain(filters) => CompiledFilter::Chain(
                filters
                    .iter()
                    .map(RowFilter::compile)
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowFilter::ColumnRegex(pattern) => write!(f, "col({pattern})"),
            RowFilter::LatestN(n) => write!(f, "cells_per_column <= {n}"),
            RowFilter::Chain(filters) => {
                f.write_str("(")?;
                for (i, filter) in filters.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum CompiledFilter {
    Column(Regex),
    Latest(usize),
    Chain(Vec<CompiledFilter>),
}

/// A cell as seen by a filter: `(family, qualifier, timestamp_micros)`.
pub type CellRef<'a> = (&'a str, &'a str, i64);

impl CompiledFilter {
    /// Indices of the cells that survive, in input order.
    ///
    /// `cells` must be in storage order: family, then qualifier, then newest
    /// timestamp first.
    pub fn select(&self, cells: &[CellRef<'_>]) -> Vec<usize> {
        let all: Vec<usize> = (0..cells.len()).collect();
        self.select_from(cells, all)
    }

    fn select_from(&self, cells: &[CellRef<'_>], input: Vec<usize>) -> Vec<usize> {
        match self {
            CompiledFilter::Column(re) => input
                .into_iter()
                .filter(|&i| re.is_match(cells[i].1))
                .collect(),
            CompiledFilter::Latest(n) => {
                let mut out = Vec::with_capacity(input.len());
                let mut column: Option<(&str, &str)> = None;
                let mut seen = 0usize;
                for i in input {
                    let (family, qualifier, _) = cells[i];
                    if column != Some((family, qualifier)) {
                        column = Some((family, qualifier));
                        seen = 0;
                    }
                    if seen < *n {
                        out.push(i);
                    }
                    seen += 1;
                }
                out
            }
            CompiledFilter::Chain(filters) => filters
                .iter()
                .fold(input, |acc, filter| filter.select_from(cells, acc)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells() -> Vec<CellRef<'static>> {
        vec![
            ("cf", "VehicleLocation.Latitude", 30),
            ("cf", "VehicleLocation.Latitude", 20),
            ("cf", "VehicleLocation.Longitude", 30),
            ("cf", "VehicleLocation.Longitude", 20),
            ("cf", "VehicleRef", 30),
        ]
    }

    #[test]
    fn column_regex_is_full_match() {
        let filter = RowFilter::column("VehicleLocation.*").compile().unwrap();
        assert_eq!(filter.select(&cells()), vec![0, 1, 2, 3]);

        let filter = RowFilter::column("Vehicle").compile().unwrap();
        assert!(filter.select(&cells()).is_empty());
    }

    #[test]
    fn latest_n_keeps_newest_per_column() {
        let filter = RowFilter::LatestN(1).compile().unwrap();
        assert_eq!(filter.select(&cells()), vec![0, 2, 4]);
    }

    #[test]
    fn chain_applies_in_order() {
        let filter = RowFilter::chain([RowFilter::column("VehicleLocation.*"), RowFilter::LatestN(1)])
            .compile()
            .unwrap();
        assert_eq!(filter.select(&cells()), vec![0, 2]);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(RowFilter::column("(").compile().is_err());
    }

    #[test]
    fn display_chain() {
        let filter = RowFilter::chain([RowFilter::column("VehicleLocation.*"), RowFilter::LatestN(1)]);
        assert_eq!(
            filter.to_string(),
            "(col(VehicleLocation.*) | cells_per_column <= 1)"
        );
    }
}
