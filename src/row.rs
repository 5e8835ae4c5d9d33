use std::collections::BTreeMap;

/// One version of one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadItem {
    pub row: String,
    /// `family:qualifier`
    pub column: String,
    pub timestamp_micros: i64,
    pub value: Vec<u8>,
}

impl ReadItem {
    pub fn qualifier(&self) -> &str {
        self.column
            .split_once(':')
            .map(|(_, qualifier)| qualifier)
            .unwrap_or(&self.column)
    }

    pub fn value_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// A row as returned by a read: cell versions grouped by column family.
///
/// Within a family, items keep the order the table returned them in, which is
/// qualifier ascending and then newest version first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    key: String,
    families: BTreeMap<String, Vec<ReadItem>>,
}

impl Row {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            families: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn push(&mut self, family: &str, qualifier: &str, timestamp_micros: i64, value: Vec<u8>) {
        let item = ReadItem {
            row: self.key.clone(),
            column: format!("{family}:{qualifier}"),
            timestamp_micros,
            value,
        };
        self.families.entry(family.to_string()).or_default().push(item);
    }

    pub fn family(&self, name: &str) -> Option<&[ReadItem]> {
        self.families.get(name).map(Vec::as_slice)
    }

    pub fn families(&self) -> impl Iterator<Item = (&str, &[ReadItem])> {
        self.families
            .iter()
            .map(|(name, items)| (name.as_str(), items.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.families.values().all(Vec::is_empty)
    }

    pub fn cell_count(&self) -> usize {
        self.families.values().map(Vec::len).sum()
    }
}
