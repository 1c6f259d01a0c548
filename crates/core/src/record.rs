//! One unit of work: a normalized spreadsheet row.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Column name carrying the failure reason on error rows.
pub const COL_ERROR_REASON: &str = "MOTIVO_ERRO";

/// Column recording the proof artifact filename on success rows.
pub const COL_PROOF_FILE: &str = "COMPROVANTE";

/// A spreadsheet row normalized to uppercase column names and string
/// cell values, preserving the original column order.
///
/// Field access is case-insensitive by contract: keys are uppercased at
/// insertion, and [`get`](Self::get) uppercases its argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotRecord {
    cells: Vec<(String, String)>,
}

impl BotRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from `(column, value)` pairs, uppercasing columns.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut record = Self::new();
        for (k, v) in pairs {
            record.set(k.into(), v.into());
        }
        record
    }

    /// Set a cell, replacing any existing value for the same column.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into().to_uppercase();
        let value = value.into();
        if let Some(cell) = self.cells.iter_mut().find(|(k, _)| *k == column) {
            cell.1 = value;
        } else {
            self.cells.push((column, value));
        }
    }

    /// Cell value for a column, case-insensitive.
    pub fn get(&self, column: &str) -> Option<&str> {
        let column = column.to_uppercase();
        self.cells
            .iter()
            .find(|(k, _)| *k == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Columns in original order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    /// `(column, value)` pairs in original order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Attach the failure reason used on error rows.
    pub fn set_error_reason(&mut self, reason: impl Into<String>) {
        self.set(COL_ERROR_REASON, reason);
    }
}

impl Serialize for BotRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (k, v) in &self.cells {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_are_uppercased_on_insert() {
        let mut record = BotRecord::new();
        record.set("numero_processo", "0001");
        assert_eq!(record.get("NUMERO_PROCESSO"), Some("0001"));
        assert_eq!(record.get("numero_processo"), Some("0001"));
    }

    #[test]
    fn set_replaces_existing_value_in_place() {
        let mut record = BotRecord::from_pairs([("A", "1"), ("B", "2")]);
        record.set("a", "3");
        assert_eq!(record.get("A"), Some("3"));
        let cols: Vec<_> = record.columns().collect();
        assert_eq!(cols, vec!["A", "B"]);
    }

    #[test]
    fn column_order_is_preserved() {
        let record = BotRecord::from_pairs([("Z", "1"), ("A", "2"), ("M", "3")]);
        let cols: Vec<_> = record.columns().collect();
        assert_eq!(cols, vec!["Z", "A", "M"]);
    }

    #[test]
    fn error_reason_appends_motivo_erro() {
        let mut record = BotRecord::from_pairs([("NUMERO_PROCESSO", "0001")]);
        record.set_error_reason("Processo não encontrado");
        assert_eq!(record.get(COL_ERROR_REASON), Some("Processo não encontrado"));
    }

    #[test]
    fn serializes_as_ordered_map() {
        let record = BotRecord::from_pairs([("B", "2"), ("A", "1")]);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"B":"2","A":"1"}"#);
    }
}
