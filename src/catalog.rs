// Table catalog produced by one scan of a dump.
// Records are keyed by table name and iterate in first-seen order.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColumnKey {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "PRI")]
    Primary,
    #[serde(rename = "UNI")]
    Unique,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub extra: String,
    pub key: ColumnKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub referenced_table: String,
    pub referenced_column: Option<String>,
}

/// Everything known about one table after the scan.
///
/// `create_start == 0` means the table was only seen through INSERT statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub create_start: u64,
    pub create_end: u64,
    pub insert_count: u64,
    pub insert_positions: Vec<u64>,
    pub row_estimates: Vec<u64>,
    pub estimated_rows: u64,
    pub size_bytes: u64,
    pub avg_row_size: Option<f64>,
    pub structure: String,
    pub engine: String,
    pub charset: String,
    pub collation: Option<String>,
    pub row_format: Option<String>,
    pub auto_increment: Option<u64>,
    pub columns: Vec<Column>,
    pub primary_key: Option<String>,
    pub indexes: Vec<Index>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Default for TableRecord {
    fn default() -> Self {
        Self {
            create_start: 0,
            create_end: 0,
            insert_count: 0,
            insert_positions: Vec::new(),
            row_estimates: Vec::new(),
            estimated_rows: 0,
            size_bytes: 0,
            avg_row_size: None,
            structure: String::new(),
            engine: UNKNOWN.to_string(),
            charset: UNKNOWN.to_string(),
            collation: None,
            row_format: None,
            auto_increment: None,
            columns: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }
}

impl TableRecord {
    // Record opened by a CREATE TABLE line.
    pub fn with_create_start(line: u64) -> Self {
        Self {
            create_start: line,
            ..Self::default()
        }
    }

    pub fn has_create(&self) -> bool {
        self.create_start > 0
    }

    // Attribute one INSERT statement to this table.
    pub fn record_insert(&mut self, line: u64, bytes: u64, rows: u64) {
        self.insert_count += 1;
        self.insert_positions.push(line);
        self.size_bytes += bytes;
        self.row_estimates.push(rows);
        self.finalize_stats();
    }

    // Move INSERT statistics gathered under another record into this one.
    // Positions stay sorted because both inputs are ascending.
    pub fn absorb_inserts(&mut self, other: TableRecord) {
        let mut merged: Vec<(u64, u64)> = self
            .insert_positions
            .iter()
            .copied()
            .zip(self.row_estimates.iter().copied())
            .chain(other.insert_positions.into_iter().zip(other.row_estimates))
            .collect();
        merged.sort_by_key(|(line, _)| *line);
        self.insert_positions = merged.iter().map(|(line, _)| *line).collect();
        self.row_estimates = merged.into_iter().map(|(_, rows)| rows).collect();
        self.insert_count += other.insert_count;
        self.size_bytes += other.size_bytes;
        self.finalize_stats();
    }

    // Recompute derived totals from the per-INSERT estimates.
    pub fn finalize_stats(&mut self) {
        self.estimated_rows = self.row_estimates.iter().sum();
        self.avg_row_size = if self.estimated_rows > 0 && self.size_bytes > 0 {
            let avg = self.size_bytes as f64 / self.estimated_rows as f64;
            Some((avg * 100.0).round() / 100.0)
        } else {
            None
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSummary {
    pub total_size_bytes: u64,
    pub total_lines: u64,
    pub total_tables: u64,
    pub total_inserts: u64,
    pub total_rows_estimated: u64,
    pub has_drop_statements: bool,
    pub has_create_database: bool,
    pub set_statements: Vec<String>,
    pub use_statements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    tables: HashMap<String, TableRecord>,
    order: Vec<String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TableRecord> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    // Record for `name`, created empty (INSERT-only) if not present yet.
    pub fn entry(&mut self, name: &str) -> &mut TableRecord {
        if !self.tables.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.tables.entry(name.to_string()).or_default()
    }

    // Store `record` under `name`, returning the record it replaced.
    // A replaced name keeps its original position in iteration order.
    pub fn insert(&mut self, name: &str, record: TableRecord) -> Option<TableRecord> {
        let previous = self.tables.insert(name.to_string(), record);
        if previous.is_none() {
            self.order.push(name.to_string());
        }
        previous
    }

    pub fn remove(&mut self, name: &str) -> Option<TableRecord> {
        let removed = self.tables.remove(name)?;
        self.order.retain(|n| n != name);
        Some(removed)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TableRecord)> {
        self.order
            .iter()
            .filter_map(|name| self.tables.get(name).map(|t| (name.as_str(), t)))
    }

    pub fn total_insert_count(&self) -> u64 {
        self.tables.values().map(|t| t.insert_count).sum()
    }
}

impl Serialize for Catalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, table) in self.iter() {
            map.serialize_entry(name, table)?;
        }
        map.end()
    }
}

/// Output of one scan: the table catalog and the database-level summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Analysis {
    pub catalog: Catalog,
    pub summary: DatabaseSummary,
}
