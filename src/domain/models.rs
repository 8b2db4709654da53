use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::errors::{FormatError, FormatResult};

/// A raw, typed cell value. Formatting never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Missing,
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Missing
    }
}

impl CellValue {
    /// `Missing` and `Number(NaN)` both count as missing.
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Missing => true,
            CellValue::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    /// Numeric view of the value, if it has one.
    ///
    /// Booleans read as 0/1 and text is accepted when it parses as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if !n.is_nan() => Some(*n),
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| !n.is_nan()),
            _ => None,
        }
    }

    /// Display used for cells that no format rule claims.
    pub fn display(&self) -> String {
        match self {
            CellValue::Number(n) => format_plain_number(*n),
            CellValue::Text(s) => s.clone(),
            CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::Time(t) => t.format("%H:%M:%S").to_string(),
            CellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            CellValue::Missing => "NA".to_string(),
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            CellValue::Number(_) => "number",
            CellValue::Text(_) => "text",
            CellValue::Bool(_) => "bool",
            CellValue::Date(_) => "date",
            CellValue::Time(_) => "time",
            CellValue::DateTime(_) => "datetime",
            CellValue::Missing => "missing",
        }
    }
}

fn format_plain_number(n: f64) -> String {
    if n.is_nan() {
        "NA".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(d: NaiveDate) -> Self {
        CellValue::Date(d)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Missing, Into::into)
    }
}

/// A cell position: row index and column index, both zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub row: usize,
    pub col: usize,
}

impl CellCoord {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// A named column of raw values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<CellValue>,
}

impl Column {
    pub fn new<V: Into<CellValue>>(name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// An ordered set of equally long, uniquely named columns.
///
/// Row identity is the positional index and stays stable across formatting.
///
/// # Examples
///
/// ```
/// use cellfmt::domain::{Column, Table};
///
/// let table = Table::new(vec![
///     Column::new("name", ["a", "b"]),
///     Column::new("value", [1.5, 2.0]),
/// ]).unwrap();
/// assert_eq!(table.row_count(), 2);
/// assert_eq!(table.column_index("value"), Some(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Column>", into = "Vec<Column>")]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl TryFrom<Vec<Column>> for Table {
    type Error = FormatError;

    fn try_from(columns: Vec<Column>) -> Result<Self, Self::Error> {
        Table::new(columns)
    }
}

impl From<Table> for Vec<Column> {
    fn from(table: Table) -> Self {
        table.columns
    }
}

impl Table {
    /// Builds a table, rejecting ragged columns and duplicate names.
    pub fn new(columns: Vec<Column>) -> FormatResult<Self> {
        let rows = columns.first().map_or(0, |c| c.values.len());
        let mut seen = HashSet::new();

        for column in &columns {
            if column.values.len() != rows {
                return Err(FormatError::Selection(format!(
                    "Column '{}' has {} rows, expected {}",
                    column.name,
                    column.values.len(),
                    rows
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(FormatError::Selection(format!(
                    "Duplicate column name: {}",
                    column.name
                )));
            }
        }

        Ok(Self { columns, rows })
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.columns.get(col).and_then(|c| c.values.get(row))
    }

    pub fn cell(&self, coord: CellCoord) -> Option<&CellValue> {
        self.get(coord.row, coord.col)
    }

    /// Replaces a raw value. Rendered output is recomputed on the next render.
    pub fn set(&mut self, row: usize, col: usize, value: CellValue) -> FormatResult<()> {
        let slot = self
            .columns
            .get_mut(col)
            .and_then(|c| c.values.get_mut(row))
            .ok_or_else(|| FormatError::Selection(format!("No cell at row {}, column {}", row, col)))?;
        *slot = value;
        Ok(())
    }

    /// Renames a column. Rules registered earlier keep targeting it by index.
    pub fn rename_column(&mut self, old: &str, new: impl Into<String>) -> FormatResult<()> {
        let new = new.into();
        if self.column_index(&new).is_some() {
            return Err(FormatError::Selection(format!("Duplicate column name: {}", new)));
        }
        let idx = self
            .column_index(old)
            .ok_or_else(|| FormatError::Selection(format!("Unknown column: {}", old)))?;
        self.columns[idx].name = new;
        Ok(())
    }
}
