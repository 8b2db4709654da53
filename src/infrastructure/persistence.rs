//! Table loading and rendered-output writing.

use log::debug;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

use crate::domain::datetime::{parse_date, parse_datetime, parse_time};
use crate::domain::{CellValue, Column, FormatError, RenderedTable, Table};

/// Errors raised while reading inputs or writing outputs.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("CSV error: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// A rule in a rule file could not be registered.
    #[error("Rule {index}: {source}")]
    Rule {
        index: usize,
        #[source]
        source: FormatError,
    },

    /// A rule file entry is structurally wrong.
    #[error("Rule {index}: {message}")]
    InvalidRule { index: usize, message: String },

    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Reads tables from CSV or JSON.
pub struct TableLoader;

impl TableLoader {
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Table, LoadError> {
        let path = path.as_ref();
        debug!("Loading CSV table from {}", path.display());
        Self::from_csv_reader(BufReader::new(File::open(path)?))
    }

    /// Reads a CSV with a header row; every field goes through [`TableLoader::infer`].
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Table, LoadError> {
        let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        let mut columns: Vec<Vec<CellValue>> = vec![Vec::new(); headers.len()];

        for record in csv_reader.records() {
            let record = record?;
            for (col, field) in record.iter().enumerate() {
                if let Some(values) = columns.get_mut(col) {
                    values.push(Self::infer(field));
                }
            }
        }

        let table = Table::new(
            headers
                .into_iter()
                .zip(columns)
                .map(|(name, values)| Column { name, values })
                .collect(),
        )?;
        debug!("Loaded {} rows x {} columns", table.row_count(), table.column_count());
        Ok(table)
    }

    /// Reads a table serialized as a JSON array of columns.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Table, LoadError> {
        let path = path.as_ref();
        debug!("Loading JSON table from {}", path.display());
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    /// Types a raw CSV field.
    ///
    /// Empty and `NA` are missing; then finite number, boolean, ISO date,
    /// datetime and time are tried in turn; anything else is text.
    pub fn infer(field: &str) -> CellValue {
        let trimmed = field.trim();
        if trimmed.is_empty() || trimmed == "NA" {
            return CellValue::Missing;
        }

        let looks_numeric = trimmed
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
        if looks_numeric {
            if let Some(n) = trimmed.parse::<f64>().ok().filter(|n| n.is_finite()) {
                return CellValue::Number(n);
            }
        }

        if trimmed.eq_ignore_ascii_case("true") {
            return CellValue::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return CellValue::Bool(false);
        }

        if let Some(date) = parse_date(trimmed) {
            return CellValue::Date(date);
        }
        if let Some(dt) = parse_datetime(trimmed) {
            return CellValue::DateTime(dt);
        }
        if let Some(time) = parse_time(trimmed) {
            return CellValue::Time(time);
        }

        CellValue::Text(field.to_string())
    }
}

/// Writes a rendered table.
pub struct OutputWriter;

impl OutputWriter {
    /// Cell texts, colors and errors as pretty-printed JSON.
    pub fn write_json<W: Write>(rendered: &RenderedTable, writer: W) -> Result<(), LoadError> {
        let mut writer = BufWriter::new(writer);
        serde_json::to_writer_pretty(&mut writer, rendered)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Cell texts only, with the column names as header row.
    pub fn write_csv<W: Write>(rendered: &RenderedTable, writer: W) -> Result<(), LoadError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&rendered.column_names)?;
        for row in &rendered.cells {
            csv_writer.write_record(row.iter().map(|cell| cell.text.as_str()))?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}
