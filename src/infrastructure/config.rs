//! Declarative rule files.
//!
//! A rule file is a JSON document listing rules in registration order:
//!
//! ```json
//! {
//!   "options": { "missing_text": "-" },
//!   "rules": [
//!     { "columns": "value", "format": { "type": "number", "decimals": 1 } },
//!     { "columns": ["value"], "rows": "value > 500", "color": { "palette": "reds" } },
//!     { "substitute": { "type": "missing", "text": "---" } }
//!   ]
//! }
//! ```

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::persistence::LoadError;
use crate::application::FormatSession;
use crate::domain::{ColorConfig, ColumnSpec, FormatterConfig, RenderOptions, RowSpec, RuleId, Substitution};

/// Column targets as written in a rule file. Omitted means every column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnsDef {
    Name(String),
    Names(Vec<String>),
    Indices(Vec<usize>),
    Range { start: usize, end: usize },
}

impl From<&ColumnsDef> for ColumnSpec {
    fn from(def: &ColumnsDef) -> Self {
        match def {
            ColumnsDef::Name(name) => ColumnSpec::name(name.as_str()),
            ColumnsDef::Names(names) => ColumnSpec::Names(names.clone()),
            ColumnsDef::Indices(indices) => ColumnSpec::Indices(indices.clone()),
            ColumnsDef::Range { start, end } => ColumnSpec::Range(*start..*end),
        }
    }
}

/// Row targets as written in a rule file. Omitted means every row; a string
/// is a row expression such as `value > 500`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowsDef {
    Where(String),
    Indices(Vec<usize>),
    Range { start: usize, end: usize },
}

impl From<&RowsDef> for RowSpec {
    fn from(def: &RowsDef) -> Self {
        match def {
            RowsDef::Where(expr) => RowSpec::expr(expr.as_str()),
            RowsDef::Indices(indices) => RowSpec::Indices(indices.clone()),
            RowsDef::Range { start, end } => RowSpec::Range(*start..*end),
        }
    }
}

/// One rule. Exactly one of `format`, `substitute` and `color` must be set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<ColumnsDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<RowsDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substitute: Option<Substitution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorConfig>,
}

impl RuleEntry {
    fn column_spec(&self) -> ColumnSpec {
        self.columns.as_ref().map_or(ColumnSpec::All, ColumnSpec::from)
    }

    fn row_spec(&self) -> RowSpec {
        self.rows.as_ref().map_or(RowSpec::All, RowSpec::from)
    }

    fn register(&self, index: usize, session: &mut FormatSession) -> Result<RuleId, LoadError> {
        let columns = self.column_spec();
        let rows = self.row_spec();
        let registered = match (&self.format, &self.substitute, &self.color) {
            (Some(format), None, None) => session.format(columns, rows, format.clone()),
            (None, Some(sub), None) => session.substitute(columns, rows, sub.clone()),
            (None, None, Some(color)) => session.data_color(columns, rows, color.clone()),
            (None, None, None) => {
                return Err(LoadError::InvalidRule {
                    index,
                    message: "expected one of format, substitute or color".to_string(),
                });
            }
            _ => {
                return Err(LoadError::InvalidRule {
                    index,
                    message: "only one of format, substitute or color may be set".to_string(),
                });
            }
        };
        registered.map_err(|source| LoadError::Rule { index, source })
    }
}

/// A parsed rule file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub options: RenderOptions,
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
}

impl RuleFile {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        debug!("Loading rule file {}", path.display());
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Sets the render options and registers every rule in file order.
    ///
    /// Stops at the first rule that fails; rules before it stay registered.
    pub fn apply(&self, session: &mut FormatSession) -> Result<Vec<RuleId>, LoadError> {
        session.set_options(self.options.clone());
        let ids = self
            .rules
            .iter()
            .enumerate()
            .map(|(index, entry)| entry.register(index, session))
            .collect::<Result<Vec<_>, _>>()?;
        info!("Registered {} rules", ids.len());
        Ok(ids)
    }
}

impl std::str::FromStr for RuleFile {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}
