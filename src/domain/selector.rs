//! Column and row targeting.
//!
//! Columns are resolved to indices once, when a rule is registered, so a
//! later rename does not retarget the rule. Row selectors keep predicates
//! unevaluated until render time, where they only ever see raw values.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use super::errors::{FormatError, FormatResult};
use super::models::{CellCoord, CellValue, Table};
use super::parser::RowExpression;

/// Which columns a rule targets.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSpec {
    All,
    Names(Vec<String>),
    Indices(Vec<usize>),
    Range(Range<usize>),
}

impl ColumnSpec {
    pub fn names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        ColumnSpec::Names(names.into_iter().map(Into::into).collect())
    }

    pub fn name(name: impl Into<String>) -> Self {
        ColumnSpec::Names(vec![name.into()])
    }

    /// Resolves to sorted, deduplicated column indices.
    pub fn resolve(&self, table: &Table) -> FormatResult<Vec<usize>> {
        let count = table.column_count();
        let check = |idx: usize| -> FormatResult<usize> {
            if idx < count {
                Ok(idx)
            } else {
                Err(FormatError::Selection(format!(
                    "Column index {} out of range (table has {} columns)",
                    idx, count
                )))
            }
        };

        let resolved: BTreeSet<usize> = match self {
            ColumnSpec::All => (0..count).collect(),
            ColumnSpec::Names(names) => names
                .iter()
                .map(|name| {
                    table
                        .column_index(name)
                        .ok_or_else(|| FormatError::Selection(format!("Unknown column: {}", name)))
                })
                .collect::<FormatResult<_>>()?,
            ColumnSpec::Indices(indices) => indices.iter().map(|&i| check(i)).collect::<FormatResult<_>>()?,
            ColumnSpec::Range(range) => {
                if range.end > count {
                    return Err(FormatError::Selection(format!(
                        "Column range {}..{} out of range (table has {} columns)",
                        range.start, range.end, count
                    )));
                }
                range.clone().collect()
            }
        };

        Ok(resolved.into_iter().collect())
    }
}

impl From<&str> for ColumnSpec {
    fn from(name: &str) -> Self {
        ColumnSpec::name(name)
    }
}

impl From<Vec<&str>> for ColumnSpec {
    fn from(names: Vec<&str>) -> Self {
        ColumnSpec::names(names)
    }
}

impl From<Range<usize>> for ColumnSpec {
    fn from(range: Range<usize>) -> Self {
        ColumnSpec::Range(range)
    }
}

/// Read-only view of one row, handed to closure predicates.
#[derive(Clone, Copy)]
pub struct RowView<'a> {
    table: &'a Table,
    row: usize,
}

impl<'a> RowView<'a> {
    pub fn new(table: &'a Table, row: usize) -> Self {
        Self { table, row }
    }

    pub fn index(&self) -> usize {
        self.row
    }

    /// Raw value of the named column in this row.
    pub fn get(&self, column: &str) -> Option<&'a CellValue> {
        self.table
            .column_index(column)
            .and_then(|col| self.table.get(self.row, col))
    }

    pub fn get_at(&self, col: usize) -> Option<&'a CellValue> {
        self.table.get(self.row, col)
    }

    /// Numeric view of the named column, `None` when missing or non-numeric.
    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(CellValue::as_number)
    }
}

/// A caller-supplied row predicate.
///
/// Predicates must be pure: they receive a read-only [`RowView`] and are
/// evaluated once per row on every render. An `Err` excludes the row and is
/// reported as a selection error tagged with the row index.
pub type RowPredicate = Arc<dyn Fn(&RowView<'_>) -> Result<bool, String> + Send + Sync>;

/// Which rows a rule targets.
#[derive(Clone)]
pub enum RowSpec {
    All,
    Indices(Vec<usize>),
    Range(Range<usize>),
    /// Predicate written in the row expression language, e.g. `value > 500`.
    Where(String),
    Predicate(RowPredicate),
}

impl RowSpec {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&RowView<'_>) -> Result<bool, String> + Send + Sync + 'static,
    {
        RowSpec::Predicate(Arc::new(f))
    }

    pub fn expr(source: impl Into<String>) -> Self {
        RowSpec::Where(source.into())
    }

    /// Validates explicit rows and compiles expressions against `table`.
    pub fn resolve(&self, table: &Table) -> FormatResult<RowSelector> {
        let rows = table.row_count();
        let out_of_range = |idx: usize| {
            FormatError::Selection(format!("Row index {} out of range (table has {} rows)", idx, rows))
        };

        Ok(match self {
            RowSpec::All => RowSelector::All,
            RowSpec::Indices(indices) => {
                if let Some(&bad) = indices.iter().find(|&&i| i >= rows) {
                    return Err(out_of_range(bad));
                }
                RowSelector::Set(indices.iter().copied().collect())
            }
            RowSpec::Range(range) => {
                if range.end > rows {
                    return Err(out_of_range(range.end - 1));
                }
                RowSelector::Set(range.clone().collect())
            }
            RowSpec::Where(source) => RowSelector::Expression(RowExpression::compile(source, table)?),
            RowSpec::Predicate(f) => RowSelector::Predicate(Arc::clone(f)),
        })
    }
}

impl Default for RowSpec {
    fn default() -> Self {
        RowSpec::All
    }
}

impl fmt::Debug for RowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowSpec::All => write!(f, "All"),
            RowSpec::Indices(indices) => f.debug_tuple("Indices").field(indices).finish(),
            RowSpec::Range(range) => f.debug_tuple("Range").field(range).finish(),
            RowSpec::Where(source) => f.debug_tuple("Where").field(source).finish(),
            RowSpec::Predicate(_) => write!(f, "Predicate(<fn>)"),
        }
    }
}

impl From<Range<usize>> for RowSpec {
    fn from(range: Range<usize>) -> Self {
        RowSpec::Range(range)
    }
}

impl From<Vec<usize>> for RowSpec {
    fn from(indices: Vec<usize>) -> Self {
        RowSpec::Indices(indices)
    }
}

/// Row selection after registration-time validation.
#[derive(Clone)]
pub enum RowSelector {
    All,
    Set(BTreeSet<usize>),
    Expression(RowExpression),
    Predicate(RowPredicate),
}

impl RowSelector {
    /// Whether `row` is selected. Predicate failures become [`FormatError::Predicate`].
    pub fn matches(&self, table: &Table, row: usize) -> FormatResult<bool> {
        match self {
            RowSelector::All => Ok(row < table.row_count()),
            RowSelector::Set(rows) => Ok(rows.contains(&row)),
            RowSelector::Expression(expr) => expr
                .matches(table, row)
                .map_err(|message| FormatError::Predicate { row, message }),
            RowSelector::Predicate(f) => {
                f(&RowView::new(table, row)).map_err(|message| FormatError::Predicate { row, message })
            }
        }
    }

    /// All selected rows, in order, with the errors raised on the way.
    pub fn rows(&self, table: &Table) -> (Vec<usize>, Vec<FormatError>) {
        let mut rows = Vec::new();
        let mut errors = Vec::new();
        for row in 0..table.row_count() {
            match self.matches(table, row) {
                Ok(true) => rows.push(row),
                Ok(false) => {}
                Err(err) => errors.push(err),
            }
        }
        (rows, errors)
    }
}

impl fmt::Debug for RowSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowSelector::All => write!(f, "All"),
            RowSelector::Set(rows) => f.debug_tuple("Set").field(rows).finish(),
            RowSelector::Expression(expr) => f.debug_tuple("Expression").field(&expr.source()).finish(),
            RowSelector::Predicate(_) => write!(f, "Predicate(<fn>)"),
        }
    }
}

/// Column indices fixed at registration plus a row selector.
#[derive(Debug, Clone)]
pub struct Selector {
    pub columns: Vec<usize>,
    pub rows: RowSelector,
}

impl Selector {
    pub fn new(table: &Table, columns: &ColumnSpec, rows: &RowSpec) -> FormatResult<Self> {
        Ok(Self {
            columns: columns.resolve(table)?,
            rows: rows.resolve(table)?,
        })
    }

    /// Concrete coordinates against the table's current raw values.
    ///
    /// Returns the deduplicated coordinate set and any per-row predicate
    /// errors; rows whose predicate failed are excluded.
    pub fn coordinates(&self, table: &Table) -> (BTreeSet<CellCoord>, Vec<FormatError>) {
        let (rows, errors) = self.rows.rows(table);
        let coords = rows
            .iter()
            .flat_map(|&row| self.columns.iter().map(move |&col| CellCoord::new(row, col)))
            .collect();
        (coords, errors)
    }
}

/// One-shot resolution of a column/row specification into coordinates.
///
/// Fails on the first unresolvable reference or predicate error.
pub fn resolve(table: &Table, columns: &ColumnSpec, rows: &RowSpec) -> FormatResult<BTreeSet<CellCoord>> {
    let selector = Selector::new(table, columns, rows)?;
    let (coords, errors) = selector.coordinates(table);
    match errors.into_iter().next() {
        Some(err) => Err(err),
        None => Ok(coords),
    }
}
