//! The rule set and its render pass.
//!
//! Rules of three independent kinds (format, substitution, color) are kept
//! in registration order. When several rules of one kind select the same
//! cell, the one registered last wins; rules of different kinds never
//! compete. Rendering reads raw values only and never mutates the table.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use super::color::Rgba;
use super::colorizer::{ColorConfig, ColorMapper, ColorScale};
use super::context::FormatContext;
use super::errors::{FormatError, FormatResult};
use super::formatter::{Formatter, FormatterConfig};
use super::models::{CellCoord, Table};
use super::selector::{ColumnSpec, RowSpec, Selector};
use super::substitution::Substitution;

/// Identifies a registered rule. Ids grow with registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub u64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Render-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Text for missing cells that no missing substitution claims.
    pub missing_text: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            missing_text: "NA".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormatRule {
    id: RuleId,
    selector: Selector,
    formatter: Formatter,
}

#[derive(Debug, Clone)]
pub struct SubstitutionRule {
    id: RuleId,
    selector: Selector,
    substitution: Substitution,
}

#[derive(Debug, Clone)]
pub struct ColorRule {
    id: RuleId,
    selector: Selector,
    mapper: ColorMapper,
}

/// A rule detached from a rule set, e.g. by undo.
#[derive(Debug, Clone)]
pub enum Rule {
    Format(FormatRule),
    Substitution(SubstitutionRule),
    Color(ColorRule),
}

impl Rule {
    pub fn id(&self) -> RuleId {
        match self {
            Rule::Format(rule) => rule.id,
            Rule::Substitution(rule) => rule.id,
            Rule::Color(rule) => rule.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Rule::Format(_) => "format",
            Rule::Substitution(_) => "substitution",
            Rule::Color(_) => "color",
        }
    }
}

/// Display text and colors of one cell.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RenderedCell {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<Rgba>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<Rgba>,
}

fn serialize_display<T: fmt::Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// A failure confined to one cell, or to one row for predicate failures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellError {
    pub row: usize,
    /// `None` when a row predicate failed for the whole row.
    pub col: Option<usize>,
    pub rule: RuleId,
    #[serde(serialize_with = "serialize_display")]
    pub error: FormatError,
}

/// Output of a render pass: a display layer parallel to the table.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RenderedTable {
    pub column_names: Vec<String>,
    /// Row-major grid of rendered cells.
    pub cells: Vec<Vec<RenderedCell>>,
    pub errors: Vec<CellError>,
}

impl RenderedTable {
    pub fn row_count(&self) -> usize {
        self.cells.len()
    }

    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&RenderedCell> {
        self.cells.get(row).and_then(|r| r.get(col))
    }

    pub fn text(&self, row: usize, col: usize) -> Option<&str> {
        self.cell(row, col).map(|c| c.text.as_str())
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Per-cell index of the winning rule of one kind.
struct WinnerGrid {
    cols: usize,
    slots: Vec<Option<usize>>,
}

impl WinnerGrid {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            cols,
            slots: vec![None; rows * cols],
        }
    }

    fn claim(&mut self, coord: CellCoord, rule: usize) {
        if let Some(slot) = self.slots.get_mut(coord.row * self.cols + coord.col) {
            *slot = Some(rule);
        }
    }

    fn winner(&self, coord: CellCoord) -> Option<usize> {
        self.slots.get(coord.row * self.cols + coord.col).copied().flatten()
    }
}

/// Ordered collection of formatting rules bound to one table shape.
///
/// # Examples
///
/// ```
/// use cellfmt::domain::{Column, ColumnSpec, FormatRuleSet, RowSpec, Table};
/// use cellfmt::domain::formatter::{FormatterConfig, NumberOptions};
///
/// let table = Table::new(vec![Column::new("value", [1234.5])]).unwrap();
/// let mut rules = FormatRuleSet::new();
/// rules
///     .register_format(&table, &ColumnSpec::All, &RowSpec::All, NumberOptions::default().into())
///     .unwrap();
/// assert_eq!(rules.render(&table).text(0, 0), Some("1,234.50"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FormatRuleSet {
    context: FormatContext,
    options: RenderOptions,
    formats: Vec<FormatRule>,
    substitutions: Vec<SubstitutionRule>,
    colors: Vec<ColorRule>,
    next_id: u64,
}

impl FormatRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(context: FormatContext) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn context(&self) -> &FormatContext {
        &self.context
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: RenderOptions) {
        self.options = options;
    }

    fn next_id(&mut self) -> RuleId {
        let id = RuleId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn register_format(
        &mut self,
        table: &Table,
        columns: &ColumnSpec,
        rows: &RowSpec,
        config: FormatterConfig,
    ) -> FormatResult<RuleId> {
        let selector = Selector::new(table, columns, rows)?;
        let formatter = config.build(&self.context)?;
        let id = self.next_id();
        debug!(
            "Registered {} format rule {} on columns {:?}, rows {:?}",
            config.name(),
            id,
            selector.columns,
            selector.rows
        );
        self.formats.push(FormatRule { id, selector, formatter });
        Ok(id)
    }

    pub fn register_substitution(
        &mut self,
        table: &Table,
        columns: &ColumnSpec,
        rows: &RowSpec,
        substitution: Substitution,
    ) -> FormatResult<RuleId> {
        let selector = Selector::new(table, columns, rows)?;
        let id = self.next_id();
        debug!(
            "Registered substitution rule {} ({:?}) on columns {:?}",
            id, substitution, selector.columns
        );
        self.substitutions.push(SubstitutionRule {
            id,
            selector,
            substitution,
        });
        Ok(id)
    }

    pub fn register_color(
        &mut self,
        table: &Table,
        columns: &ColumnSpec,
        rows: &RowSpec,
        config: ColorConfig,
    ) -> FormatResult<RuleId> {
        let selector = Selector::new(table, columns, rows)?;
        let mapper = config.build(&self.context)?;
        let id = self.next_id();
        debug!("Registered color rule {} on columns {:?}", id, selector.columns);
        self.colors.push(ColorRule { id, selector, mapper });
        Ok(id)
    }

    /// Detaches a rule, returning it so it can be restored later.
    pub fn take(&mut self, id: RuleId) -> Option<Rule> {
        let rule = if let Some(pos) = self.formats.iter().position(|r| r.id == id) {
            Rule::Format(self.formats.remove(pos))
        } else if let Some(pos) = self.substitutions.iter().position(|r| r.id == id) {
            Rule::Substitution(self.substitutions.remove(pos))
        } else if let Some(pos) = self.colors.iter().position(|r| r.id == id) {
            Rule::Color(self.colors.remove(pos))
        } else {
            return None;
        };
        debug!("Removed {} rule {}", rule.kind(), id);
        Some(rule)
    }

    pub fn remove(&mut self, id: RuleId) -> bool {
        self.take(id).is_some()
    }

    /// Re-inserts a detached rule at its original registration position.
    pub fn restore(&mut self, rule: Rule) {
        debug!("Restored {} rule {}", rule.kind(), rule.id());
        match rule {
            Rule::Format(rule) => {
                let pos = self.formats.partition_point(|r| r.id < rule.id);
                self.formats.insert(pos, rule);
            }
            Rule::Substitution(rule) => {
                let pos = self.substitutions.partition_point(|r| r.id < rule.id);
                self.substitutions.insert(pos, rule);
            }
            Rule::Color(rule) => {
                let pos = self.colors.partition_point(|r| r.id < rule.id);
                self.colors.insert(pos, rule);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.formats.len() + self.substitutions.len() + self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: RuleId) -> bool {
        self.formats.iter().any(|r| r.id == id)
            || self.substitutions.iter().any(|r| r.id == id)
            || self.colors.iter().any(|r| r.id == id)
    }

    /// Renders every cell of `table`.
    ///
    /// Per-cell failures are collected in [`RenderedTable::errors`]; the
    /// failing cell keeps its raw display and every other cell still renders.
    pub fn render(&self, table: &Table) -> RenderedTable {
        let rows = table.row_count();
        let cols = table.column_count();
        trace!(
            "Render pass over {}x{} with {} format, {} substitution, {} color rules",
            rows,
            cols,
            self.formats.len(),
            self.substitutions.len(),
            self.colors.len()
        );

        let mut errors = Vec::new();

        let mut format_winners = WinnerGrid::new(rows, cols);
        for (idx, rule) in self.formats.iter().enumerate() {
            for coord in select(&rule.selector, rule.id, table, &mut errors) {
                format_winners.claim(coord, idx);
            }
        }

        let mut missing_winners = WinnerGrid::new(rows, cols);
        let mut zero_winners = WinnerGrid::new(rows, cols);
        for (idx, rule) in self.substitutions.iter().enumerate() {
            let grid = match rule.substitution {
                Substitution::Missing { .. } => &mut missing_winners,
                Substitution::Zero { .. } => &mut zero_winners,
            };
            for coord in select(&rule.selector, rule.id, table, &mut errors) {
                grid.claim(coord, idx);
            }
        }

        let mut color_winners = WinnerGrid::new(rows, cols);
        let mut scales: Vec<ColorScale> = Vec::with_capacity(self.colors.len());
        for (idx, rule) in self.colors.iter().enumerate() {
            let coords = select(&rule.selector, rule.id, table, &mut errors);
            scales.push(rule.mapper.scale(coords.iter().filter_map(|&c| table.cell(c))));
            for coord in coords {
                color_winners.claim(coord, idx);
            }
        }

        let mut cells = Vec::with_capacity(rows);
        for row in 0..rows {
            let mut rendered_row = Vec::with_capacity(cols);
            for col in 0..cols {
                let coord = CellCoord::new(row, col);
                let Some(value) = table.cell(coord) else {
                    rendered_row.push(RenderedCell::default());
                    continue;
                };

                let text = if value.is_missing() {
                    match missing_winners.winner(coord) {
                        Some(idx) => self.substitutions[idx].substitution.text().to_string(),
                        None => self.options.missing_text.clone(),
                    }
                } else if let Some(idx) = zero_winners
                    .winner(coord)
                    .filter(|&idx| self.substitutions[idx].substitution.applies_to(value))
                {
                    self.substitutions[idx].substitution.text().to_string()
                } else if let Some(idx) = format_winners.winner(coord) {
                    let rule = &self.formats[idx];
                    match rule.formatter.apply(value, coord) {
                        Ok(text) => text,
                        Err(error) => {
                            warn!("Rule {} failed at row {}, column {}: {}", rule.id, row, col, error);
                            errors.push(CellError {
                                row,
                                col: Some(col),
                                rule: rule.id,
                                error,
                            });
                            value.display()
                        }
                    }
                } else {
                    value.display()
                };

                let (fill, text_color) = match color_winners.winner(coord) {
                    Some(idx) => {
                        let rule = &self.colors[idx];
                        let colors = rule.mapper.annotate(rule.mapper.colorize(&scales[idx], value));
                        (colors.fill, colors.text)
                    }
                    None => (None, None),
                };

                rendered_row.push(RenderedCell {
                    text,
                    fill,
                    text_color,
                });
            }
            cells.push(rendered_row);
        }

        RenderedTable {
            column_names: table.column_names().into_iter().map(String::from).collect(),
            cells,
            errors,
        }
    }
}

/// Coordinates a rule selects in this pass; predicate failures are recorded.
fn select(selector: &Selector, rule: RuleId, table: &Table, errors: &mut Vec<CellError>) -> Vec<CellCoord> {
    let (coords, failures) = selector.coordinates(table);
    for error in failures {
        let row = match error {
            FormatError::Predicate { row, .. } => row,
            _ => 0,
        };
        warn!("Row predicate of rule {} failed: {}", rule, error);
        errors.push(CellError {
            row,
            col: None,
            rule,
            error,
        });
    }
    coords.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::colorizer::PaletteSpec;
    use crate::domain::formatter::{CurrencyOptions, NumberOptions, PercentOptions};
    use crate::domain::{CellValue, Column};

    fn sales() -> Table {
        Table::new(vec![
            Column::new("region", ["EU", "US", "APAC"]),
            Column::new("value", [CellValue::Number(1234.5), CellValue::Missing, CellValue::Number(0.0)]),
            Column::new("share", [0.15, 0.6, 0.25]),
        ])
        .unwrap()
    }

    fn number(decimals: usize) -> FormatterConfig {
        NumberOptions {
            decimals,
            ..NumberOptions::default()
        }
        .into()
    }

    #[test]
    fn test_unformatted_cells_use_raw_display() {
        let table = sales();
        let out = FormatRuleSet::new().render(&table);
        assert_eq!(out.text(0, 0), Some("EU"));
        assert_eq!(out.text(0, 1), Some("1234.5"));
        assert_eq!(out.text(1, 1), Some("NA"));
        assert_eq!(out.column_names, vec!["region", "value", "share"]);
    }

    #[test]
    fn test_last_registered_wins() {
        let table = sales();
        let mut rules = FormatRuleSet::new();
        let value = ColumnSpec::name("value");
        rules.register_format(&table, &value, &RowSpec::All, number(0)).unwrap();
        rules.register_format(&table, &value, &RowSpec::All, number(2)).unwrap();
        assert_eq!(rules.render(&table).text(0, 1), Some("1,234.50"));

        rules.register_format(&table, &value, &RowSpec::Indices(vec![0]), number(1)).unwrap();
        let out = rules.render(&table);
        assert_eq!(out.text(0, 1), Some("1,234.5"));
        assert_eq!(out.text(2, 1), Some("0.00"));
    }

    #[test]
    fn test_missing_substitution_precedence() {
        let table = sales();
        let mut rules = FormatRuleSet::new();
        let value = ColumnSpec::name("value");
        rules
            .register_substitution(&table, &value, &RowSpec::All, Substitution::missing("---"))
            .unwrap();
        rules.register_format(&table, &value, &RowSpec::All, number(2)).unwrap();
        let out = rules.render(&table);
        assert_eq!(out.text(1, 1), Some("---"));
        assert_eq!(out.text(0, 1), Some("1,234.50"));
    }

    #[test]
    fn test_missing_text_option() {
        let table = sales();
        let mut rules = FormatRuleSet::new();
        rules.set_options(RenderOptions {
            missing_text: "n/a".to_string(),
        });
        rules.register_format(&table, &ColumnSpec::All, &RowSpec::All, number(2)).unwrap();
        assert_eq!(rules.render(&table).text(1, 1), Some("n/a"));
    }

    #[test]
    fn test_zero_substitution() {
        let table = sales();
        let mut rules = FormatRuleSet::new();
        let value = ColumnSpec::name("value");
        rules.register_format(&table, &value, &RowSpec::All, number(2)).unwrap();
        rules
            .register_substitution(&table, &value, &RowSpec::All, Substitution::zero("nil"))
            .unwrap();
        rules
            .register_substitution(&table, &value, &RowSpec::All, Substitution::missing("?"))
            .unwrap();
        let out = rules.render(&table);
        assert_eq!(out.text(2, 1), Some("nil"));
        assert_eq!(out.text(1, 1), Some("?"));
        assert_eq!(out.text(0, 1), Some("1,234.50"));
    }

    #[test]
    fn test_percent_and_currency_columns() {
        let table = sales();
        let mut rules = FormatRuleSet::new();
        rules
            .register_format(&table, &ColumnSpec::name("share"), &RowSpec::All, PercentOptions::default().into())
            .unwrap();
        let eur = CurrencyOptions {
            currency: "EUR".to_string(),
            ..CurrencyOptions::default()
        };
        rules
            .register_format(&table, &ColumnSpec::name("value"), &RowSpec::All, eur.into())
            .unwrap();
        let out = rules.render(&table);
        assert_eq!(out.text(0, 2), Some("15.00%"));
        assert_eq!(out.text(0, 1), Some("€1,234.50"));
    }

    #[test]
    fn test_per_cell_errors_are_isolated() {
        let table = sales();
        let mut rules = FormatRuleSet::new();
        let id = rules
            .register_format(&table, &ColumnSpec::All, &RowSpec::All, number(1))
            .unwrap();
        let out = rules.render(&table);

        assert_eq!(out.errors.len(), 3);
        assert!(out.errors.iter().all(|e| e.col == Some(0) && e.rule == id));
        assert!(matches!(out.errors[0].error, FormatError::Parse { row: 0, col: 0, .. }));
        assert_eq!(out.text(0, 0), Some("EU"));
        assert_eq!(out.text(0, 1), Some("1,234.5"));
        assert_eq!(out.text(1, 2), Some("0.6"));
    }

    #[test]
    fn test_registration_errors() {
        let table = sales();
        let mut rules = FormatRuleSet::new();
        let err = rules
            .register_format(&table, &ColumnSpec::name("price"), &RowSpec::All, number(2))
            .unwrap_err();
        assert!(err.is_selection());

        let err = rules
            .register_format(&table, &ColumnSpec::All, &RowSpec::Indices(vec![3]), number(2))
            .unwrap_err();
        assert!(err.is_selection());

        let bad_currency = CurrencyOptions {
            currency: "XYZ".to_string(),
            ..CurrencyOptions::default()
        };
        let err = rules
            .register_format(&table, &ColumnSpec::All, &RowSpec::All, bad_currency.into())
            .unwrap_err();
        assert!(matches!(err, FormatError::Lookup(_)));
        assert!(rules.is_empty());
    }

    #[test]
    fn test_predicate_rows() {
        let table = Table::new(vec![Column::new("value", [100.0, 500.0, 900.0])]).unwrap();
        let mut rules = FormatRuleSet::new();
        rules
            .register_format(&table, &ColumnSpec::All, &RowSpec::expr("value > 500"), number(1))
            .unwrap();
        let out = rules.render(&table);
        assert_eq!(out.text(0, 0), Some("100"));
        assert_eq!(out.text(1, 0), Some("500"));
        assert_eq!(out.text(2, 0), Some("900.0"));
    }

    #[test]
    fn test_failing_predicate_reports_row() {
        let table = Table::new(vec![Column::new("value", [1.0, 2.0])]).unwrap();
        let mut rules = FormatRuleSet::new();
        let predicate = RowSpec::predicate(|row| {
            if row.index() == 1 {
                Err("boom".to_string())
            } else {
                Ok(true)
            }
        });
        rules.register_format(&table, &ColumnSpec::All, &predicate, number(1)).unwrap();
        let out = rules.render(&table);
        assert_eq!(out.text(0, 0), Some("1.0"));
        assert_eq!(out.text(1, 0), Some("2"));
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].row, 1);
        assert_eq!(out.errors[0].col, None);
        assert!(out.errors[0].error.is_selection());
    }

    #[test]
    fn test_color_and_format_do_not_compete() {
        let table = sales();
        let mut rules = FormatRuleSet::new();
        let share = ColumnSpec::name("share");
        let color = ColorConfig {
            palette: PaletteSpec::colors(["#000000", "#FFFFFF"]),
            ..ColorConfig::default()
        };
        rules.register_color(&table, &share, &RowSpec::All, color).unwrap();
        rules
            .register_format(&table, &share, &RowSpec::All, PercentOptions::default().into())
            .unwrap();
        let out = rules.render(&table);

        let low = out.cell(0, 2).unwrap();
        assert_eq!(low.text, "15.00%");
        assert_eq!(low.fill, Some(Rgba::rgb(0, 0, 0)));
        assert_eq!(low.text_color, Some(Rgba::rgb(255, 255, 255)));
        assert_eq!(out.cell(1, 2).unwrap().fill, Some(Rgba::rgb(255, 255, 255)));
        assert_eq!(out.cell(0, 0).unwrap().fill, None);
    }

    #[test]
    fn test_rename_does_not_retarget() {
        let mut table = sales();
        let mut rules = FormatRuleSet::new();
        rules
            .register_format(&table, &ColumnSpec::name("share"), &RowSpec::All, PercentOptions::default().into())
            .unwrap();
        table.rename_column("share", "portion").unwrap();
        table.rename_column("value", "share").unwrap();
        let out = rules.render(&table);
        assert_eq!(out.text(0, 2), Some("15.00%"));
        assert_eq!(out.text(0, 1), Some("1234.5"));
    }

    #[test]
    fn test_take_and_restore() {
        let table = sales();
        let mut rules = FormatRuleSet::new();
        let value = ColumnSpec::name("value");
        let first = rules.register_format(&table, &value, &RowSpec::All, number(0)).unwrap();
        let second = rules.register_format(&table, &value, &RowSpec::All, number(3)).unwrap();

        let detached = rules.take(first).unwrap();
        assert_eq!(rules.len(), 1);
        assert!(!rules.contains(first));
        rules.restore(detached);

        // Restored at its original position, so the later rule still wins.
        assert_eq!(rules.render(&table).text(0, 1), Some("1,234.500"));
        assert!(rules.remove(second));
        assert_eq!(rules.render(&table).text(0, 1), Some("1,235"));
        assert!(!rules.remove(second));
    }

    #[test]
    fn test_render_is_repeatable() {
        let table = sales();
        let mut rules = FormatRuleSet::new();
        rules.register_format(&table, &ColumnSpec::All, &RowSpec::All, number(2)).unwrap();
        rules
            .register_color(&table, &ColumnSpec::name("share"), &RowSpec::All, ColorConfig::default())
            .unwrap();
        assert_eq!(rules.render(&table), rules.render(&table));
    }

    #[test]
    fn test_rule_set_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FormatRuleSet>();
        assert_send_sync::<RenderedTable>();
    }

    #[test]
    fn test_rendered_table_json() {
        let table = Table::new(vec![Column::new("v", [1.0])]).unwrap();
        let mut rules = FormatRuleSet::new();
        rules
            .register_color(
                &table,
                &ColumnSpec::All,
                &RowSpec::All,
                ColorConfig {
                    palette: PaletteSpec::colors(["#336699"]),
                    autocolor_text: false,
                    ..ColorConfig::default()
                },
            )
            .unwrap();
        let json = serde_json::to_value(rules.render(&table)).unwrap();
        assert_eq!(json["cells"][0][0]["text"], "1");
        assert_eq!(json["cells"][0][0]["fill"], "#336699");
        assert!(json["cells"][0][0].get("text_color").is_none());
    }
}
