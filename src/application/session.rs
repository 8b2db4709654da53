//! Formatting session: one table, one rule set, and an undo history.

use log::debug;
use std::collections::VecDeque;

use crate::domain::formatter::{
    CurrencyOptions, DateOptions, DateTimeOptions, IntegerOptions, NumberOptions, PassthroughOptions,
    PercentOptions, ScientificOptions, TimeOptions,
};
use crate::domain::pipeline::Rule;
use crate::domain::{
    CellValue, ColorConfig, ColumnSpec, CustomFormat, FormatContext, FormatResult, FormatRuleSet, FormatterConfig,
    RenderOptions, RenderedTable, RowSpec, RuleId, Substitution, Table,
};

const MAX_UNDO_STACK_SIZE: usize = 100;

/// A change that can be undone and redone.
#[derive(Debug, Clone)]
pub enum UndoAction {
    /// A rule was registered; `detached` holds it while undone.
    RuleAdded { id: RuleId, detached: Option<Rule> },
    ColumnRenamed { from: String, to: String },
}

/// Registers rules against a table and renders it.
///
/// Every `fmt_*`, `sub_*` and `data_color` call registers exactly one rule;
/// later calls win over earlier ones where their selections overlap.
///
/// # Examples
///
/// ```
/// use cellfmt::application::FormatSession;
/// use cellfmt::domain::{Column, RowSpec, Table};
/// use cellfmt::domain::formatter::PercentOptions;
///
/// let table = Table::new(vec![Column::new("share", [0.15, 0.6])]).unwrap();
/// let mut session = FormatSession::new(table);
/// session.fmt_percent("share", RowSpec::All, PercentOptions::default()).unwrap();
/// assert_eq!(session.render().text(0, 0), Some("15.00%"));
/// ```
#[derive(Debug)]
pub struct FormatSession {
    table: Table,
    rules: FormatRuleSet,
    pub undo_stack: VecDeque<UndoAction>,
    pub redo_stack: VecDeque<UndoAction>,
}

impl FormatSession {
    pub fn new(table: Table) -> Self {
        Self::with_context(table, FormatContext::default())
    }

    /// Session whose rules consult the given providers.
    pub fn with_context(table: Table, context: FormatContext) -> Self {
        Self {
            table,
            rules: FormatRuleSet::with_context(context),
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn rules(&self) -> &FormatRuleSet {
        &self.rules
    }

    pub fn options(&self) -> &RenderOptions {
        self.rules.options()
    }

    pub fn set_options(&mut self, options: RenderOptions) {
        self.rules.set_options(options);
    }

    /// Replaces a raw value; the next render reflects it.
    pub fn set_value(&mut self, row: usize, col: usize, value: CellValue) -> FormatResult<()> {
        self.table.set(row, col, value)
    }

    pub fn render(&self) -> RenderedTable {
        self.rules.render(&self.table)
    }

    fn record_action(&mut self, action: UndoAction) {
        self.undo_stack.push_back(action);
        if self.undo_stack.len() > MAX_UNDO_STACK_SIZE {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
    }

    fn added(&mut self, id: RuleId) -> RuleId {
        self.record_action(UndoAction::RuleAdded { id, detached: None });
        id
    }

    /// Registers any formatter.
    pub fn format(
        &mut self,
        columns: impl Into<ColumnSpec>,
        rows: impl Into<RowSpec>,
        config: FormatterConfig,
    ) -> FormatResult<RuleId> {
        let id = self
            .rules
            .register_format(&self.table, &columns.into(), &rows.into(), config)?;
        Ok(self.added(id))
    }

    pub fn fmt_number(
        &mut self,
        columns: impl Into<ColumnSpec>,
        rows: impl Into<RowSpec>,
        options: NumberOptions,
    ) -> FormatResult<RuleId> {
        self.format(columns, rows, FormatterConfig::Number(options))
    }

    pub fn fmt_integer(
        &mut self,
        columns: impl Into<ColumnSpec>,
        rows: impl Into<RowSpec>,
        options: IntegerOptions,
    ) -> FormatResult<RuleId> {
        self.format(columns, rows, FormatterConfig::Integer(options))
    }

    pub fn fmt_percent(
        &mut self,
        columns: impl Into<ColumnSpec>,
        rows: impl Into<RowSpec>,
        options: PercentOptions,
    ) -> FormatResult<RuleId> {
        self.format(columns, rows, FormatterConfig::Percent(options))
    }

    pub fn fmt_currency(
        &mut self,
        columns: impl Into<ColumnSpec>,
        rows: impl Into<RowSpec>,
        options: CurrencyOptions,
    ) -> FormatResult<RuleId> {
        self.format(columns, rows, FormatterConfig::Currency(options))
    }

    pub fn fmt_scientific(
        &mut self,
        columns: impl Into<ColumnSpec>,
        rows: impl Into<RowSpec>,
        options: ScientificOptions,
    ) -> FormatResult<RuleId> {
        self.format(columns, rows, FormatterConfig::Scientific(options))
    }

    pub fn fmt_date(
        &mut self,
        columns: impl Into<ColumnSpec>,
        rows: impl Into<RowSpec>,
        options: DateOptions,
    ) -> FormatResult<RuleId> {
        self.format(columns, rows, FormatterConfig::Date(options))
    }

    pub fn fmt_time(
        &mut self,
        columns: impl Into<ColumnSpec>,
        rows: impl Into<RowSpec>,
        options: TimeOptions,
    ) -> FormatResult<RuleId> {
        self.format(columns, rows, FormatterConfig::Time(options))
    }

    pub fn fmt_datetime(
        &mut self,
        columns: impl Into<ColumnSpec>,
        rows: impl Into<RowSpec>,
        options: DateTimeOptions,
    ) -> FormatResult<RuleId> {
        self.format(columns, rows, FormatterConfig::DateTime(options))
    }

    pub fn fmt_markdown(&mut self, columns: impl Into<ColumnSpec>, rows: impl Into<RowSpec>) -> FormatResult<RuleId> {
        self.format(columns, rows, FormatterConfig::Markdown)
    }

    pub fn fmt_passthrough(
        &mut self,
        columns: impl Into<ColumnSpec>,
        rows: impl Into<RowSpec>,
        options: PassthroughOptions,
    ) -> FormatResult<RuleId> {
        self.format(columns, rows, FormatterConfig::Passthrough(options))
    }

    /// Formats with a caller closure; its `Err` text is reported per cell.
    pub fn fmt<F>(&mut self, columns: impl Into<ColumnSpec>, rows: impl Into<RowSpec>, f: F) -> FormatResult<RuleId>
    where
        F: Fn(&CellValue) -> Result<String, String> + Send + Sync + 'static,
    {
        self.format(columns, rows, FormatterConfig::Custom(CustomFormat::new(f)))
    }

    pub fn substitute(
        &mut self,
        columns: impl Into<ColumnSpec>,
        rows: impl Into<RowSpec>,
        substitution: Substitution,
    ) -> FormatResult<RuleId> {
        let id = self
            .rules
            .register_substitution(&self.table, &columns.into(), &rows.into(), substitution)?;
        Ok(self.added(id))
    }

    pub fn sub_missing(
        &mut self,
        columns: impl Into<ColumnSpec>,
        rows: impl Into<RowSpec>,
        text: impl Into<String>,
    ) -> FormatResult<RuleId> {
        self.substitute(columns, rows, Substitution::missing(text))
    }

    pub fn sub_zero(
        &mut self,
        columns: impl Into<ColumnSpec>,
        rows: impl Into<RowSpec>,
        text: impl Into<String>,
    ) -> FormatResult<RuleId> {
        self.substitute(columns, rows, Substitution::zero(text))
    }

    pub fn data_color(
        &mut self,
        columns: impl Into<ColumnSpec>,
        rows: impl Into<RowSpec>,
        config: ColorConfig,
    ) -> FormatResult<RuleId> {
        let id = self
            .rules
            .register_color(&self.table, &columns.into(), &rows.into(), config)?;
        Ok(self.added(id))
    }

    /// Renames a column. Rules registered earlier keep their target.
    pub fn rename_column(&mut self, from: &str, to: &str) -> FormatResult<()> {
        self.table.rename_column(from, to)?;
        self.record_action(UndoAction::ColumnRenamed {
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }

    /// Reverts the most recent change. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(action) = self.undo_stack.pop_back() else {
            return false;
        };
        let action = match action {
            UndoAction::RuleAdded { id, .. } => UndoAction::RuleAdded {
                id,
                detached: self.rules.take(id),
            },
            UndoAction::ColumnRenamed { from, to } => {
                if let Err(err) = self.table.rename_column(&to, from.as_str()) {
                    debug!("Undo of rename {} -> {} failed: {}", from, to, err);
                }
                UndoAction::ColumnRenamed { from, to }
            }
        };
        debug!("Undo: {}", action_label(&action));
        self.redo_stack.push_back(action);
        true
    }

    /// Reapplies the most recently undone change.
    pub fn redo(&mut self) -> bool {
        let Some(action) = self.redo_stack.pop_back() else {
            return false;
        };
        let action = match action {
            UndoAction::RuleAdded { id, detached } => {
                if let Some(rule) = detached {
                    self.rules.restore(rule);
                }
                UndoAction::RuleAdded { id, detached: None }
            }
            UndoAction::ColumnRenamed { from, to } => {
                if let Err(err) = self.table.rename_column(&from, to.as_str()) {
                    debug!("Redo of rename {} -> {} failed: {}", from, to, err);
                }
                UndoAction::ColumnRenamed { from, to }
            }
        };
        debug!("Redo: {}", action_label(&action));
        self.undo_stack.push_back(action);
        true
    }
}

fn action_label(action: &UndoAction) -> String {
    match action {
        UndoAction::RuleAdded { id, .. } => format!("rule {}", id),
        UndoAction::ColumnRenamed { from, to } => format!("rename {} -> {}", from, to),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Column;

    fn create_test_session() -> FormatSession {
        let table = Table::new(vec![
            Column::new("item", ["apples", "pears", "plums"]),
            Column::new("price", [CellValue::Number(1.5), CellValue::Missing, CellValue::Number(1250.0)]),
        ])
        .unwrap();
        FormatSession::new(table)
    }

    fn decimals(decimals: usize) -> NumberOptions {
        NumberOptions {
            decimals,
            ..NumberOptions::default()
        }
    }

    #[test]
    fn test_fluent_registration_and_render() {
        let mut session = create_test_session();
        session.fmt_number("price", RowSpec::All, decimals(1)).unwrap();
        session.sub_missing("price", RowSpec::All, "---").unwrap();
        let out = session.render();
        assert_eq!(out.text(0, 1), Some("1.5"));
        assert_eq!(out.text(1, 1), Some("---"));
        assert_eq!(out.text(2, 1), Some("1,250.0"));
        assert_eq!(session.rules().len(), 2);
    }

    #[test]
    fn test_undo_redo_rules() {
        let mut session = create_test_session();
        session.fmt_number("price", RowSpec::All, decimals(0)).unwrap();
        session.fmt_number("price", RowSpec::All, decimals(3)).unwrap();
        assert_eq!(session.render().text(0, 1), Some("1.500"));

        assert!(session.undo());
        assert_eq!(session.render().text(0, 1), Some("2"));
        assert!(session.undo());
        assert_eq!(session.render().text(0, 1), Some("1.5"));
        assert!(!session.undo());

        assert!(session.redo());
        assert!(session.redo());
        assert_eq!(session.render().text(0, 1), Some("1.500"));
        assert!(!session.redo());
    }

    #[test]
    fn test_new_registration_clears_redo() {
        let mut session = create_test_session();
        session.fmt_number("price", RowSpec::All, decimals(0)).unwrap();
        session.undo();
        assert_eq!(session.redo_stack.len(), 1);
        session.fmt_markdown("item", RowSpec::All).unwrap();
        assert!(session.redo_stack.is_empty());
    }

    #[test]
    fn test_undo_history_is_bounded() {
        let mut session = create_test_session();
        for _ in 0..(MAX_UNDO_STACK_SIZE + 5) {
            session.fmt_number("price", RowSpec::All, decimals(1)).unwrap();
        }
        assert_eq!(session.undo_stack.len(), MAX_UNDO_STACK_SIZE);
    }

    #[test]
    fn test_failed_registration_is_not_recorded() {
        let mut session = create_test_session();
        assert!(session.fmt_number("cost", RowSpec::All, decimals(1)).is_err());
        assert!(session.undo_stack.is_empty());
        assert!(session.rules().is_empty());
    }

    #[test]
    fn test_rename_and_undo() {
        let mut session = create_test_session();
        session.fmt_number("price", RowSpec::All, decimals(2)).unwrap();
        session.rename_column("price", "cost").unwrap();
        assert_eq!(session.table().column_index("cost"), Some(1));
        assert_eq!(session.render().text(0, 1), Some("1.50"));

        session.undo();
        assert_eq!(session.table().column_index("price"), Some(1));
        session.redo();
        assert_eq!(session.table().column_index("cost"), Some(1));
    }

    #[test]
    fn test_custom_formatter() {
        let mut session = create_test_session();
        session
            .fmt("item", RowSpec::All, |v| Ok(v.display().to_uppercase()))
            .unwrap();
        assert_eq!(session.render().text(1, 0), Some("PEARS"));
    }

    #[test]
    fn test_values_are_read_at_render() {
        let mut session = create_test_session();
        session.fmt_number("price", RowSpec::All, decimals(2)).unwrap();
        session.set_value(1, 1, CellValue::Number(7.0)).unwrap();
        assert_eq!(session.render().text(1, 1), Some("7.00"));
    }
}
