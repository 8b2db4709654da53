use thiserror::Error;

/// Errors raised while registering rules or rendering cells.
///
/// Registration-time errors (`Selection`, `FormatConfig`, `Lookup`) come back
/// from the registering call. Value-dependent failures (`Parse`, and
/// `Selection` raised by a row predicate) are collected per cell during a
/// render pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    /// A column or row reference could not be resolved against the table.
    #[error("Selection error: {0}")]
    Selection(String),

    /// A row predicate failed while being evaluated for a specific row.
    #[error("Selection error at row {row}: {message}")]
    Predicate { row: usize, message: String },

    /// Conflicting or unrecognized formatter options.
    #[error("Format config error: {0}")]
    FormatConfig(String),

    /// A cell value does not have the shape the formatter requires.
    #[error("Parse error at row {row}, column {col}: {message}")]
    Parse {
        row: usize,
        col: usize,
        message: String,
    },

    /// Unknown locale, currency or palette code.
    #[error("Lookup error: {0}")]
    Lookup(String),
}

impl FormatError {
    /// Builds a [`FormatError::Parse`] for the given cell.
    pub fn parse(row: usize, col: usize, message: impl Into<String>) -> Self {
        FormatError::Parse {
            row,
            col,
            message: message.into(),
        }
    }

    /// True for errors that belong to the selection family.
    pub fn is_selection(&self) -> bool {
        matches!(self, FormatError::Selection(_) | FormatError::Predicate { .. })
    }
}

pub type FormatResult<T> = Result<T, FormatError>;
