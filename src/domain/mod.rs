pub mod color;
pub mod colorizer;
pub mod context;
pub mod datetime;
pub mod errors;
pub mod formatter;
pub mod locale;
pub mod markup;
pub mod models;
pub mod number;
pub mod palette;
pub mod parser;
pub mod pipeline;
pub mod selector;
pub mod substitution;

pub use color::Rgba;
pub use colorizer::{ApplyTo, ColorConfig, ColorMethod, PaletteSpec};
pub use context::FormatContext;
pub use errors::*;
pub use formatter::{CustomFormat, FormatterConfig};
pub use locale::{BuiltinLocales, LocaleProvider, StyleRef};
pub use markup::{InlineMarkdown, MarkupRenderer};
pub use models::*;
pub use palette::{BuiltinPalettes, PaletteProvider};
pub use parser::RowExpression;
pub use pipeline::{CellError, FormatRuleSet, RenderOptions, RenderedCell, RenderedTable, RuleId};
pub use selector::{ColumnSpec, RowSpec, RowView};
pub use substitution::Substitution;
