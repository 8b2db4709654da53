//! Value formatters.
//!
//! A [`FormatterConfig`] is the declarative, serializable description a
//! caller registers. [`FormatterConfig::build`] validates it against the
//! [`FormatContext`] once, at registration, producing a [`Formatter`] that
//! only has to deal with per-value failures at render time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::context::FormatContext;
use super::datetime::{self, try_render};
use super::errors::{FormatError, FormatResult};
use super::locale::{Separators, StyleRef};
use super::markup::{MarkupRenderer, escape_html};
use super::models::{CellCoord, CellValue};
use super::number::{
    STANDARD_SUFFIXES, Numeral, NumeralStyle, apply_pattern, apply_suffix, decompose_scientific, numeral, superscript,
};

const PLACEHOLDER: &str = "{x}";

/// Magnitude suffixing for large numbers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "SuffixingDef", into = "SuffixingDef")]
pub enum Suffixing {
    #[default]
    Off,
    /// `K`, `M`, `B`, `T`.
    Standard,
    /// Labels for 10^3, 10^6, ...; empty labels skip a step.
    Custom(Vec<String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SuffixingDef {
    Flag(bool),
    Labels(Vec<String>),
}

impl From<SuffixingDef> for Suffixing {
    fn from(def: SuffixingDef) -> Self {
        match def {
            SuffixingDef::Flag(false) => Suffixing::Off,
            SuffixingDef::Flag(true) => Suffixing::Standard,
            SuffixingDef::Labels(labels) => Suffixing::Custom(labels),
        }
    }
}

impl From<Suffixing> for SuffixingDef {
    fn from(s: Suffixing) -> Self {
        match s {
            Suffixing::Off => SuffixingDef::Flag(false),
            Suffixing::Standard => SuffixingDef::Flag(true),
            Suffixing::Custom(labels) => SuffixingDef::Labels(labels),
        }
    }
}

impl Suffixing {
    fn ladder(&self) -> Vec<String> {
        match self {
            Suffixing::Off => Vec::new(),
            Suffixing::Standard => STANDARD_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            Suffixing::Custom(labels) => labels.clone(),
        }
    }
}

/// Which side of the number a symbol goes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Left,
    #[default]
    Right,
}

/// Exponent notation for scientific formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpStyle {
    /// `1.23 × 10⁵`
    #[default]
    #[serde(rename = "superscript")]
    Superscript,
    /// `1.23 × 10^5`
    #[serde(rename = "caret")]
    Caret,
    /// `1.23e05`
    #[serde(rename = "e")]
    LowerE,
    /// `1.23E05`
    #[serde(rename = "E")]
    UpperE,
}

/// Options shared by every numeric formatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumeralOptions {
    pub drop_trailing_zeros: bool,
    pub drop_trailing_dec_mark: bool,
    pub use_seps: bool,
    pub sep_mark: char,
    pub dec_mark: char,
    /// Locale id; its marks override `sep_mark` and `dec_mark`.
    pub locale: Option<String>,
    /// Output template with a single `{x}` placeholder.
    pub pattern: String,
    pub force_sign: bool,
}

impl Default for NumeralOptions {
    fn default() -> Self {
        let marks = Separators::default();
        Self {
            drop_trailing_zeros: false,
            drop_trailing_dec_mark: true,
            use_seps: true,
            sep_mark: marks.sep_mark,
            dec_mark: marks.dec_mark,
            locale: None,
            pattern: PLACEHOLDER.to_string(),
            force_sign: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberOptions {
    pub decimals: usize,
    pub n_sigfig: Option<usize>,
    pub scale_by: f64,
    pub suffixing: Suffixing,
    #[serde(flatten)]
    pub numeral: NumeralOptions,
}

impl Default for NumberOptions {
    fn default() -> Self {
        Self {
            decimals: 2,
            n_sigfig: None,
            scale_by: 1.0,
            suffixing: Suffixing::Off,
            numeral: NumeralOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegerOptions {
    pub scale_by: f64,
    pub suffixing: Suffixing,
    #[serde(flatten)]
    pub numeral: NumeralOptions,
}

impl Default for IntegerOptions {
    fn default() -> Self {
        Self {
            scale_by: 1.0,
            suffixing: Suffixing::Off,
            numeral: NumeralOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PercentOptions {
    pub decimals: usize,
    /// Multiply by 100 first; off when values are already percentages.
    pub scale_values: bool,
    pub placement: Placement,
    pub incl_space: bool,
    #[serde(flatten)]
    pub numeral: NumeralOptions,
}

impl Default for PercentOptions {
    fn default() -> Self {
        Self {
            decimals: 2,
            scale_values: true,
            placement: Placement::Right,
            incl_space: false,
            numeral: NumeralOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyOptions {
    /// ISO 4217 code.
    pub currency: String,
    /// Overrides the currency's subunit digits.
    pub decimals: Option<usize>,
    /// Overrides the currency's symbol.
    pub symbol: Option<String>,
    pub use_subunits: bool,
    /// Negative values in parentheses instead of with a minus sign.
    pub accounting: bool,
    pub placement: Placement,
    pub incl_space: bool,
    pub scale_by: f64,
    pub suffixing: Suffixing,
    #[serde(flatten)]
    pub numeral: NumeralOptions,
}

impl Default for CurrencyOptions {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            decimals: None,
            symbol: None,
            use_subunits: true,
            accounting: false,
            placement: Placement::Left,
            incl_space: false,
            scale_by: 1.0,
            suffixing: Suffixing::Off,
            numeral: NumeralOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScientificOptions {
    pub decimals: usize,
    pub scale_by: f64,
    pub exp_style: ExpStyle,
    #[serde(flatten)]
    pub numeral: NumeralOptions,
}

impl Default for ScientificOptions {
    fn default() -> Self {
        Self {
            decimals: 2,
            scale_by: 1.0,
            exp_style: ExpStyle::Superscript,
            numeral: NumeralOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateOptions {
    pub date_style: StyleRef,
    /// Explicit strftime pattern; wins over `date_style`.
    pub format: Option<String>,
}

impl Default for DateOptions {
    fn default() -> Self {
        Self {
            date_style: StyleRef::Id(1),
            format: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeOptions {
    pub time_style: StyleRef,
    pub format: Option<String>,
}

impl Default for TimeOptions {
    fn default() -> Self {
        Self {
            time_style: StyleRef::Id(1),
            format: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateTimeOptions {
    pub date_style: StyleRef,
    pub time_style: StyleRef,
    /// Text between the date and time parts.
    pub sep: String,
    pub format: Option<String>,
}

impl Default for DateTimeOptions {
    fn default() -> Self {
        Self {
            date_style: StyleRef::Id(1),
            time_style: StyleRef::Id(1),
            sep: " ".to_string(),
            format: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassthroughOptions {
    pub pattern: String,
    pub escape: bool,
}

impl Default for PassthroughOptions {
    fn default() -> Self {
        Self {
            pattern: PLACEHOLDER.to_string(),
            escape: false,
        }
    }
}

pub type CustomFn = dyn Fn(&CellValue) -> Result<String, String> + Send + Sync;

/// Caller-supplied formatting closure.
#[derive(Clone)]
pub struct CustomFormat(pub Arc<CustomFn>);

impl CustomFormat {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&CellValue) -> Result<String, String> + Send + Sync + 'static,
    {
        CustomFormat(Arc::new(f))
    }
}

impl fmt::Debug for CustomFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomFormat(<fn>)")
    }
}

impl PartialEq for CustomFormat {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Declarative formatter description.
///
/// # Examples
///
/// ```
/// use cellfmt::domain::formatter::FormatterConfig;
///
/// let config: FormatterConfig =
///     serde_json::from_str(r#"{"type": "currency", "currency": "EUR"}"#).unwrap();
/// assert_eq!(config.name(), "currency");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormatterConfig {
    Number(NumberOptions),
    Integer(IntegerOptions),
    Percent(PercentOptions),
    Currency(CurrencyOptions),
    Scientific(ScientificOptions),
    Date(DateOptions),
    Time(TimeOptions),
    #[serde(rename = "datetime")]
    DateTime(DateTimeOptions),
    Markdown,
    Passthrough(PassthroughOptions),
    #[serde(skip)]
    Custom(CustomFormat),
}

impl FormatterConfig {
    pub fn name(&self) -> &'static str {
        match self {
            FormatterConfig::Number(_) => "number",
            FormatterConfig::Integer(_) => "integer",
            FormatterConfig::Percent(_) => "percent",
            FormatterConfig::Currency(_) => "currency",
            FormatterConfig::Scientific(_) => "scientific",
            FormatterConfig::Date(_) => "date",
            FormatterConfig::Time(_) => "time",
            FormatterConfig::DateTime(_) => "datetime",
            FormatterConfig::Markdown => "markdown",
            FormatterConfig::Passthrough(_) => "passthrough",
            FormatterConfig::Custom(_) => "custom",
        }
    }

    /// Validates the options and resolves locale-dependent data.
    pub fn build(&self, ctx: &FormatContext) -> FormatResult<Formatter> {
        match self {
            FormatterConfig::Number(opts) => {
                if opts.n_sigfig == Some(0) {
                    return Err(config_error("n_sigfig must be at least 1"));
                }
                NumericFormatter::new(
                    &opts.numeral,
                    ctx,
                    opts.decimals,
                    opts.n_sigfig,
                    opts.scale_by,
                    &opts.suffixing,
                    Notation::Plain,
                )
                .map(Formatter::Numeric)
            }
            FormatterConfig::Integer(opts) => {
                let numeral = NumeralOptions {
                    drop_trailing_dec_mark: true,
                    ..opts.numeral.clone()
                };
                NumericFormatter::new(&numeral, ctx, 0, None, opts.scale_by, &opts.suffixing, Notation::Plain)
                    .map(Formatter::Numeric)
            }
            FormatterConfig::Percent(opts) => {
                let scale = if opts.scale_values { 100.0 } else { 1.0 };
                let notation = Notation::Percent {
                    placement: opts.placement,
                    space: opts.incl_space,
                };
                NumericFormatter::new(&opts.numeral, ctx, opts.decimals, None, scale, &Suffixing::Off, notation)
                    .map(Formatter::Numeric)
            }
            FormatterConfig::Currency(opts) => build_currency(opts, ctx).map(Formatter::Numeric),
            FormatterConfig::Scientific(opts) => NumericFormatter::new(
                &opts.numeral,
                ctx,
                opts.decimals,
                None,
                opts.scale_by,
                &Suffixing::Off,
                Notation::Scientific(opts.exp_style),
            )
            .map(Formatter::Numeric),
            FormatterConfig::Date(opts) => {
                let pattern = match &opts.format {
                    Some(pattern) => pattern.clone(),
                    None => ctx.locale.date_style(&opts.date_style)?,
                };
                datetime::validate_pattern(&pattern)?;
                Ok(Formatter::Date(pattern))
            }
            FormatterConfig::Time(opts) => {
                let pattern = match &opts.format {
                    Some(pattern) => pattern.clone(),
                    None => ctx.locale.time_style(&opts.time_style)?,
                };
                datetime::validate_pattern(&pattern)?;
                Ok(Formatter::Time(pattern))
            }
            FormatterConfig::DateTime(opts) => {
                let pattern = match &opts.format {
                    Some(pattern) => pattern.clone(),
                    None => format!(
                        "{}{}{}",
                        ctx.locale.date_style(&opts.date_style)?,
                        opts.sep.replace('%', "%%"),
                        ctx.locale.time_style(&opts.time_style)?
                    ),
                };
                datetime::validate_pattern(&pattern)?;
                Ok(Formatter::DateTime(pattern))
            }
            FormatterConfig::Markdown => Ok(Formatter::Markdown(Arc::clone(&ctx.markup))),
            FormatterConfig::Passthrough(opts) => {
                check_pattern(&opts.pattern)?;
                Ok(Formatter::Passthrough {
                    pattern: opts.pattern.clone(),
                    escape: opts.escape,
                })
            }
            FormatterConfig::Custom(custom) => Ok(Formatter::Custom(custom.clone())),
        }
    }
}

impl From<NumberOptions> for FormatterConfig {
    fn from(opts: NumberOptions) -> Self {
        FormatterConfig::Number(opts)
    }
}

impl From<PercentOptions> for FormatterConfig {
    fn from(opts: PercentOptions) -> Self {
        FormatterConfig::Percent(opts)
    }
}

impl From<CurrencyOptions> for FormatterConfig {
    fn from(opts: CurrencyOptions) -> Self {
        FormatterConfig::Currency(opts)
    }
}

fn config_error(message: impl Into<String>) -> FormatError {
    FormatError::FormatConfig(message.into())
}

fn check_pattern(pattern: &str) -> FormatResult<()> {
    if pattern.matches(PLACEHOLDER).count() != 1 {
        return Err(config_error(format!(
            "Pattern must contain exactly one {{x}} placeholder: {}",
            pattern
        )));
    }
    Ok(())
}

fn build_currency(opts: &CurrencyOptions, ctx: &FormatContext) -> FormatResult<NumericFormatter> {
    // An explicit symbol lets codes outside the provider's table through.
    let info = match (ctx.locale.currency(&opts.currency), &opts.symbol) {
        (Ok(info), _) => Some(info),
        (Err(_), Some(_)) => None,
        (Err(err), None) => return Err(err),
    };

    let symbol = opts
        .symbol
        .clone()
        .or_else(|| info.as_ref().map(|i| i.symbol.clone()))
        .unwrap_or_default();

    let decimals = if !opts.use_subunits {
        0
    } else {
        opts.decimals
            .or_else(|| info.as_ref().map(|i| i.decimals as usize))
            .unwrap_or(2)
    };

    let notation = Notation::Currency {
        symbol,
        placement: opts.placement,
        space: opts.incl_space,
        accounting: opts.accounting,
    };
    NumericFormatter::new(&opts.numeral, ctx, decimals, None, opts.scale_by, &opts.suffixing, notation)
}

#[derive(Debug, Clone, PartialEq)]
enum Notation {
    Plain,
    Percent {
        placement: Placement,
        space: bool,
    },
    Currency {
        symbol: String,
        placement: Placement,
        space: bool,
        accounting: bool,
    },
    Scientific(ExpStyle),
}

/// Number, integer, percent, currency and scientific formatting, resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericFormatter {
    style: NumeralStyle,
    scale_by: f64,
    suffixes: Vec<String>,
    notation: Notation,
    force_sign: bool,
    pattern: String,
}

impl NumericFormatter {
    fn new(
        opts: &NumeralOptions,
        ctx: &FormatContext,
        decimals: usize,
        n_sigfig: Option<usize>,
        scale_by: f64,
        suffixing: &Suffixing,
        notation: Notation,
    ) -> FormatResult<Self> {
        check_pattern(&opts.pattern)?;
        if !scale_by.is_finite() || scale_by == 0.0 {
            return Err(config_error(format!("scale_by must be finite and non-zero, got {}", scale_by)));
        }

        let separators = match &opts.locale {
            Some(locale) => ctx.locale.separators(locale)?,
            None => Separators {
                sep_mark: opts.sep_mark,
                dec_mark: opts.dec_mark,
            },
        };
        if opts.use_seps && separators.sep_mark == separators.dec_mark {
            return Err(config_error(format!(
                "sep_mark and dec_mark are both '{}'",
                separators.dec_mark
            )));
        }

        Ok(Self {
            style: NumeralStyle {
                decimals,
                n_sigfig,
                drop_trailing_zeros: opts.drop_trailing_zeros,
                drop_trailing_dec_mark: opts.drop_trailing_dec_mark,
                use_seps: opts.use_seps,
                separators,
            },
            scale_by,
            suffixes: suffixing.ladder(),
            notation,
            force_sign: opts.force_sign,
            pattern: opts.pattern.clone(),
        })
    }

    /// Formats a number.
    pub fn format(&self, x: f64) -> String {
        let x = x * self.scale_by;

        let body = match &self.notation {
            Notation::Scientific(exp_style) => self.scientific(x, *exp_style),
            Notation::Plain => {
                let (reduced, suffix) = apply_suffix(x, &self.suffixes);
                let n = numeral(reduced, &self.style);
                format!("{}{}", n.signed(self.force_sign), suffix)
            }
            Notation::Percent { placement, space } => {
                let n = numeral(x, &self.style);
                let gap = if *space { " " } else { "" };
                let core = match placement {
                    Placement::Right => format!("{}{}%", n.digits, gap),
                    Placement::Left => format!("%{}{}", gap, n.digits),
                };
                sign(&n, core, self.force_sign)
            }
            Notation::Currency {
                symbol,
                placement,
                space,
                accounting,
            } => {
                let (reduced, suffix) = apply_suffix(x, &self.suffixes);
                let n = numeral(reduced, &self.style);
                let gap = if *space { " " } else { "" };
                let core = match placement {
                    Placement::Left => format!("{}{}{}{}", symbol, gap, n.digits, suffix),
                    Placement::Right => format!("{}{}{}{}", n.digits, suffix, gap, symbol),
                };
                if *accounting && n.negative {
                    format!("({})", core)
                } else {
                    sign(&n, core, self.force_sign)
                }
            }
        };

        apply_pattern(&self.pattern, &body)
    }

    fn scientific(&self, x: f64, exp_style: ExpStyle) -> String {
        let (mantissa, exponent) = decompose_scientific(x, self.style.decimals);
        let m = numeral(mantissa, &self.style).signed(self.force_sign);
        if mantissa == 0.0 || !mantissa.is_finite() {
            return m;
        }
        match exp_style {
            ExpStyle::Superscript => format!("{} × 10{}", m, superscript(exponent)),
            ExpStyle::Caret => format!("{} × 10^{}", m, exponent),
            ExpStyle::LowerE => format!("{}e{}", m, exponent_digits(exponent)),
            ExpStyle::UpperE => format!("{}E{}", m, exponent_digits(exponent)),
        }
    }
}

fn sign(n: &Numeral, core: String, force_sign: bool) -> String {
    if n.negative {
        format!("-{}", core)
    } else if force_sign && !n.is_zero() {
        format!("+{}", core)
    } else {
        core
    }
}

fn exponent_digits(exponent: i32) -> String {
    if exponent < 0 {
        format!("-{:02}", exponent.unsigned_abs())
    } else {
        format!("{:02}", exponent)
    }
}

/// A validated formatter, ready to apply to cell values.
#[derive(Clone)]
pub enum Formatter {
    Numeric(NumericFormatter),
    Date(String),
    Time(String),
    DateTime(String),
    Markdown(Arc<dyn MarkupRenderer>),
    Passthrough { pattern: String, escape: bool },
    Custom(CustomFormat),
}

impl Formatter {
    /// Formats a non-missing value. Failures are tagged with `coord`.
    pub fn apply(&self, value: &CellValue, coord: CellCoord) -> FormatResult<String> {
        let fail = |message: String| FormatError::parse(coord.row, coord.col, message);

        match self {
            Formatter::Numeric(numeric) => {
                let x = value.as_number().ok_or_else(|| fail(not_a_number(value)))?;
                Ok(numeric.format(x))
            }
            Formatter::Date(pattern) => {
                let date = datetime::date_of(value).map_err(fail)?;
                try_render(date.format(pattern)).map_err(fail)
            }
            Formatter::Time(pattern) => {
                let time = datetime::time_of(value).map_err(fail)?;
                try_render(time.format(pattern)).map_err(fail)
            }
            Formatter::DateTime(pattern) => {
                let dt = datetime::datetime_of(value).map_err(fail)?;
                try_render(dt.format(pattern)).map_err(fail)
            }
            Formatter::Markdown(renderer) => Ok(renderer.render(&value.display())),
            Formatter::Passthrough { pattern, escape } => {
                let text = value.display();
                let text = if *escape { escape_html(&text) } else { text };
                Ok(apply_pattern(pattern, &text))
            }
            Formatter::Custom(custom) => (custom.0)(value).map_err(fail),
        }
    }
}

fn not_a_number(value: &CellValue) -> String {
    match value {
        CellValue::Text(s) => format!("not a number: \"{}\"", s),
        other => format!("expected a number, found {}", other.kind()),
    }
}

impl fmt::Debug for Formatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formatter::Numeric(numeric) => f.debug_tuple("Numeric").field(numeric).finish(),
            Formatter::Date(pattern) => f.debug_tuple("Date").field(pattern).finish(),
            Formatter::Time(pattern) => f.debug_tuple("Time").field(pattern).finish(),
            Formatter::DateTime(pattern) => f.debug_tuple("DateTime").field(pattern).finish(),
            Formatter::Markdown(_) => write!(f, "Markdown"),
            Formatter::Passthrough { pattern, escape } => f
                .debug_struct("Passthrough")
                .field("pattern", pattern)
                .field("escape", escape)
                .finish(),
            Formatter::Custom(custom) => fmt::Debug::fmt(custom, f),
        }
    }
}
