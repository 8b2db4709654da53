//! Locale, currency and date/time style lookups.
//!
//! The formatting pipeline only talks to the [`LocaleProvider`] trait.
//! [`BuiltinLocales`] is a compact table covering common locales and
//! currencies; callers with a real locale database implement the trait
//! themselves.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::{FormatError, FormatResult};

/// Digit grouping mark and decimal mark for a locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Separators {
    pub sep_mark: char,
    pub dec_mark: char,
}

impl Default for Separators {
    fn default() -> Self {
        Self {
            sep_mark: ',',
            dec_mark: '.',
        }
    }
}

/// Symbol and subunit precision of a currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyInfo {
    pub code: String,
    pub symbol: String,
    /// Number of subunit digits, e.g. 2 for EUR, 0 for JPY, 3 for KWD.
    pub decimals: u8,
}

/// Preset style reference: 1-based id or name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleRef {
    Id(u8),
    Name(String),
}

impl fmt::Display for StyleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleRef::Id(id) => write!(f, "{}", id),
            StyleRef::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<u8> for StyleRef {
    fn from(id: u8) -> Self {
        StyleRef::Id(id)
    }
}

impl From<&str> for StyleRef {
    fn from(name: &str) -> Self {
        StyleRef::Name(name.to_string())
    }
}

/// Source of locale-dependent formatting data.
///
/// Unknown locale or currency codes fail with [`FormatError::Lookup`];
/// unknown style ids fail with [`FormatError::FormatConfig`].
pub trait LocaleProvider: Send + Sync {
    fn separators(&self, locale: &str) -> FormatResult<Separators>;

    fn currency(&self, code: &str) -> FormatResult<CurrencyInfo>;

    /// strftime-style pattern of a preset date style.
    fn date_style(&self, style: &StyleRef) -> FormatResult<String>;

    /// strftime-style pattern of a preset time style.
    fn time_style(&self, style: &StyleRef) -> FormatResult<String>;
}

struct LocaleEntry {
    id: &'static str,
    separators: Separators,
}

const fn entry(id: &'static str, sep_mark: char, dec_mark: char) -> LocaleEntry {
    LocaleEntry {
        id,
        separators: Separators { sep_mark, dec_mark },
    }
}

static LOCALES: &[LocaleEntry] = &[
    entry("en-US", ',', '.'),
    entry("en-GB", ',', '.'),
    entry("de-DE", '.', ','),
    // U+00A0 NO-BREAK SPACE
    entry("fr-FR", '\u{a0}', ','),
    entry("es-ES", '.', ','),
    entry("it-IT", '.', ','),
    entry("nl-NL", '.', ','),
    entry("pt-BR", '.', ','),
    entry("de-CH", '\'', '.'),
    entry("fr-CH", '\'', '.'),
    entry("ja-JP", ',', '.'),
];

static CURRENCIES: &[(&str, &str, u8)] = &[
    ("USD", "$", 2),
    ("EUR", "€", 2),
    ("GBP", "£", 2),
    ("JPY", "¥", 0),
    ("CHF", "CHF", 2),
    ("CAD", "$", 2),
    ("AUD", "$", 2),
    ("CNY", "¥", 2),
    ("INR", "₹", 2),
    ("BRL", "R$", 2),
    ("KRW", "₩", 0),
    ("SEK", "kr", 2),
    ("NOK", "kr", 2),
    ("DKK", "kr", 2),
    ("BHD", "BD", 3),
    ("KWD", "KD", 3),
];

static DATE_STYLES: &[(&str, &str)] = &[
    ("iso", "%Y-%m-%d"),
    ("wday_month_day_year", "%A, %B %-d, %Y"),
    ("wd_m_day_year", "%a, %b %-d, %Y"),
    ("wday_day_month_year", "%A %-d %B %Y"),
    ("month_day_year", "%B %-d, %Y"),
    ("m_day_year", "%b %-d, %Y"),
    ("day_m_year", "%-d %b %Y"),
    ("day_month_year", "%-d %B %Y"),
    ("day_month", "%-d %B"),
    ("year", "%Y"),
    ("month", "%B"),
    ("day", "%d"),
    ("year.mn.day", "%Y/%m/%d"),
    ("y.mn.day", "%y/%m/%d"),
];

static TIME_STYLES: &[(&str, &str)] = &[
    ("hms", "%H:%M:%S"),
    ("hm", "%H:%M"),
    ("hms_p", "%-I:%M:%S %p"),
    ("hm_p", "%-I:%M %p"),
    ("h_p", "%-I %p"),
];

/// Normalizes common locale tag spellings to a canonical built-in id.
///
/// `_` and `-` are equivalent, matching is case-insensitive, POSIX
/// encoding/modifier suffixes and BCP-47 extensions are dropped, and a bare
/// or unknown-region language falls back to its primary locale.
fn normalize_locale_id(id: &str) -> Option<&'static str> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut key: String = trimmed
        .chars()
        .map(|ch| if ch == '_' { '-' } else { ch.to_ascii_lowercase() })
        .collect();

    for marker in [".", "@", "-u-", "-x-"] {
        if let Some(idx) = key.find(marker) {
            key.truncate(idx);
        }
    }

    if let Some(found) = LOCALES.iter().find(|l| l.id.eq_ignore_ascii_case(&key)) {
        return Some(found.id);
    }

    match key.split('-').next().unwrap_or("") {
        "en" => Some("en-US"),
        "de" => Some("de-DE"),
        "fr" => Some("fr-FR"),
        "es" => Some("es-ES"),
        "it" => Some("it-IT"),
        "nl" => Some("nl-NL"),
        "pt" => Some("pt-BR"),
        "ja" => Some("ja-JP"),
        _ => None,
    }
}

fn lookup_style(table: &[(&str, &str)], style: &StyleRef, kind: &str) -> FormatResult<String> {
    let found = match style {
        StyleRef::Id(id) => (*id as usize)
            .checked_sub(1)
            .and_then(|idx| table.get(idx)),
        StyleRef::Name(name) => table.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)),
    };
    found
        .map(|(_, pattern)| (*pattern).to_string())
        .ok_or_else(|| FormatError::FormatConfig(format!("Unknown {} style: {}", kind, style)))
}

/// Built-in locale table.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLocales;

impl BuiltinLocales {
    /// Names of the preset date styles, in id order.
    pub fn date_style_names() -> impl Iterator<Item = &'static str> {
        DATE_STYLES.iter().map(|(name, _)| *name)
    }

    /// Names of the preset time styles, in id order.
    pub fn time_style_names() -> impl Iterator<Item = &'static str> {
        TIME_STYLES.iter().map(|(name, _)| *name)
    }
}

impl LocaleProvider for BuiltinLocales {
    fn separators(&self, locale: &str) -> FormatResult<Separators> {
        let id = normalize_locale_id(locale)
            .ok_or_else(|| FormatError::Lookup(format!("Unknown locale: {}", locale)))?;
        LOCALES
            .iter()
            .find(|l| l.id == id)
            .map(|l| l.separators)
            .ok_or_else(|| FormatError::Lookup(format!("Unknown locale: {}", locale)))
    }

    fn currency(&self, code: &str) -> FormatResult<CurrencyInfo> {
        CURRENCIES
            .iter()
            .find(|(c, _, _)| c.eq_ignore_ascii_case(code.trim()))
            .map(|(c, symbol, decimals)| CurrencyInfo {
                code: (*c).to_string(),
                symbol: (*symbol).to_string(),
                decimals: *decimals,
            })
            .ok_or_else(|| FormatError::Lookup(format!("Unknown currency: {}", code)))
    }

    fn date_style(&self, style: &StyleRef) -> FormatResult<String> {
        lookup_style(DATE_STYLES, style, "date")
    }

    fn time_style(&self, style: &StyleRef) -> FormatResult<String> {
        lookup_style(TIME_STYLES, style, "time")
    }
}
