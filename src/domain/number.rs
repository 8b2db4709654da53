//! Numeral construction shared by the number, percent, currency and
//! scientific formatters.
//!
//! Everything here works on already-scaled `f64` values and never looks at
//! patterns or symbols; those are layered on by [`super::formatter`].

use super::locale::Separators;

/// Standard magnitude ladder for suffixing: 10^3, 10^6, 10^9, 10^12.
pub const STANDARD_SUFFIXES: [&str; 4] = ["K", "M", "B", "T"];

/// How digits are rounded, grouped and marked.
#[derive(Debug, Clone, PartialEq)]
pub struct NumeralStyle {
    pub decimals: usize,
    /// Significant figures; takes precedence over `decimals`.
    pub n_sigfig: Option<usize>,
    pub drop_trailing_zeros: bool,
    pub drop_trailing_dec_mark: bool,
    pub use_seps: bool,
    pub separators: Separators,
}

impl Default for NumeralStyle {
    fn default() -> Self {
        Self {
            decimals: 2,
            n_sigfig: None,
            drop_trailing_zeros: false,
            drop_trailing_dec_mark: true,
            use_seps: true,
            separators: Separators::default(),
        }
    }
}

/// An unsigned numeral plus the sign it should be presented with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Numeral {
    pub negative: bool,
    pub digits: String,
}

impl Numeral {
    /// Numeral with a leading `-` (or `+` when `force_sign` and positive).
    pub fn signed(&self, force_sign: bool) -> String {
        if self.negative {
            format!("-{}", self.digits)
        } else if force_sign && !self.is_zero() {
            format!("+{}", self.digits)
        } else {
            self.digits.clone()
        }
    }

    /// True when every digit is zero.
    pub fn is_zero(&self) -> bool {
        self.digits.chars().all(|c| !c.is_ascii_digit() || c == '0')
    }
}

/// Rounds half away from zero at `decimals` places.
pub fn round_half_away(x: f64, decimals: usize) -> f64 {
    if decimals > 15 || !x.is_finite() {
        return x;
    }
    let factor = 10f64.powi(decimals as i32);
    let scaled = x * factor;
    if !scaled.is_finite() {
        return x;
    }
    scaled.round() / factor
}

/// Rounds to `n` significant figures, returning the value and the number of
/// decimals needed to show them.
pub fn round_sigfig(x: f64, n: usize) -> (f64, usize) {
    let n = n.max(1) as i32;
    if x == 0.0 || !x.is_finite() {
        return (x, (n - 1) as usize);
    }

    let exponent = x.abs().log10().floor() as i32;
    let (mut rounded, mut decimals) = round_at(x, n - 1 - exponent);

    // Rounding can carry into a new order of magnitude (9.99 -> 10.0).
    if rounded != 0.0 {
        let new_exponent = rounded.abs().log10().floor() as i32;
        if new_exponent > exponent {
            (rounded, decimals) = round_at(rounded, n - 1 - new_exponent);
        }
    }

    (rounded, decimals)
}

fn round_at(x: f64, places: i32) -> (f64, usize) {
    if places >= 0 {
        (round_half_away(x, places as usize), places as usize)
    } else {
        let factor = 10f64.powi(-places);
        ((x / factor).round() * factor, 0)
    }
}

/// Inserts `sep` between groups of three integer digits.
pub fn group_digits(int_part: &str, sep: char) -> String {
    let len = int_part.len();
    if len <= 3 {
        return int_part.to_string();
    }

    let mut out = String::with_capacity(len + len / 3 * sep.len_utf8());
    let mut first_group = len % 3;
    if first_group == 0 {
        first_group = 3;
    }

    out.push_str(&int_part[..first_group]);
    let mut idx = first_group;
    while idx < len {
        out.push(sep);
        out.push_str(&int_part[idx..idx + 3]);
        idx += 3;
    }

    out
}

/// Builds the numeral for `x` under `style`.
///
/// # Examples
///
/// ```
/// use cellfmt::domain::number::{numeral, NumeralStyle};
///
/// let n = numeral(-1234.5, &NumeralStyle::default());
/// assert!(n.negative);
/// assert_eq!(n.digits, "1,234.50");
/// ```
pub fn numeral(x: f64, style: &NumeralStyle) -> Numeral {
    if x.is_nan() {
        return Numeral {
            negative: false,
            digits: "NaN".to_string(),
        };
    }
    if x.is_infinite() {
        return Numeral {
            negative: x < 0.0,
            digits: "Inf".to_string(),
        };
    }

    let (rounded, decimals) = match style.n_sigfig {
        Some(n) => round_sigfig(x, n),
        None => (round_half_away(x, style.decimals), style.decimals),
    };

    let text = format!("{:.*}", decimals, rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), ""));

    let int_part = if style.use_seps {
        group_digits(int_part, style.separators.sep_mark)
    } else {
        int_part.to_string()
    };

    let frac_part = if style.drop_trailing_zeros {
        frac_part.trim_end_matches('0')
    } else {
        frac_part
    };

    let mut digits = int_part;
    if !frac_part.is_empty() {
        digits.push(style.separators.dec_mark);
        digits.push_str(frac_part);
    } else if !style.drop_trailing_dec_mark {
        digits.push(style.separators.dec_mark);
    }

    let negative = rounded < 0.0 && text.chars().any(|c| c.is_ascii_digit() && c != '0');

    Numeral { negative, digits }
}

/// Picks the largest ladder step not exceeding `|x|`.
///
/// `ladder[i]` labels 10^(3(i+1)); empty labels are skipped. Returns the
/// reduced value and the label (empty when no step applies).
pub fn apply_suffix<'a>(x: f64, ladder: &'a [String]) -> (f64, &'a str) {
    let magnitude = x.abs();
    for (i, label) in ladder.iter().enumerate().rev() {
        if label.is_empty() {
            continue;
        }
        let step = 10f64.powi(3 * (i as i32 + 1));
        if magnitude >= step {
            return (x / step, label.as_str());
        }
    }
    (x, "")
}

/// Splits `x` into a mantissa in `[1, 10)` and a base-10 exponent, after
/// rounding the mantissa to `decimals` places.
pub fn decompose_scientific(x: f64, decimals: usize) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let mut exponent = x.abs().log10().floor() as i32;
    let mut mantissa = round_half_away(scale_pow10(x, exponent), decimals);
    if mantissa.abs() >= 10.0 {
        exponent += 1;
        mantissa = round_half_away(scale_pow10(x, exponent), decimals);
    }
    (mantissa, exponent)
}

/// `x / 10^exponent`, split in two steps where `10^exponent` would underflow.
fn scale_pow10(x: f64, exponent: i32) -> f64 {
    if exponent < -300 {
        x * 1e300 / 10f64.powi(exponent + 300)
    } else {
        x / 10f64.powi(exponent)
    }
}

/// Renders an integer with Unicode superscript digits: `-5` → `⁻⁵`.
pub fn superscript(n: i32) -> String {
    let mut out = String::new();
    if n < 0 {
        out.push('⁻');
    }
    for ch in n.unsigned_abs().to_string().chars() {
        out.push(match ch {
            '0' => '⁰',
            '1' => '¹',
            '2' => '²',
            '3' => '³',
            '4' => '⁴',
            '5' => '⁵',
            '6' => '⁶',
            '7' => '⁷',
            '8' => '⁸',
            _ => '⁹',
        });
    }
    out
}

/// Substitutes `{x}` in `pattern` with `text`.
pub fn apply_pattern(pattern: &str, text: &str) -> String {
    pattern.replacen("{x}", text, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(decimals: usize) -> NumeralStyle {
        NumeralStyle {
            decimals,
            ..NumeralStyle::default()
        }
    }

    #[test]
    fn test_grouping_and_decimals() {
        assert_eq!(numeral(1234.5, &style(2)).digits, "1,234.50");
        assert_eq!(numeral(1234567.891, &style(1)).digits, "1,234,567.9");
        assert_eq!(numeral(999.0, &style(0)).digits, "999");
        let no_seps = NumeralStyle {
            use_seps: false,
            ..style(0)
        };
        assert_eq!(numeral(1234567.0, &no_seps).digits, "1234567");
    }

    #[test]
    fn test_locale_marks() {
        let german = NumeralStyle {
            separators: Separators {
                sep_mark: '.',
                dec_mark: ',',
            },
            ..style(2)
        };
        assert_eq!(numeral(1234.5, &german).digits, "1.234,50");
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        assert_eq!(numeral(0.125, &style(2)).digits, "0.13");
        assert_eq!(numeral(0.75, &style(1)).digits, "0.8");
        assert_eq!(numeral(2.5, &style(0)).digits, "3");
        let n = numeral(-2.5, &style(0));
        assert!(n.negative);
        assert_eq!(n.digits, "3");
    }

    #[test]
    fn test_negative_zero_after_rounding_is_unsigned() {
        let n = numeral(-0.001, &style(2));
        assert!(!n.negative);
        assert_eq!(n.signed(false), "0.00");
    }

    #[test]
    fn test_trailing_zeros_and_marks() {
        let drop = NumeralStyle {
            drop_trailing_zeros: true,
            ..style(3)
        };
        assert_eq!(numeral(1.5, &drop).digits, "1.5");
        assert_eq!(numeral(2.0, &drop).digits, "2");

        let keep_mark = NumeralStyle {
            drop_trailing_zeros: true,
            drop_trailing_dec_mark: false,
            ..style(3)
        };
        assert_eq!(numeral(2.0, &keep_mark).digits, "2.");
    }

    #[test]
    fn test_significant_figures() {
        let sig = |n| NumeralStyle {
            n_sigfig: Some(n),
            ..style(5)
        };
        assert_eq!(numeral(123456.0, &sig(3)).digits, "123,000");
        assert_eq!(numeral(0.0012345, &sig(2)).digits, "0.0012");
        assert_eq!(numeral(9.99, &sig(2)).digits, "10");
        assert_eq!(numeral(0.0, &sig(3)).digits, "0.00");
        assert_eq!(numeral(3.14159, &sig(3)).digits, "3.14");
    }

    #[test]
    fn test_force_sign() {
        assert_eq!(numeral(5.0, &style(1)).signed(true), "+5.0");
        assert_eq!(numeral(0.0, &style(1)).signed(true), "0.0");
        assert_eq!(numeral(-5.0, &style(1)).signed(true), "-5.0");
    }

    #[test]
    fn test_suffix_ladder() {
        let ladder: Vec<String> = STANDARD_SUFFIXES.iter().map(|s| s.to_string()).collect();
        assert_eq!(apply_suffix(999.0, &ladder), (999.0, ""));
        assert_eq!(apply_suffix(1500.0, &ladder), (1.5, "K"));
        assert_eq!(apply_suffix(-2_500_000.0, &ladder), (-2.5, "M"));
        assert_eq!(apply_suffix(7e12, &ladder), (7.0, "T"));
        assert_eq!(apply_suffix(7e15, &ladder), (7000.0, "T"));

        let skip_thousands = vec![String::new(), "Mio".to_string()];
        assert_eq!(apply_suffix(5000.0, &skip_thousands), (5000.0, ""));
        assert_eq!(apply_suffix(5e6, &skip_thousands), (5.0, "Mio"));
    }

    #[test]
    fn test_scientific_decomposition() {
        assert_eq!(decompose_scientific(123456.0, 2), (1.23, 5));
        assert_eq!(decompose_scientific(0.000123, 1), (1.2, -4));
        assert_eq!(decompose_scientific(9.999, 2), (1.0, 1));
        assert_eq!(decompose_scientific(0.0, 2), (0.0, 0));
        assert_eq!(decompose_scientific(-4500.0, 1), (-4.5, 3));
        assert_eq!(decompose_scientific(1e-320, 2), (1.0, -320));
        assert_eq!(decompose_scientific(-2.5e-310, 1), (-2.5, -310));
        assert_eq!(decompose_scientific(1.7e308, 2), (1.7, 308));
    }

    #[test]
    fn test_superscript_and_pattern() {
        assert_eq!(superscript(5), "⁵");
        assert_eq!(superscript(-12), "⁻¹²");
        assert_eq!(apply_pattern("{x}K", "0.8"), "0.8K");
        assert_eq!(apply_pattern("({x})", "1"), "(1)");
    }

    #[test]
    fn test_non_finite() {
        assert_eq!(numeral(f64::INFINITY, &style(2)).signed(false), "Inf");
        assert_eq!(numeral(f64::NEG_INFINITY, &style(2)).signed(false), "-Inf");
    }
}
