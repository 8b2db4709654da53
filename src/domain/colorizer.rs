//! Value-driven cell colors.
//!
//! A [`ColorConfig`] is validated into a [`ColorMapper`] at registration.
//! Scales that depend on the data (inferred numeric domains, category order)
//! are computed per render by [`ColorMapper::scale`] from the values the rule
//! selects, so they always reflect the current raw values.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::color::{self, Rgba};
use super::context::FormatContext;
use super::errors::{FormatError, FormatResult};
use super::models::CellValue;

/// How values map onto the palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMethod {
    /// `Numeric` when every selected value is a number, else `Factor`.
    #[default]
    Auto,
    /// Continuous gradient over a numeric domain.
    Numeric,
    /// One palette color per distinct value, in first-seen order.
    Factor,
}

/// Where a resolved color is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyTo {
    #[default]
    Fill,
    Text,
    Both,
}

/// A named palette or an explicit list of colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaletteSpec {
    Named(String),
    Colors(Vec<String>),
}

impl Default for PaletteSpec {
    fn default() -> Self {
        PaletteSpec::Named("viridis".to_string())
    }
}

impl PaletteSpec {
    pub fn colors<S: Into<String>>(colors: impl IntoIterator<Item = S>) -> Self {
        PaletteSpec::Colors(colors.into_iter().map(Into::into).collect())
    }

    fn resolve(&self, ctx: &FormatContext) -> FormatResult<Vec<Rgba>> {
        let colors = match self {
            PaletteSpec::Named(name) => ctx.palettes.palette(name)?,
            PaletteSpec::Colors(colors) => colors
                .iter()
                .map(|c| Rgba::parse(c).map_err(FormatError::FormatConfig))
                .collect::<FormatResult<Vec<_>>>()?,
        };
        if colors.is_empty() {
            return Err(FormatError::FormatConfig("Palette has no colors".to_string()));
        }
        Ok(colors)
    }
}

fn default_na_color() -> Rgba {
    Rgba::rgb(0x80, 0x80, 0x80)
}

fn default_true() -> bool {
    true
}

fn default_alpha() -> f64 {
    1.0
}

/// Declarative color rule options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorConfig {
    #[serde(default)]
    pub method: ColorMethod,
    #[serde(default)]
    pub palette: PaletteSpec,
    /// Fixed `[lo, hi]` for numeric scaling; inferred from the data if unset.
    #[serde(default)]
    pub domain: Option<[f64; 2]>,
    #[serde(default)]
    pub reverse: bool,
    #[serde(default = "default_na_color")]
    pub na_color: Rgba,
    #[serde(default)]
    pub apply_to: ApplyTo,
    /// With fill only, pick black or white text for contrast.
    #[serde(default = "default_true")]
    pub autocolor_text: bool,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            method: ColorMethod::Auto,
            palette: PaletteSpec::default(),
            domain: None,
            reverse: false,
            na_color: default_na_color(),
            apply_to: ApplyTo::Fill,
            autocolor_text: true,
            alpha: 1.0,
        }
    }
}

impl ColorConfig {
    pub fn build(&self, ctx: &FormatContext) -> FormatResult<ColorMapper> {
        let mut palette = self.palette.resolve(ctx)?;
        if self.reverse {
            palette.reverse();
        }

        let domain = match self.domain {
            Some([lo, hi]) if !(lo.is_finite() && hi.is_finite()) || lo > hi => {
                return Err(FormatError::FormatConfig(format!(
                    "Invalid color domain [{}, {}]",
                    lo, hi
                )));
            }
            Some([lo, hi]) => Some((lo, hi)),
            None => None,
        };

        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(FormatError::FormatConfig(format!(
                "alpha must be within [0, 1], got {}",
                self.alpha
            )));
        }

        Ok(ColorMapper {
            method: self.method,
            palette,
            domain,
            na_color: self.na_color,
            apply_to: self.apply_to,
            autocolor_text: self.autocolor_text,
            alpha: self.alpha,
        })
    }
}

/// Fill and text colors for one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellColors {
    pub fill: Option<Rgba>,
    pub text: Option<Rgba>,
}

/// A validated color rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorMapper {
    method: ColorMethod,
    palette: Vec<Rgba>,
    domain: Option<(f64, f64)>,
    na_color: Rgba,
    apply_to: ApplyTo,
    autocolor_text: bool,
    alpha: f64,
}

/// A mapper bound to the values of one render pass.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorScale {
    Continuous { lo: f64, hi: f64 },
    Discrete { categories: HashMap<String, usize> },
}

impl ColorMapper {
    /// Builds the scale from the rule's selected values, in row-major order.
    pub fn scale<'a>(&self, values: impl IntoIterator<Item = &'a CellValue>) -> ColorScale {
        let present: Vec<&CellValue> = values.into_iter().filter(|v| !v.is_missing()).collect();

        let numeric = match self.method {
            ColorMethod::Numeric => true,
            ColorMethod::Factor => false,
            ColorMethod::Auto => present.iter().all(|v| matches!(v, CellValue::Number(_))),
        };

        if numeric {
            let (lo, hi) = self.domain.unwrap_or_else(|| observed_range(&present));
            ColorScale::Continuous { lo, hi }
        } else {
            let mut categories = HashMap::new();
            for value in present {
                let next = categories.len();
                categories.entry(value.display()).or_insert(next);
            }
            ColorScale::Discrete { categories }
        }
    }

    /// Resolves the color for one value; alpha is already applied.
    pub fn colorize(&self, scale: &ColorScale, value: &CellValue) -> Rgba {
        let base = if value.is_missing() {
            self.na_color
        } else {
            match scale {
                ColorScale::Continuous { lo, hi } => match value.as_number() {
                    Some(x) => {
                        let t = if hi > lo { (x - lo) / (hi - lo) } else { 0.0 };
                        color::gradient(&self.palette, t).unwrap_or(self.na_color)
                    }
                    None => self.na_color,
                },
                ColorScale::Discrete { categories } => categories
                    .get(&value.display())
                    .map(|&idx| self.palette[idx % self.palette.len()])
                    .unwrap_or(self.na_color),
            }
        };
        base.scale_alpha(self.alpha)
    }

    /// Splits a resolved color into fill and text per `apply_to`.
    pub fn annotate(&self, color: Rgba) -> CellColors {
        match self.apply_to {
            ApplyTo::Fill => CellColors {
                fill: Some(color),
                text: self.autocolor_text.then(|| color.readable_text()),
            },
            ApplyTo::Text => CellColors {
                fill: None,
                text: Some(color),
            },
            ApplyTo::Both => CellColors {
                fill: Some(color),
                text: Some(color),
            },
        }
    }
}

fn observed_range(values: &[&CellValue]) -> (f64, f64) {
    let mut range: Option<(f64, f64)> = None;
    for x in values.iter().filter_map(|v| v.as_number()).filter(|x| x.is_finite()) {
        range = Some(match range {
            Some((lo, hi)) => (lo.min(x), hi.max(x)),
            None => (x, x),
        });
    }
    range.unwrap_or((0.0, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::color::{BLACK, WHITE};

    fn mapper(config: ColorConfig) -> ColorMapper {
        config.build(&FormatContext::default()).unwrap()
    }

    fn two_stop() -> ColorConfig {
        ColorConfig {
            palette: PaletteSpec::colors(["#000000", "#FFFFFF"]),
            ..ColorConfig::default()
        }
    }

    #[test]
    fn test_continuous_endpoints_from_observed_range() {
        let m = mapper(two_stop());
        let values = [CellValue::Number(10.0), CellValue::Number(30.0), CellValue::Number(20.0)];
        let scale = m.scale(&values);
        assert_eq!(scale, ColorScale::Continuous { lo: 10.0, hi: 30.0 });
        assert_eq!(m.colorize(&scale, &values[0]), BLACK);
        assert_eq!(m.colorize(&scale, &values[1]), WHITE);
    }

    #[test]
    fn test_explicit_domain_clamps() {
        let m = mapper(ColorConfig {
            domain: Some([0.0, 100.0]),
            ..two_stop()
        });
        let scale = m.scale(std::iter::empty());
        assert_eq!(m.colorize(&scale, &CellValue::Number(-50.0)), BLACK);
        assert_eq!(m.colorize(&scale, &CellValue::Number(500.0)), WHITE);
    }

    #[test]
    fn test_degenerate_domain_uses_first_color() {
        let m = mapper(two_stop());
        let values = [CellValue::Number(5.0), CellValue::Number(5.0)];
        let scale = m.scale(&values);
        assert_eq!(m.colorize(&scale, &values[0]), BLACK);
    }

    #[test]
    fn test_missing_gets_na_color() {
        let m = mapper(two_stop());
        let values = [CellValue::Number(1.0), CellValue::Missing];
        let scale = m.scale(&values);
        assert_eq!(m.colorize(&scale, &CellValue::Missing), Rgba::rgb(128, 128, 128));
    }

    #[test]
    fn test_factor_first_seen_order_and_cycling() {
        let m = mapper(ColorConfig {
            palette: PaletteSpec::colors(["red", "blue"]),
            ..ColorConfig::default()
        });
        let values: Vec<CellValue> = ["b", "a", "b", "c"].into_iter().map(CellValue::from).collect();
        let scale = m.scale(&values);
        let red = Rgba::rgb(255, 0, 0);
        let blue = Rgba::rgb(0, 0, 255);
        assert_eq!(m.colorize(&scale, &CellValue::from("b")), red);
        assert_eq!(m.colorize(&scale, &CellValue::from("a")), blue);
        assert_eq!(m.colorize(&scale, &CellValue::from("c")), red);
    }

    #[test]
    fn test_reverse_and_alpha() {
        let m = mapper(ColorConfig {
            reverse: true,
            alpha: 0.5,
            ..two_stop()
        });
        let values = [CellValue::Number(0.0), CellValue::Number(1.0)];
        let scale = m.scale(&values);
        assert_eq!(m.colorize(&scale, &values[0]), WHITE.scale_alpha(0.5));
    }

    #[test]
    fn test_apply_to_and_autocolor() {
        let fill = mapper(two_stop());
        assert_eq!(
            fill.annotate(BLACK),
            CellColors {
                fill: Some(BLACK),
                text: Some(WHITE)
            }
        );

        let text_only = mapper(ColorConfig {
            apply_to: ApplyTo::Text,
            ..two_stop()
        });
        assert_eq!(text_only.annotate(BLACK).fill, None);

        let no_auto = mapper(ColorConfig {
            autocolor_text: false,
            ..two_stop()
        });
        assert_eq!(no_auto.annotate(BLACK).text, None);
    }

    #[test]
    fn test_invalid_configs() {
        let ctx = FormatContext::default();
        let bad = [
            ColorConfig {
                palette: PaletteSpec::Named("nope".to_string()),
                ..ColorConfig::default()
            },
            ColorConfig {
                palette: PaletteSpec::colors(["#12"]),
                ..ColorConfig::default()
            },
            ColorConfig {
                domain: Some([5.0, 1.0]),
                ..ColorConfig::default()
            },
            ColorConfig {
                alpha: 1.5,
                ..ColorConfig::default()
            },
        ];
        assert!(matches!(bad[0].build(&ctx), Err(FormatError::Lookup(_))));
        for config in &bad[1..] {
            assert!(matches!(config.build(&ctx), Err(FormatError::FormatConfig(_))));
        }
    }

    #[test]
    fn test_config_from_json() {
        let config: ColorConfig = serde_json::from_str(
            r##"{"palette": ["#FF0000", "green"], "domain": [0, 10], "apply_to": "text"}"##,
        )
        .unwrap();
        assert_eq!(config.apply_to, ApplyTo::Text);
        assert_eq!(config.domain, Some([0.0, 10.0]));
        assert!(config.autocolor_text);
        assert!(config.build(&FormatContext::default()).is_ok());
    }
}
