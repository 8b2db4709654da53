use serde::{Deserialize, Serialize};

use super::models::CellValue;

fn default_missing_text() -> String {
    "—".to_string()
}

fn default_zero_text() -> String {
    "nil".to_string()
}

/// Replacement text for missing or zero cells.
///
/// A substitution wins over any format rule for the cells it applies to.
/// Missing and zero substitutions are resolved independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Substitution {
    Missing {
        #[serde(default = "default_missing_text")]
        text: String,
    },
    Zero {
        #[serde(default = "default_zero_text")]
        text: String,
    },
}

impl Substitution {
    pub fn missing(text: impl Into<String>) -> Self {
        Substitution::Missing { text: text.into() }
    }

    pub fn zero(text: impl Into<String>) -> Self {
        Substitution::Zero { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Substitution::Missing { text } | Substitution::Zero { text } => text,
        }
    }

    /// Whether this substitution replaces `value`.
    pub fn applies_to(&self, value: &CellValue) -> bool {
        match self {
            Substitution::Missing { .. } => value.is_missing(),
            Substitution::Zero { .. } => matches!(value, CellValue::Number(n) if *n == 0.0),
        }
    }
}

impl Default for Substitution {
    fn default() -> Self {
        Substitution::missing(default_missing_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applies_to() {
        let missing = Substitution::default();
        assert!(missing.applies_to(&CellValue::Missing));
        assert!(missing.applies_to(&CellValue::Number(f64::NAN)));
        assert!(!missing.applies_to(&CellValue::Number(0.0)));

        let zero = Substitution::zero("-");
        assert!(zero.applies_to(&CellValue::Number(0.0)));
        assert!(zero.applies_to(&CellValue::Number(-0.0)));
        assert!(!zero.applies_to(&CellValue::Text("0".to_string())));
        assert!(!zero.applies_to(&CellValue::Missing));
    }

    #[test]
    fn test_json_defaults() {
        let sub: Substitution = serde_json::from_str(r#"{"type": "missing"}"#).unwrap();
        assert_eq!(sub.text(), "—");
        let sub: Substitution = serde_json::from_str(r#"{"type": "zero", "text": "none"}"#).unwrap();
        assert_eq!(sub, Substitution::zero("none"));
    }
}
