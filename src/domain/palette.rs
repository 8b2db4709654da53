//! Named color palettes.

use super::color::Rgba;
use super::errors::{FormatError, FormatResult};

/// Source of named palettes for color rules.
pub trait PaletteProvider: Send + Sync {
    /// Colors of the palette called `name`, in order. Unknown names fail with
    /// [`FormatError::Lookup`].
    fn palette(&self, name: &str) -> FormatResult<Vec<Rgba>>;
}

static PALETTES: &[(&str, &[u32])] = &[
    (
        "viridis",
        &[
            0x440154, 0x482878, 0x3E4A89, 0x31688E, 0x26828E, 0x1F9E89, 0x35B779, 0x6DCD59, 0xB4DE2C, 0xFDE725,
        ],
    ),
    (
        "magma",
        &[
            0x000004, 0x1C1044, 0x4F127B, 0x812581, 0xB5367A, 0xE55064, 0xFB8861, 0xFEC287, 0xFCFDBF,
        ],
    ),
    (
        "blues",
        &[
            0xF7FBFF, 0xDEEBF7, 0xC6DBEF, 0x9ECAE1, 0x6BAED6, 0x4292C6, 0x2171B5, 0x08519C, 0x08306B,
        ],
    ),
    (
        "reds",
        &[
            0xFFF5F0, 0xFEE0D2, 0xFCBBA1, 0xFC9272, 0xFB6A4A, 0xEF3B2C, 0xCB181D, 0xA50F15, 0x67000D,
        ],
    ),
    (
        "greens",
        &[
            0xF7FCF5, 0xE5F5E0, 0xC7E9C0, 0xA1D99B, 0x74C476, 0x41AB5D, 0x238B45, 0x006D2C, 0x00441B,
        ],
    ),
    (
        "rdylgn",
        &[
            0xA50026, 0xD73027, 0xF46D43, 0xFDAE61, 0xFEE08B, 0xFFFFBF, 0xD9EF8B, 0xA6D96A, 0x66BD63, 0x1A9850,
            0x006837,
        ],
    ),
    (
        "set1",
        &[
            0xE41A1C, 0x377EB8, 0x4DAF4A, 0x984EA3, 0xFF7F00, 0xFFFF33, 0xA65628, 0xF781BF, 0x999999,
        ],
    ),
    (
        "okabe_ito",
        &[
            0x000000, 0xE69F00, 0x56B4E9, 0x009E73, 0xF0E442, 0x0072B2, 0xD55E00, 0xCC79A7, 0x999999,
        ],
    ),
];

const fn from_rgb24(rgb: u32) -> Rgba {
    Rgba::rgb((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
}

/// Built-in sequential, diverging and qualitative palettes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPalettes;

impl BuiltinPalettes {
    pub fn names() -> impl Iterator<Item = &'static str> {
        PALETTES.iter().map(|(name, _)| *name)
    }
}

impl PaletteProvider for BuiltinPalettes {
    fn palette(&self, name: &str) -> FormatResult<Vec<Rgba>> {
        let key = name.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        PALETTES
            .iter()
            .find(|(n, _)| *n == key)
            .map(|(_, colors)| colors.iter().map(|&c| from_rgb24(c)).collect())
            .ok_or_else(|| FormatError::Lookup(format!("Unknown palette: {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_palettes() {
        let palettes = BuiltinPalettes;
        let viridis = palettes.palette("viridis").unwrap();
        assert_eq!(viridis.first(), Some(&Rgba::rgb(0x44, 0x01, 0x54)));
        assert_eq!(viridis.last(), Some(&Rgba::rgb(0xFD, 0xE7, 0x25)));
        assert_eq!(palettes.palette("Okabe-Ito").unwrap().len(), 9);
        assert_eq!(BuiltinPalettes::names().count(), 8);
    }

    #[test]
    fn test_unknown_palette_is_lookup_error() {
        assert!(matches!(
            BuiltinPalettes.palette("rainbow"),
            Err(FormatError::Lookup(_))
        ));
    }
}
