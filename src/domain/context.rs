use std::fmt;
use std::sync::Arc;

use super::locale::{BuiltinLocales, LocaleProvider};
use super::markup::{InlineMarkdown, MarkupRenderer};
use super::palette::{BuiltinPalettes, PaletteProvider};

/// Collaborators consulted while rules are validated and rendered.
#[derive(Clone)]
pub struct FormatContext {
    pub locale: Arc<dyn LocaleProvider>,
    pub palettes: Arc<dyn PaletteProvider>,
    pub markup: Arc<dyn MarkupRenderer>,
}

impl FormatContext {
    pub fn with_locale(mut self, locale: impl LocaleProvider + 'static) -> Self {
        self.locale = Arc::new(locale);
        self
    }

    pub fn with_palettes(mut self, palettes: impl PaletteProvider + 'static) -> Self {
        self.palettes = Arc::new(palettes);
        self
    }

    pub fn with_markup(mut self, markup: impl MarkupRenderer + 'static) -> Self {
        self.markup = Arc::new(markup);
        self
    }
}

impl Default for FormatContext {
    fn default() -> Self {
        Self {
            locale: Arc::new(BuiltinLocales),
            palettes: Arc::new(BuiltinPalettes),
            markup: Arc::new(InlineMarkdown),
        }
    }
}

impl fmt::Debug for FormatContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatContext").finish_non_exhaustive()
    }
}
