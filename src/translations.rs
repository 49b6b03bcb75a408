//! Message-catalog backend for `{% translate %}` (spec §4.4).
//!
//! This module builds only the tag's *dispatch shape* against a
//! `Translations` trait — which of `gettext`/`ngettext`/`pgettext`/
//! `npgettext` to call, based on whether a plural form and a message
//! context are present — grounded on
//! `original_source/liquid/extra/tags/translate_tag.py`'s `TranslateNode.gettext`.
//! It does not ship a catalog implementation; [`NullTranslations`] passes
//! every message through unchanged, the same role `gettext.NullTranslations`
//! plays as the Python original's default.

/// A pluggable message catalog. Implementors back `{% translate %}`'s
/// lookup; every method has a passthrough default so a host can override
/// only the forms it actually uses.
pub trait Translations: Send + Sync {
    fn gettext(&self, message: &str) -> String {
        message.to_string()
    }

    fn ngettext(&self, singular: &str, plural: &str, count: i64) -> String {
        if count == 1 { singular.to_string() } else { plural.to_string() }
    }

    fn pgettext(&self, _context: &str, message: &str) -> String {
        message.to_string()
    }

    fn npgettext(&self, _context: &str, singular: &str, plural: &str, count: i64) -> String {
        self.ngettext(singular, plural, count)
    }
}

/// The default catalog: every lookup passes its message text through
/// unchanged, picking singular/plural by `count` the way an absent catalog
/// would in the Python original.
pub struct NullTranslations;

impl Translations for NullTranslations {}
