//! Minimal XML tree builder used to produce notice documents.
//!
//! This crate provides:
//! - [`XmlDocument`] / [`XmlBuilder`] — tag/attribute/nested-closure construction
//! - [`XmlValue`] — coercion of element values to text
//! - [`sanitize_xml_text`] — removal of characters XML 1.0 cannot carry
//!
//! Serialization never fails: content is escaped and any character outside
//! the XML 1.0 `Char` production is replaced, so free-text error messages
//! always yield well-formed output.

mod builder;
mod value;

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

pub use builder::{NO_ATTRIBUTES, XmlBuilder, XmlDocument};
pub use value::XmlValue;

/// Replace each run of characters outside `#x9 | #xA | #xD | [#x20-#xD7FF] |
/// [#xE000-#xFFFD]` with a single space.
pub fn sanitize_xml_text(input: &str) -> Cow<'_, str> {
    static INVALID_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"[^\x{0009}\x{000A}\x{000D}\x{0020}-\x{D7FF}\x{E000}-\x{FFFD}]+")
            .expect("valid regex")
    });

    INVALID_RE.replace_all(input, " ")
}
