//! Unicode normalisation of reading text.
//!
//! Two readings are "strictly identical" only when their texts agree after
//! canonical composition (NFC). Precomposed and decomposed spellings of the
//! same letter (`é` as U+00E9 or as `e` + U+0301) therefore compare equal,
//! while compatibility variants (ligatures, full-width forms) stay distinct.
//!
//! ```text
//! comparison_key(text) = NFC(text)
//! ```
//!
//! Whitespace and case are left alone; an importer that wants looser
//! matching records a `normal_form` on the reading instead.

use std::borrow::Cow;

use unicode_normalization::{is_nfc, UnicodeNormalization};

/// Compose `text` into NFC.
///
/// Borrows when the input is already composed, which is the common case for
/// imported transcriptions.
///
/// ```rust
/// use collation_graph::normalize::normalize_text;
///
/// assert_eq!(normalize_text("e\u{301}te\u{301}"), "été");
/// ```
pub fn normalize_text(text: &str) -> Cow<'_, str> {
    if is_nfc(text) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.nfc().collect())
    }
}

/// Owned comparison key for grouping readings.
pub fn comparison_key(text: &str) -> String {
    normalize_text(text).into_owned()
}
