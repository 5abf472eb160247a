//! Tag name normalization.
//!
//! Tags are deduplicated by their normalized name, so `"Foo"`, `"#foo"` and
//! `" FOO "` all resolve to the same tag row.
//!
//! # Pipeline
//!
//! 1. **Unicode NFC normalization** - Consistent character representation
//! 2. **Marker stripping** - Leading `#` characters are dropped
//! 3. **Case folding** - Lowercased
//! 4. **Whitespace normalization** - Runs collapse to a single `_`

use itertools::Itertools;
use unicode_normalization::UnicodeNormalization;

/// Longest tag name kept, in characters.
pub const MAX_TAG_CHARS: usize = 100;

/// Normalize a tag name, returning `None` when nothing meaningful remains.
#[must_use]
pub fn normalize_tag(raw: &str) -> Option<String> {
    let normalized: String = raw.nfc().collect();
    let stripped = normalized.trim().trim_start_matches('#').trim();
    if stripped.is_empty() {
        return None;
    }

    let folded = stripped.to_lowercase();
    let collapsed = folded.split_whitespace().join("_");
    Some(collapsed.chars().take(MAX_TAG_CHARS).collect())
}
