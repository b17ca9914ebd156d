//! Text normalization shared by vocabulary building and encoding.
//!
//! Both sides of the similarity computation must see exactly the same
//! tokens, so every consumer goes through [`normalize`] and [`tokens`].

/// Lowercase `text`, turn every character that is not alphanumeric, `_` or
/// whitespace into a separator, and collapse separator runs into a single
/// space. The result has no leading or trailing space.
///
/// ```rust
/// use rolesearch_core::text::normalize;
///
/// assert_eq!(normalize("  Nghỉ-phép,  NĂM 2024! "), "nghỉ phép năm 2024");
/// ```
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() || ch == '_' {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }

    out
}

/// Split already-normalized text into tokens.
pub fn tokens(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split(' ').filter(|t| !t.is_empty())
}
