/// Derive a URL-safe slug: lowercase ASCII letters and digits joined by single dashes.
///
/// Non-ASCII text is transliterated first (`"Café"` becomes `"cafe"`). Whitespace, `-` and `_` separate words, `@` reads as "at", and any other character is
/// dropped without introducing a separator (`"react.js"` becomes `"reactjs"`).
pub fn slugify(input: &str) -> String {
    let ascii = deunicode::deunicode(input);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;
    for ch in ascii.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch == '@' {
            if !slug.is_empty() {
                slug.push('-');
            }
            slug.push_str("at");
            pending_dash = true;
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_dash = true;
        }
    }
    slug
}
