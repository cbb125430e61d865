/// Map a raw column label to its canonical snake_case form.
///
/// Trims, lowercases, turns space, `-`, `/` and `:` into `_` and drops `'`, `(` and `)`.
/// The result is trimmed again so that normalizing twice is a no-op.
pub fn normalize_column(raw: &str) -> String {
    let mapped: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' | '-' | '/' | ':' => Some('_'),
            '\'' | '(' | ')' => None,
            other => Some(other),
        })
        .collect();
    mapped.trim().to_string()
}

/// Normalize every label, preserving positional order.
pub fn normalize_header<'a, I>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    labels.into_iter().map(normalize_column).collect()
}
