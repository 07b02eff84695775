//! Key normalization applied by the record layer before touching the store.

/// Longest key the store accepts after sanitization.
pub const MAX_KEY_LEN: usize = 250;

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Normalize an arbitrary string into a storage key.
///
/// Characters outside `[a-zA-Z0-9._-]` become `-`, runs of `-` collapse,
/// leading and trailing `-` are trimmed, the result is lower-cased and cut to
/// [`MAX_KEY_LEN`]. Total and idempotent.
pub fn sanitize_key(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_KEY_LEN));
    for c in input.chars() {
        let c = if is_key_char(c) { c.to_ascii_lowercase() } else { '-' };
        if c == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(c);
    }
    // every char is ASCII here, so byte truncation lands on a boundary
    out.truncate(MAX_KEY_LEN);
    out.trim_end_matches('-').to_string()
}
