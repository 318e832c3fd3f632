//! Filename sanitizer (§4.7): lowercases, replaces anything that isn't
//! alphanumeric/dash/dot/underscore with an underscore, and collapses an
//! empty result to `"unknown"`.

#[must_use]
pub fn sanitize_filename(input: &str) -> String {
    let sanitized: String = input
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' { c } else { '_' })
        .collect();
    if sanitized.is_empty() { "unknown".to_string() } else { sanitized }
}
