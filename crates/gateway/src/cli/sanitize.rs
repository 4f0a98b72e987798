use fr_protocol::{sanitize, SOH};

/// Sanitized form of `raw` with SOH rendered as `|` for terminals.
pub fn render(raw: &str) -> String {
    sanitize(raw).replace(SOH, "|")
}
