//! Normalizes operator-typed FIX text into a wire-ready message.
//!
//! Operators paste messages with `|` as the delimiter, sometimes wrapped in
//! double quotes, often with a stale or missing checksum.  [`sanitize`] fixes all three.

use crate::message::{checksum, SOH};

const CHECKSUM_MARKER: &str = "\u{1}10=";

/// Rewrite `raw` into SOH-delimited form ending in a freshly computed
/// `10=nnn` field.
///
/// Any existing checksum field is discarded along with everything after
/// it.  A message whose body contains a literal `<SOH>10=` elsewhere is
/// truncated at the last such occurrence.
pub fn sanitize(raw: &str) -> String {
    let mut msg = raw.replace('|', "\u{1}");

    if let Some(inner) = strip_quotes(&msg) {
        msg = inner.to_owned();
    }

    if !msg.ends_with(SOH) {
        msg.push(SOH);
    }

    if let Some(idx) = msg.rfind(CHECKSUM_MARKER) {
        msg.truncate(idx + 1);
    } else if msg.starts_with("10=") {
        msg.clear();
    }

    let sum = checksum(msg.as_bytes());
    msg.push_str(&format!("10={sum:03}"));
    msg.push(SOH);
    msg
}

fn strip_quotes(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    if bytes.len() < 2 {
        return None;
    }
    let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
    if first == b'"' && last == b'"' {
        Some(&s[1..s.len() - 1])
    } else {
        None
    }
}
