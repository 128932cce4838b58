//! Duration strings for summarize buckets.
//!
//! An interval is an integer count with an optional unit suffix:
//! `"30"` or `"30s"` (seconds), `"1min"`, `"1h"`, `"1d"`, `"1w"`, `"1y"`.

/// Parses an interval string into whole seconds. Returns `None` for an
/// empty count, an unknown suffix, a zero or overflowing result.
pub(crate) fn parse_interval(s: &str) -> Option<i32> {
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    if split == 0 {
        return None;
    }
    let count: i32 = s[..split].parse().ok()?;
    let unit: i32 = match &s[split..] {
        "" | "s" => 1,
        "min" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 604_800,
        "y" => 31_536_000,
        _ => return None,
    };
    let seconds = count.checked_mul(unit)?;
    if seconds < 1 {
        return None;
    }
    Some(seconds)
}
