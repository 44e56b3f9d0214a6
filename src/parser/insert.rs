// INSERT row estimation.
// We intentionally keep this textual (no value-literal parsing) so huge
// extended INSERT lines cost one regex match and one substring count.

use once_cell::sync::Lazy;
use regex::Regex;

// Greedy: spans from the first "VALUES (" to the last ')' on the line.
static VALUES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)VALUES\s*\((.*)\)").expect("valid values regex"));

const TUPLE_SEPARATOR: &str = "),(";

/// Estimate how many value tuples a single-line INSERT carries.
///
/// Counts `),(` separators inside the VALUES list and adds one. Statements
/// without a VALUES list on this line (for example INSERT ... SELECT, or an
/// INSERT split over several lines) count as one row. A string literal that
/// contains `),(` over-counts.
pub fn estimate_rows(statement: &str) -> u64 {
    match VALUES_RE.captures(statement).and_then(|cap| cap.get(1)) {
        Some(values) => values.as_str().matches(TUPLE_SEPARATOR).count() as u64 + 1,
        None => 1,
    }
}
