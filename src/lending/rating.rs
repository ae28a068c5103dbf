//! Rating aggregation for books.
//!
//! Pure computation, no I/O: the average of a book's returned-loan scores,
//! rounded to 2 decimal places. "No ratings yet" is `None` — the legacy `-1`
//! sentinel is a wire-format concern and lives in [`UNRATED_SENTINEL`].

use crate::models::Score;

/// Wire-format value standing in for "this book has never been rated".
///
/// Only DTO serialization should reach for this; domain code works with
/// `Option<f64>`.
pub const UNRATED_SENTINEL: f64 = -1.0;

/// Round to 2 decimal places, half away from zero.
///
/// Scores are non-negative, so this is round-half-up over the whole input
/// domain.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute the aggregate rating from a set of returned-loan scores.
///
/// Returns `None` for an empty set, otherwise the arithmetic mean rounded via
/// [`round2`].
pub fn average_score(scores: &[Score]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    let sum: f64 = scores.iter().map(|s| s.value()).sum();
    Some(round2(sum / scores.len() as f64))
}

/// Render an aggregate rating for the wire, mapping `None` to the sentinel.
pub fn to_wire(rating: Option<f64>) -> f64 {
    rating.unwrap_or(UNRATED_SENTINEL)
}
