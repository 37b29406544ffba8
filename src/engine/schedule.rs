use chrono::{DateTime, Duration, Utc};

/// Advances a feed's next refresh time past `now`.
///
/// The prior time is stepped forward by whole multiples of
/// `interval_seconds` until it strictly exceeds `now`; a candidate equal to
/// `now` is rejected. Steps are flat offsets even for the month/year units
/// (30 and 365 days), not calendar arithmetic. A prior time already beyond
/// `now` is returned unchanged.
///
/// `interval_seconds` must be positive; the definition parser guarantees
/// this, and it is what makes the loop terminate.
pub fn advance(
    prior: DateTime<Utc>,
    interval_seconds: i64,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    debug_assert!(interval_seconds > 0);
    let step = Duration::seconds(interval_seconds);
    let mut next = prior;
    while next <= now {
        next += step;
    }
    next
}
