use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Last timestamp handed out, in micros since the epoch.
static LAST_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Process-wide event clock.
///
/// Returns wall-clock UTC truncated to microseconds, bumped by 1µs whenever the
/// wall clock did not advance (or went backwards) since the previous call.
/// Successive calls from any thread are therefore strictly increasing, and the
/// value survives an RFC 3339 round trip unchanged.
pub fn next_event_timestamp() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut last = LAST_MICROS.load(Ordering::Relaxed);
    loop {
        let candidate = if now > last { now } else { last.saturating_add(1) };
        match LAST_MICROS.compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => {
                return DateTime::from_timestamp_micros(candidate).unwrap_or_else(Utc::now);
            }
            Err(observed) => last = observed,
        }
    }
}
