//! Collision-resistant trace identity.
//!
//! Trace ids are derived from a microsecond UTC clock reading. Two calls in
//! the same microsecond would collide, so the last issued reading is kept in
//! a process-wide atomic and bumped forward when the clock has not moved.
//! Ids minted by one process are therefore strictly increasing.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

use ace_contracts::agent::TraceId;

static LAST_ISSUED_MICROS: AtomicI64 = AtomicI64::new(0);

/// Mint a fresh trace id and the timestamp it encodes.
pub fn mint_trace_id() -> (TraceId, DateTime<Utc>) {
    let now = Utc::now().timestamp_micros();
    let mut previous = LAST_ISSUED_MICROS.load(Ordering::SeqCst);
    loop {
        let next = if now > previous { now } else { previous + 1 };
        match LAST_ISSUED_MICROS.compare_exchange(previous, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => {
                let timestamp = DateTime::<Utc>::from_timestamp_micros(next).unwrap_or_else(Utc::now);
                return (format_trace_id(&timestamp), timestamp);
            }
            Err(actual) => previous = actual,
        }
    }
}

/// `trace_YYYYMMDD_HHMMSS_ffffff` for the given instant.
pub fn format_trace_id(timestamp: &DateTime<Utc>) -> TraceId {
    TraceId(format!("trace_{}", timestamp.format("%Y%m%d_%H%M%S_%6f")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn minted_ids_are_pairwise_distinct_in_a_tight_loop() {
        let ids: Vec<TraceId> = (0..2_000).map(|_| mint_trace_id().0).collect();
        let unique: HashSet<&TraceId> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn minted_ids_are_strictly_increasing() {
        let first = mint_trace_id().0;
        let second = mint_trace_id().0;
        assert!(second > first, "{second} should sort after {first}");
    }

    #[test]
    fn id_encodes_its_own_partition_date() {
        let (id, timestamp) = mint_trace_id();
        assert_eq!(id.date_hint(), Some(timestamp.format("%Y-%m-%d").to_string()));
        assert_eq!(id.as_str().len(), "trace_20261019_143022_123456".len());
    }
}
