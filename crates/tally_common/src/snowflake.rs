//! Snowflake-style id <-> timestamp mapping.
//!
//! Event ids embed a millisecond timestamp in their high 42 bits,
//! offset from a platform epoch. All time windowing is expressed as
//! `id >= boundary` range scans, so this mapping is a bit-exact
//! contract: `timestamp_ms = (id >> 22) + epoch_ms` and its inverse.
//! The low 22 bits are worker/sequence noise and are dropped when a
//! boundary is synthesized, which quantizes to the id's ms bucket.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Default id epoch (ms since the unix epoch).
pub const DEFAULT_EPOCH_MS: u64 = 1_420_070_400_000;

/// Bits below the embedded timestamp.
pub const TIMESTAMP_SHIFT: u32 = 22;

/// Decode the millisecond unix timestamp embedded in an id.
pub fn id_to_timestamp_ms(id: u64, epoch_ms: u64) -> u64 {
    (id >> TIMESTAMP_SHIFT) + epoch_ms
}

/// Build the minimal id whose embedded timestamp is `timestamp_ms`.
///
/// Timestamps before the epoch clamp to id 0 (unbounded past).
pub fn timestamp_ms_to_id(timestamp_ms: u64, epoch_ms: u64) -> u64 {
    timestamp_ms.saturating_sub(epoch_ms) << TIMESTAMP_SHIFT
}

/// Decode an id to a UTC instant (ms precision).
pub fn id_to_datetime(id: u64, epoch_ms: u64) -> DateTime<Utc> {
    let ms = id_to_timestamp_ms(id, epoch_ms) as i64;
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// Build the minimal id for a UTC instant.
pub fn datetime_to_id(at: DateTime<Utc>, epoch_ms: u64) -> u64 {
    let ms = at.timestamp_millis().max(0) as u64;
    timestamp_ms_to_id(ms, epoch_ms)
}

/// UTC calendar day an id falls on.
pub fn id_to_utc_date(id: u64, epoch_ms: u64) -> NaiveDate {
    id_to_datetime(id, epoch_ms).date_naive()
}
