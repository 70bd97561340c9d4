//! Wire timestamps
//!
//! The agent sends times as one floating-point "seconds since the epoch"
//! value. Decoding splits it into whole seconds and nanoseconds; encoding
//! recombines them as `seconds + nanoseconds / 1e9`.

use chrono::{DateTime, Utc};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert fractional epoch seconds to a UTC timestamp
pub fn float_to_time(unix: f64) -> DateTime<Utc> {
    if !unix.is_finite() {
        return DateTime::<Utc>::default();
    }
    let whole = unix.trunc();
    let mut seconds = whole as i64;
    let mut nanos = ((unix - whole) * 1e9).round() as i64;
    if nanos < 0 {
        seconds -= 1;
        nanos += NANOS_PER_SECOND;
    } else if nanos >= NANOS_PER_SECOND {
        seconds += 1;
        nanos -= NANOS_PER_SECOND;
    }
    DateTime::from_timestamp(seconds, nanos as u32).unwrap_or_default()
}

/// Convert a UTC timestamp to fractional epoch seconds
pub fn time_to_float(time: DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) / 1e9
}

/// Serde adapter for fields carried as float seconds on the wire
pub mod float_seconds {
    use super::{float_to_time, time_to_float};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as float seconds
    pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(time_to_float(*time))
    }

    /// Deserialize from float seconds
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        f64::deserialize(deserializer).map(float_to_time)
    }
}
