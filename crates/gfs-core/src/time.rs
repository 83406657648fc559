//! Millisecond-since-epoch timestamp helpers shared by the catalog and
//! replication layers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, for `*_time` columns.
pub fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64
}

/// Convert a `SystemTime` (e.g. from `fs::Metadata`) to millis since epoch.
pub fn system_time_to_ms(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}
