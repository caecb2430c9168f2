use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Expiry deadlines are absolute and persist across restarts (they are
/// written into snapshots), so this must be wall-clock time rather than a
/// process-local monotonic reading.
pub fn mstime() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        // Clock set before 1970; treat as epoch so deadlines still compare.
        Err(_) => 0,
    }
}
