mod model;
mod store;

pub use model::{PackageState, SavedState, StateDelta};
pub use store::{upgrade_legacy, StateStore, LEGACY_STATE_FILE, STATE_FILE};

use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

pub fn unix_timestamp_of(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests;
