use std::time::Duration;

use lorekeep_core::PersistenceError;

pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// How often the manager asks its trigger whether to run.
    pub poll_interval: Duration,
    /// Interval used for the time-based trigger built at startup.
    pub sync_interval: Duration,
    /// Messages transferred per round trip.
    pub page_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            sync_interval: Duration::from_secs(5 * 60),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), PersistenceError> {
        if self.poll_interval.is_zero() {
            return Err(PersistenceError::InvalidConfig(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.sync_interval.is_zero() {
            return Err(PersistenceError::InvalidConfig(
                "sync_interval must be greater than zero".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(PersistenceError::InvalidConfig(
                "page_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
