//! Reactor configuration.
//!
//! All capacities are fixed at construction time and never resized while
//! the reactor runs.

use std::str::FromStr;

/// Default simultaneous-timer bound. Exceeding it at runtime is a
/// configuration error, not a recoverable failure.
pub const DEFAULT_MAX_TIMERS: usize = 64;

/// Default message ring capacity.
pub const DEFAULT_MSG_CAPACITY: usize = 256;

/// Default number of messages drained per loop iteration.
pub const DEFAULT_DRAIN_BATCH: usize = 8;

/// Configuration for the reactor loop and its queues.
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Maximum simultaneous timers in the schedule pool.
    pub max_timers: usize,

    /// Message ring capacity.
    pub msg_capacity: usize,

    /// Messages dispatched per loop iteration before I/O is serviced again.
    pub drain_batch: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            max_timers: DEFAULT_MAX_TIMERS,
            msg_capacity: DEFAULT_MSG_CAPACITY,
            drain_batch: DEFAULT_DRAIN_BATCH,
        }
    }
}

impl ReactorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `MLOOP_MAX_TIMERS`, `MLOOP_MSG_CAPACITY`
    /// and `MLOOP_DRAIN_BATCH` where set.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_timers: env_get("MLOOP_MAX_TIMERS", d.max_timers),
            msg_capacity: env_get("MLOOP_MSG_CAPACITY", d.msg_capacity),
            drain_batch: env_get("MLOOP_DRAIN_BATCH", d.drain_batch),
        }
    }

    /// Set the timer pool capacity.
    pub fn max_timers(mut self, n: usize) -> Self {
        self.max_timers = n;
        self
    }

    /// Set the message ring capacity.
    pub fn msg_capacity(mut self, n: usize) -> Self {
        self.msg_capacity = n;
        self
    }

    /// Set the per-iteration message drain batch.
    pub fn drain_batch(mut self, n: usize) -> Self {
        self.drain_batch = n;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_timers == 0 {
            return Err("max_timers must be at least 1");
        }
        if self.msg_capacity == 0 {
            return Err("msg_capacity must be at least 1");
        }
        if self.drain_batch == 0 {
            return Err("drain_batch must be at least 1");
        }
        Ok(())
    }
}

/// Get an environment variable parsed as `T`, or the default.
#[inline]
pub fn env_get<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Get an environment variable as a boolean ("1", "true", "yes", "on").
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        assert!(ReactorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let cfg = ReactorConfig::new().max_timers(8).msg_capacity(16).drain_batch(2);
        assert_eq!(cfg.max_timers, 8);
        assert_eq!(cfg.msg_capacity, 16);
        assert_eq!(cfg.drain_batch, 2);
    }

    #[test]
    fn test_zero_rejected() {
        assert!(ReactorConfig::new().max_timers(0).validate().is_err());
        assert!(ReactorConfig::new().msg_capacity(0).validate().is_err());
        assert!(ReactorConfig::new().drain_batch(0).validate().is_err());
    }

    #[test]
    fn test_env_get_fallback() {
        let v: usize = env_get("MLOOP_TEST_UNSET_VARIABLE", 7);
        assert_eq!(v, 7);
    }
}
