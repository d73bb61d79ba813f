//! Verification windows and code shapes.

use std::time::Duration as StdDuration;
use time::Duration;

const DEFAULT_CODE_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_ACTION_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_STORE_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_CODE_LENGTH: usize = 6;
const DEFAULT_CORRELATION_LENGTH: usize = 4;
const DEFAULT_MAX_CODE_ATTEMPTS: u32 = 5;

const CODE_LENGTH_MIN: usize = 4;
const CODE_LENGTH_MAX: usize = 12;
const CORRELATION_LENGTH_MIN: usize = 2;
const CORRELATION_LENGTH_MAX: usize = 16;

#[derive(Clone, Copy, Debug)]
pub struct VerificationConfig {
    code_ttl_seconds: i64,
    action_ttl_seconds: i64,
    session_ttl_seconds: i64,
    store_timeout_seconds: u64,
    code_length: usize,
    correlation_length: usize,
    max_code_attempts: u32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl VerificationConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            code_ttl_seconds: DEFAULT_CODE_TTL_SECONDS,
            action_ttl_seconds: DEFAULT_ACTION_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            store_timeout_seconds: DEFAULT_STORE_TIMEOUT_SECONDS,
            code_length: DEFAULT_CODE_LENGTH,
            correlation_length: DEFAULT_CORRELATION_LENGTH,
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
        }
    }

    #[must_use]
    pub const fn with_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_ttl_seconds = at_least_one(seconds);
        self
    }

    #[must_use]
    pub const fn with_action_ttl_seconds(mut self, seconds: i64) -> Self {
        self.action_ttl_seconds = at_least_one(seconds);
        self
    }

    #[must_use]
    pub const fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = at_least_one(seconds);
        self
    }

    #[must_use]
    pub const fn with_store_timeout_seconds(mut self, seconds: u64) -> Self {
        self.store_timeout_seconds = if seconds == 0 { 1 } else { seconds };
        self
    }

    #[must_use]
    pub const fn with_code_length(mut self, length: usize) -> Self {
        self.code_length = clamp(length, CODE_LENGTH_MIN, CODE_LENGTH_MAX);
        self
    }

    #[must_use]
    pub const fn with_correlation_length(mut self, length: usize) -> Self {
        self.correlation_length = clamp(length, CORRELATION_LENGTH_MIN, CORRELATION_LENGTH_MAX);
        self
    }

    #[must_use]
    pub const fn with_max_code_attempts(mut self, attempts: u32) -> Self {
        self.max_code_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    /// How long a selected channel's code stays confirmable.
    #[must_use]
    pub const fn code_window(&self) -> Duration {
        Duration::seconds(self.code_ttl_seconds)
    }

    /// How long an action token stays usable after confirmation.
    #[must_use]
    pub const fn action_window(&self) -> Duration {
        Duration::seconds(self.action_ttl_seconds)
    }

    #[must_use]
    pub const fn session_window(&self) -> Duration {
        Duration::seconds(self.session_ttl_seconds)
    }

    #[must_use]
    pub const fn store_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.store_timeout_seconds)
    }

    #[must_use]
    pub const fn code_length(&self) -> usize {
        self.code_length
    }

    #[must_use]
    pub const fn correlation_length(&self) -> usize {
        self.correlation_length
    }

    /// Wrong codes a reference tolerates before it is revoked.
    #[must_use]
    pub const fn max_code_attempts(&self) -> u32 {
        self.max_code_attempts
    }
}

const fn at_least_one(seconds: i64) -> i64 {
    if seconds < 1 {
        1
    } else {
        seconds
    }
}

const fn clamp(value: usize, min: usize, max: usize) -> usize {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}
