//! Runtime environment detection.
//!
//! Provides a single source of truth for whether the process is running
//! under a test harness, based on the `CONSOLE_MONITOR_ENV` environment
//! variable.
//!
//! # Usage
//!
//! ```rust
//! use console_monitor::env::is_test_mode;
//!
//! if is_test_mode() {
//!     // shorten intervals, skip real store connections, etc.
//! }
//! ```

use crate::constants::VERBOSE_ENV_VAR;

/// Runtime environment for either binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Normal operation.
    Production,
    /// Test environment — shortens timers, skips real store connections.
    Test,
}

impl Environment {
    /// Detect current environment from `CONSOLE_MONITOR_ENV`.
    #[must_use]
    pub fn current() -> Self {
        match std::env::var("CONSOLE_MONITOR_ENV").as_deref() {
            Ok("test") => Self::Test,
            _ => Self::Production,
        }
    }

    /// Returns `true` if this is the test environment.
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }
}

/// Convenience function equivalent to `Environment::current().is_test()`.
#[must_use]
pub fn is_test_mode() -> bool {
    Environment::current().is_test()
}

/// Returns `true` if verbose/binary-payload logging is enabled, either via
/// an explicit CLI flag or the `CONSOLE_MONITOR_VERBOSE` environment
/// variable.
#[must_use]
pub fn verbose_enabled(cli_flag: bool) -> bool {
    cli_flag || std::env::var(VERBOSE_ENV_VAR).is_ok_and(|v| v != "0" && !v.is_empty())
}
