//! CLI argument definitions and env-var resolution for both binaries.

use crate::constants::{
    CONFIG_DB_ENV_VAR, DEFAULT_CONFIG_DB, DEFAULT_REDIS_URL, DEFAULT_STATE_DB, REDIS_URL_ENV_VAR,
    STATE_DB_ENV_VAR,
};
use clap::Parser;

/// `console-monitor`: the supervisor that reconciles link proxies against
/// the configuration store.
#[derive(Debug, Parser)]
#[command(name = "console-monitor", about = "Serial console proxy supervisor")]
pub struct SupervisorArgs {
    /// Enables verbose/binary-payload logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// `console-heartbeat`: the terminal-side heartbeat emitter (DTE).
#[derive(Debug, Parser)]
#[command(name = "console-heartbeat", about = "Serial console heartbeat emitter")]
pub struct EmitterArgs {
    /// Serial device to emit heartbeats on. Falls back to `console=` on
    /// `/proc/cmdline` when omitted.
    pub tty_name: Option<String>,

    /// Baud rate. Falls back to `console=<tty>,<baud>` on `/proc/cmdline`,
    /// then 9600.
    pub baud: Option<u32>,

    /// Enables verbose/binary-payload logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Store connection parameters resolved from environment variables, with
/// compiled-in defaults.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Connection URL passed to the store client.
    pub redis_url: String,
    /// Database index holding `CONSOLE_PORT`/`CONSOLE_SWITCH` configuration.
    pub config_db: u8,
    /// Database index the proxy writes `oper_state`/`last_state_change` to.
    pub state_db: u8,
}

impl StoreConfig {
    /// Resolves store configuration from the environment, falling back to
    /// compiled-in defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let redis_url =
            std::env::var(REDIS_URL_ENV_VAR).unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());
        let config_db = std::env::var(CONFIG_DB_ENV_VAR)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CONFIG_DB);
        let state_db = std::env::var(STATE_DB_ENV_VAR)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_STATE_DB);
        Self {
            redis_url,
            config_db,
            state_db,
        }
    }
}
