//! `console-monitor`: the serial-console proxy supervisor binary.

use clap::Parser;
use console_monitor::config::{StoreConfig, SupervisorArgs};
use console_monitor::env::verbose_enabled;
use console_monitor::store::RedisStore;
use console_monitor::supervisor::Supervisor;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, LazyLock};

static SHUTDOWN_FLAG: LazyLock<Arc<AtomicBool>> = LazyLock::new(|| Arc::new(AtomicBool::new(false)));

fn main() -> ExitCode {
    let args = SupervisorArgs::parse();

    let verbose = verbose_enabled(args.verbose);
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    for sig in [SIGINT, SIGTERM, SIGHUP] {
        if let Err(e) = signal_hook::flag::register(sig, Arc::clone(&SHUTDOWN_FLAG)) {
            log::error!("failed to register signal handler for {sig}: {e}");
            return ExitCode::FAILURE;
        }
    }

    let store_config = StoreConfig::from_env();
    let mut config_store =
        match RedisStore::connect(&store_config.redis_url, store_config.config_db, "|") {
            Ok(s) => s,
            Err(e) => {
                log::error!("failed to connect to config store at {}: {e}", store_config.redis_url);
                return ExitCode::FAILURE;
            }
        };
    let mut state_store =
        match RedisStore::connect(&store_config.redis_url, store_config.state_db, "|") {
            Ok(s) => s,
            Err(e) => {
                log::error!("failed to connect to state store at {}: {e}", store_config.redis_url);
                return ExitCode::FAILURE;
            }
        };

    let mut supervisor = Supervisor::new();
    match supervisor.run(&mut config_store, &mut state_store, &SHUTDOWN_FLAG) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("supervisor exited with error: {e}");
            ExitCode::FAILURE
        }
    }
}
