//! `console-heartbeat`: the terminal-side heartbeat emitter binary (DTE).

use clap::Parser;
use console_monitor::config::{EmitterArgs, StoreConfig};
use console_monitor::env::verbose_enabled;
use console_monitor::heartbeat_emitter::{device_path, resolve_console, HeartbeatEmitter};
use console_monitor::store::RedisStore;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, LazyLock};

static SHUTDOWN_FLAG: LazyLock<Arc<AtomicBool>> = LazyLock::new(|| Arc::new(AtomicBool::new(false)));

fn main() -> ExitCode {
    let args = EmitterArgs::parse();

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

    let (tty_name, baud) = match resolve_console(args.tty_name.as_deref(), args.baud) {
        Ok(resolved) => resolved,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let path = device_path(&tty_name);
    let mut emitter = match HeartbeatEmitter::open(&path, baud) {
        Ok(e) => e,
        Err(e) => {
            log::error!("failed to open {} at {baud} baud: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let store_config = StoreConfig::from_env();
    let mut store = match RedisStore::connect(&store_config.redis_url, store_config.config_db, "|") {
        Ok(s) => s,
        Err(e) => {
            log::error!("failed to connect to store at {}: {e}", store_config.redis_url);
            return ExitCode::FAILURE;
        }
    };

    match emitter.run(&mut store, &SHUTDOWN_FLAG) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("heartbeat emitter exited with error: {e}");
            ExitCode::FAILURE
        }
    }
}
