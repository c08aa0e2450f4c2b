//! Terminal-side heartbeat emitter (C6, the DTE): reads which serial
//! device to emit on, then sends a heartbeat frame every
//! [`HEARTBEAT_INTERVAL`] while the feature flag is enabled.

use crate::constants::{
    CONSOLE_SWITCH_KEY_EMITTER, FEATURE_FLAG_ENABLED, FEATURE_FLAG_FIELD, FRAME_TYPE_HEARTBEAT,
    HEARTBEAT_INTERVAL,
};
use crate::frame::{build, Frame};
use crate::serial;
use crate::store::{split_table_key, Store};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_BAUD: u32 = 9600;
const CMDLINE_PATH: &str = "/proc/cmdline";

/// Resolves the serial device and baud rate to emit on. CLI arguments
/// take precedence over `console=` on the kernel command line; when
/// neither source names a baud, 9600 is assumed.
pub fn resolve_console(
    cli_tty: Option<&str>,
    cli_baud: Option<u32>,
) -> anyhow::Result<(String, u32)> {
    if let Some(tty) = cli_tty {
        return Ok((tty.to_string(), cli_baud.unwrap_or(DEFAULT_BAUD)));
    }

    let cmdline = std::fs::read_to_string(CMDLINE_PATH).unwrap_or_default();
    match parse_cmdline_console(&cmdline) {
        Some((tty, baud)) => Ok((tty, baud.unwrap_or(DEFAULT_BAUD))),
        None => anyhow::bail!("no console device given on the command line and none on {CMDLINE_PATH}"),
    }
}

/// Parses the last `console=<name>[,<baud>]` token out of a kernel
/// command line. Later occurrences win, matching how the kernel itself
/// treats repeated `console=` arguments.
fn parse_cmdline_console(cmdline: &str) -> Option<(String, Option<u32>)> {
    cmdline
        .split_whitespace()
        .filter_map(|tok| tok.strip_prefix("console="))
        .last()
        .map(|value| match value.split_once(',') {
            Some((name, baud)) => (name.to_string(), baud.parse().ok()),
            None => (value.to_string(), None),
        })
}

/// Whether the feature flag's stored value means "emit heartbeats".
#[must_use]
pub fn flag_enabled(value: Option<&str>) -> bool {
    value == Some(FEATURE_FLAG_ENABLED)
}

/// Builds the device path to open for a bare tty name, e.g. `"ttyS0"` →
/// `/dev/ttyS0`. Both the CLI positional and `console=` on the kernel
/// command line give a bare name, never a full path.
#[must_use]
pub fn device_path(tty_name: &str) -> PathBuf {
    PathBuf::from(format!("/dev/{tty_name}"))
}

/// Owns the open serial device and the running sequence number.
pub struct HeartbeatEmitter {
    serial: File,
    seq: u8,
}

impl std::fmt::Debug for HeartbeatEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatEmitter")
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl HeartbeatEmitter {
    /// Opens and configures the serial device to emit on.
    pub fn open(device_path: &Path, baud: u32) -> anyhow::Result<Self> {
        let serial = serial::open_serial_device(device_path, baud)?;
        Ok(Self { serial, seq: 0 })
    }

    /// Builds and writes one heartbeat frame, then advances the sequence
    /// number mod 256.
    pub fn send_heartbeat(&mut self) -> std::io::Result<()> {
        let frame = Frame::new(self.seq, 0, FRAME_TYPE_HEARTBEAT, Vec::new());
        let bytes = build(&frame);
        self.seq = self.seq.wrapping_add(1);
        self.serial.write_all(&bytes)
    }

    /// Runs the heartbeat loop until `shutdown` is set: reads the feature
    /// flag at startup and on every key-space notification, emitting a
    /// heartbeat every [`HEARTBEAT_INTERVAL`] while it is enabled.
    pub fn run(&mut self, store: &mut dyn Store, shutdown: &Arc<AtomicBool>) -> anyhow::Result<()> {
        let (table, key) =
            split_table_key(CONSOLE_SWITCH_KEY_EMITTER, "|").unwrap_or(("CONSOLE_SWITCH", ""));

        let mut enabled = flag_enabled(
            store
                .hget(table, key, FEATURE_FLAG_FIELD)
                .unwrap_or(None)
                .as_deref(),
        );
        let mut last_sent = Instant::now() - HEARTBEAT_INTERVAL;

        while !shutdown.load(Ordering::Relaxed) {
            if let Ok(Some(_event)) = store.next_event(Duration::from_millis(200)) {
                enabled = flag_enabled(
                    store
                        .hget(table, key, FEATURE_FLAG_FIELD)
                        .unwrap_or(None)
                        .as_deref(),
                );
            }

            let now = Instant::now();
            if enabled && now.duration_since(last_sent) >= HEARTBEAT_INTERVAL {
                if let Err(e) = self.send_heartbeat() {
                    log::warn!("heartbeat emitter: write failed: {e}");
                }
                last_sent = now;
            }
        }
        Ok(())
    }
}
