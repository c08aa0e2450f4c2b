//! Compile-time constants shared across the frame codec, extractor, link
//! proxy, supervisor, and heartbeat emitter.
//!
//! Grouped by domain, matching the wire format and timing tables in the
//! protocol write-up.

use std::time::Duration;

// ============================================================================
// Wire format
// ============================================================================

/// Start-of-frame byte. Repeated `SOF_EOF_RUN` times to open a frame.
pub const SOF: u8 = 0x05;

/// End-of-frame byte. Repeated `SOF_EOF_RUN` times to close a frame.
pub const EOF: u8 = 0x00;

/// Escape byte. A literal `SOF`, `EOF`, or `DLE` inside the escaped region
/// is replaced by `DLE` followed by the literal byte.
pub const DLE: u8 = 0x10;

/// Length of the SOF and EOF runs, in bytes.
pub const SOF_EOF_RUN: usize = 3;

/// Protocol version carried in every frame header.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// The only currently-defined frame type. All other values are reserved
/// and must be dropped by the extractor rather than surfaced as user bytes.
pub const FRAME_TYPE_HEARTBEAT: u8 = 0x01;

/// Upper bound on a frame's payload length (the `length` field is a single
/// byte).
pub const MAX_PAYLOAD: usize = 255;

// ============================================================================
// Extractor
// ============================================================================

/// Hard cap on the extractor's internal buffer. Independent of
/// `MAX_PAYLOAD`: this is the safety cap that bounds memory under a
/// garbled or hostile stream, not a property of well-formed frames.
pub const MAX_FRAME_BUFFER_SIZE: usize = 64;

// ============================================================================
// Liveness timing
// ============================================================================

/// How often the terminal-side emitter sends a heartbeat frame.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How long the proxy side waits without a valid heartbeat before
/// declaring a link down.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(15);

/// Multiplier applied to a link's per-character transmission time when
/// deriving its extractor idle-timeout (`FILTER_TIMEOUT`).
pub const FILTER_TIMEOUT_SAFETY: u32 = 3;

/// Bits per character at 8-N-1 framing (8 data bits + start + stop).
pub const BITS_PER_CHAR: f64 = 10.0;

/// Derives the per-link extractor idle-timeout from the configured baud
/// rate: a buffered partial frame is released to the user stream only
/// after it could not possibly have completed at line rate.
#[must_use]
pub fn filter_timeout(baud: u32) -> Duration {
    let char_time_secs = BITS_PER_CHAR / f64(baud);
    let secs = char_time_secs * MAX_FRAME_BUFFER_SIZE as f64 * f64(FILTER_TIMEOUT_SAFETY);
    Duration::from_secs_f64(secs)
}

#[allow(
    clippy::cast_precision_loss,
    reason = "baud rates and small multipliers never approach f64's precision limit"
)]
fn f64(v: u32) -> f64 {
    v as f64
}

// ============================================================================
// Store schema
// ============================================================================

/// Configuration table holding per-link `baud_rate` (and the `oper_state`/
/// `last_state_change` fields the proxy writes back onto the same key).
pub const CONSOLE_PORT_TABLE: &str = "CONSOLE_PORT";

/// Key pattern the supervisor subscribes to for link configuration changes.
pub const CONSOLE_PORT_PATTERN: &str = "CONSOLE_PORT|*";

/// Feature-flag key on the proxy side.
pub const CONSOLE_SWITCH_KEY_PROXY: &str = "CONSOLE_SWITCH|console_mgmt";

/// Feature-flag key on the terminal side.
pub const CONSOLE_SWITCH_KEY_EMITTER: &str = "CONSOLE_SWITCH|controlled_device";

/// Key pattern the supervisor subscribes to for feature-flag changes.
pub const CONSOLE_SWITCH_PATTERN: &str = "CONSOLE_SWITCH|*";

/// Prefix a link's serial device path is derived from: the device itself
/// is never stored, only `link_id` is — `device = "{DEVICE_PREFIX}{link_id}"`.
pub const DEVICE_PREFIX: &str = "/dev/C0-";

/// Baud rate assumed for a link whose `CONSOLE_PORT|<link_id>` hash has no
/// `baud_rate` field.
pub const DEFAULT_BAUD: u32 = 9600;

/// The single field name carrying the feature flag's value.
pub const FEATURE_FLAG_FIELD: &str = "enabled";

/// The value of `FEATURE_FLAG_FIELD` that enables the subsystem.
pub const FEATURE_FLAG_ENABLED: &str = "yes";

// ============================================================================
// Filesystem
// ============================================================================

/// Default symlink prefix, used when the platform prefix file is absent
/// or unreadable.
pub const DEFAULT_SYMLINK_PREFIX: &str = "/dev/VC0-";

/// Platform file whose first line contributes to the resolved symlink
/// prefix.
pub const UDEV_PREFIX_FILE: &str = "/usr/share/sonic/hwsku/udevprefix.conf";

// ============================================================================
// Environment variables
// ============================================================================

/// Enables verbose/binary-payload logging independent of `-v`/`--verbose`.
pub const VERBOSE_ENV_VAR: &str = "CONSOLE_MONITOR_VERBOSE";

/// Overrides the store connection URL.
pub const REDIS_URL_ENV_VAR: &str = "CONSOLE_MONITOR_REDIS_URL";

/// Default store connection URL (Unix socket, the standard local Redis
/// deployment path).
pub const DEFAULT_REDIS_URL: &str = "unix:///var/run/redis/redis.sock";

/// Overrides the configuration database index (default: 4, SONiC's
/// `CONFIG_DB`).
pub const CONFIG_DB_ENV_VAR: &str = "CONSOLE_MONITOR_CONFIG_DB";

/// Overrides the state database index (default: 6, SONiC's `STATE_DB`).
pub const STATE_DB_ENV_VAR: &str = "CONSOLE_MONITOR_STATE_DB";

/// Default configuration database index.
pub const DEFAULT_CONFIG_DB: u8 = 4;

/// Default state database index.
pub const DEFAULT_STATE_DB: u8 = 6;
