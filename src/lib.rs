//! Byte-level serial console proxy: frame extraction, per-link pty relay,
//! and liveness supervision driven off a Redis-compatible config/state
//! store.

pub mod config;
pub mod constants;
pub mod env;
pub mod frame;
pub mod heartbeat_emitter;
pub mod link;
pub mod pty;
pub mod serial;
pub mod store;
pub mod supervisor;
