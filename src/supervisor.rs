//! Supervisor (C5): reconciles running [`LinkProxy`] instances against the
//! `CONSOLE_PORT|*` configuration table and the `CONSOLE_SWITCH|*` feature
//! flag, on a single-threaded cooperative event loop.

use crate::constants::{
    CONSOLE_PORT_PATTERN, CONSOLE_PORT_TABLE, CONSOLE_SWITCH_KEY_PROXY, CONSOLE_SWITCH_PATTERN,
    DEFAULT_BAUD, DEVICE_PREFIX, FEATURE_FLAG_FIELD,
};
use crate::link::LinkProxy;
use crate::pty::resolve_symlink_prefix;
use crate::store::{split_table_key, Store};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::collections::{HashMap, HashSet};
use std::os::fd::BorrowedFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A link's desired configuration, as read from `CONSOLE_PORT|<link_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredLink {
    /// The link's identifier (the table key).
    pub link_id: String,
    /// The serial device the proxy should open.
    pub device_path: PathBuf,
    /// The baud rate the proxy should configure.
    pub baud: u32,
}

/// A running proxy's current configuration, used for change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningSnapshot {
    /// The serial device the running proxy was started against.
    pub device_path: PathBuf,
    /// The baud rate the running proxy was started with.
    pub baud: u32,
}

/// The set of link ids to stop and configurations to start to bring the
/// running set in line with the desired set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Link ids to stop, in no particular order.
    pub stop: Vec<String>,
    /// Links to start (or restart), in no particular order.
    pub start: Vec<DesiredLink>,
}

/// Computes the stop/start sets needed to reconcile `running` against
/// `desired`. A link present in both with an unchanged device path and
/// baud is left alone; a link present in both with a changed device path
/// or baud is restarted (present in both `stop` and `start`). When the
/// feature flag is disabled every running link is stopped and nothing is
/// started, regardless of what's desired.
#[must_use]
pub fn plan_reconcile(
    desired: &[DesiredLink],
    running: &HashMap<String, RunningSnapshot>,
    feature_enabled: bool,
) -> ReconcilePlan {
    if !feature_enabled {
        return ReconcilePlan {
            stop: running.keys().cloned().collect(),
            start: Vec::new(),
        };
    }

    let desired_ids: HashSet<&str> = desired.iter().map(|d| d.link_id.as_str()).collect();
    let mut stop: Vec<String> = running
        .keys()
        .filter(|id| !desired_ids.contains(id.as_str()))
        .cloned()
        .collect();
    let mut start = Vec::new();

    for d in desired {
        match running.get(&d.link_id) {
            None => start.push(d.clone()),
            Some(snap) if snap.device_path != d.device_path || snap.baud != d.baud => {
                stop.push(d.link_id.clone());
                start.push(d.clone());
            }
            Some(_) => {}
        }
    }

    ReconcilePlan { stop, start }
}

/// Reads every `CONSOLE_PORT|<link_id>` entry into the desired-state list
/// the reconciler diffs against. `device_path` is never stored — it is
/// derived from `link_id` as `DEVICE_PREFIX{link_id}` — and a missing or
/// unparseable `baud_rate` field defaults to [`DEFAULT_BAUD`].
pub fn read_desired_links(store: &mut dyn Store) -> anyhow::Result<Vec<DesiredLink>> {
    let keys = store.keys(CONSOLE_PORT_PATTERN)?;
    let mut desired = Vec::new();
    for full_key in keys {
        let Some((_table, link_id)) = split_table_key(&full_key, "|") else {
            continue;
        };
        let fields = store.hgetall(CONSOLE_PORT_TABLE, link_id)?;
        let baud = match fields.get("baud_rate") {
            Some(baud_str) => match baud_str.parse() {
                Ok(baud) => baud,
                Err(_) => {
                    log::warn!(
                        "link {link_id}: baud_rate {baud_str:?} is not a number, defaulting to {DEFAULT_BAUD}"
                    );
                    DEFAULT_BAUD
                }
            },
            None => DEFAULT_BAUD,
        };
        desired.push(DesiredLink {
            link_id: link_id.to_string(),
            device_path: PathBuf::from(format!("{DEVICE_PREFIX}{link_id}")),
            baud,
        });
    }
    Ok(desired)
}

/// Reads whether the proxy-side feature flag is enabled.
pub fn feature_enabled(store: &mut dyn Store) -> anyhow::Result<bool> {
    let Some((table, key)) = split_table_key(CONSOLE_SWITCH_KEY_PROXY, "|") else {
        return Ok(false);
    };
    let value = store.hget(table, key, FEATURE_FLAG_FIELD)?;
    Ok(value.as_deref() == Some(crate::constants::FEATURE_FLAG_ENABLED))
}

/// Owns the running link proxies and drives reconciliation.
pub struct Supervisor {
    proxies: HashMap<String, LinkProxy>,
    symlink_prefix: String,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("running_links", &self.proxies.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Creates a supervisor with no running links, resolving the symlink
    /// prefix from the platform config file.
    #[must_use]
    pub fn new() -> Self {
        Self {
            proxies: HashMap::new(),
            symlink_prefix: resolve_symlink_prefix(),
        }
    }

    /// Runs one reconcile pass: reads desired state and the feature flag
    /// from `config_store`, diffs against the running set, and applies
    /// the plan — stopped links have their state fields cleared in
    /// `state_store`.
    pub fn reconcile(
        &mut self,
        config_store: &mut dyn Store,
        state_store: &mut dyn Store,
    ) -> anyhow::Result<()> {
        let desired = read_desired_links(config_store)?;
        let enabled = feature_enabled(config_store)?;
        let running: HashMap<String, RunningSnapshot> = self
            .proxies
            .iter()
            .map(|(id, proxy)| {
                (
                    id.clone(),
                    RunningSnapshot {
                        device_path: proxy.device_path().to_path_buf(),
                        baud: proxy.baud(),
                    },
                )
            })
            .collect();

        let plan = plan_reconcile(&desired, &running, enabled);

        for id in plan.stop {
            if let Some(proxy) = self.proxies.remove(&id) {
                proxy.stop(state_store);
            }
        }

        for link in plan.start {
            match LinkProxy::start(&link.link_id, &link.device_path, link.baud, &self.symlink_prefix) {
                Ok(proxy) => {
                    self.proxies.insert(link.link_id.clone(), proxy);
                }
                Err(e) => log::error!("link {}: failed to start: {e}", link.link_id),
            }
        }

        Ok(())
    }

    /// Runs the supervisor's main loop until `shutdown` is set: polls
    /// every running link's fds (1s timeout), services readiness and
    /// timers, and reconciles whenever `config_store` reports a change.
    /// `state_store` receives every `oper_state`/`last_state_change`
    /// write — a separate connection because those two tables normally
    /// live in different databases (SONiC's `CONFIG_DB`/`STATE_DB` split).
    pub fn run(
        &mut self,
        config_store: &mut dyn Store,
        state_store: &mut dyn Store,
        shutdown: &Arc<AtomicBool>,
    ) -> anyhow::Result<()> {
        config_store.psubscribe(&[CONSOLE_PORT_PATTERN, CONSOLE_SWITCH_PATTERN])?;
        self.reconcile(config_store, state_store)?;

        while !shutdown.load(Ordering::Relaxed) {
            self.poll_once(config_store, state_store, Duration::from_secs(1))?;
        }

        for (_, proxy) in self.proxies.drain() {
            proxy.stop(state_store);
        }
        config_store.close()?;
        Ok(())
    }

    fn poll_once(
        &mut self,
        config_store: &mut dyn Store,
        state_store: &mut dyn Store,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        let ids: Vec<String> = self.proxies.keys().cloned().collect();
        let mut fds = Vec::with_capacity(ids.len() * 2);
        for id in &ids {
            let proxy = &self.proxies[id];
            // SAFETY: each borrowed fd is owned by a proxy kept alive in
            // `self.proxies` for the duration of this poll call.
            unsafe {
                fds.push(PollFd::new(
                    BorrowedFd::borrow_raw(proxy.serial_fd()),
                    PollFlags::POLLIN,
                ));
                fds.push(PollFd::new(
                    BorrowedFd::borrow_raw(proxy.pty_master_fd()),
                    PollFlags::POLLIN,
                ));
            }
        }

        let timeout_ms = u16::try_from(timeout.as_millis().min(u128::from(u16::MAX)))
            .unwrap_or(u16::MAX);
        let _ = poll(&mut fds, PollTimeout::from(timeout_ms));

        for (i, id) in ids.iter().enumerate() {
            let serial_ready = fds[i * 2]
                .revents()
                .is_some_and(|r| r.contains(PollFlags::POLLIN));
            let pty_ready = fds[i * 2 + 1]
                .revents()
                .is_some_and(|r| r.contains(PollFlags::POLLIN));
            if let Some(proxy) = self.proxies.get_mut(id) {
                if serial_ready {
                    proxy.on_serial_readable(state_store);
                }
                if pty_ready {
                    proxy.on_pty_readable();
                }
            }
        }

        let now = Instant::now();
        for proxy in self.proxies.values_mut() {
            proxy.check_timers(now, state_store);
        }

        if let Ok(Some(_event)) = config_store.next_event(Duration::from_millis(0)) {
            self.reconcile(config_store, state_store)?;
        }

        Ok(())
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
