//! Pseudo-terminal allocation and the symlink a link proxy publishes for
//! its slave, plus resolution of the symlink path prefix from a platform
//! config file.

use crate::constants::{DEFAULT_SYMLINK_PREFIX, UDEV_PREFIX_FILE};
use crate::serial::configure_pty_raw;
use nix::pty::{openpty, OpenptyResult};
use std::fs::File;
use std::io;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};

/// An allocated pty pair, both ends raw/no-echo, plus the slave's device
/// path (needed as the symlink target).
#[derive(Debug)]
pub struct PtyPair {
    /// The master end; the link proxy reads/writes this.
    pub master: File,
    /// The slave end. Held open for the pair's lifetime, even though
    /// nothing in this process reads or writes it directly: external
    /// tools attach to it via the symlink, and closing it early would
    /// let the master see a spurious hangup while no terminal is
    /// attached to the slave yet.
    pub slave: File,
    /// The slave's device path, e.g. `/dev/pts/7`.
    pub slave_name: PathBuf,
}

/// Allocates a pty pair and configures both ends raw with echo disabled.
pub fn allocate() -> anyhow::Result<PtyPair> {
    let OpenptyResult { master, slave } = openpty(None, None)?;
    configure_pty_raw(master.as_fd())?;
    configure_pty_raw(slave.as_fd())?;

    let slave_name = nix::unistd::ttyname(slave.as_fd())?;

    Ok(PtyPair {
        master: File::from(master),
        slave: File::from(slave),
        slave_name,
    })
}

/// Resolves the symlink prefix: the first line of the platform config
/// file with a literal `"V"` prepended, or the compiled-in default if the
/// file is absent or unreadable.
#[must_use]
pub fn resolve_symlink_prefix() -> String {
    resolve_symlink_prefix_from(Path::new(UDEV_PREFIX_FILE))
}

/// Testable core of [`resolve_symlink_prefix`], parameterized on the file
/// path.
pub fn resolve_symlink_prefix_from(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(contents) => match contents.lines().next() {
            Some(first_line) if !first_line.trim().is_empty() => {
                format!("V{}", first_line.trim())
            }
            _ => DEFAULT_SYMLINK_PREFIX.to_string(),
        },
        Err(_) => DEFAULT_SYMLINK_PREFIX.to_string(),
    }
}

/// Creates (or atomically replaces) a symlink at `<prefix><link_id>`
/// pointing at `target`.
pub fn create_symlink(prefix: &str, link_id: &str, target: &Path) -> io::Result<PathBuf> {
    let link_path = PathBuf::from(format!("{prefix}{link_id}"));
    if link_path.symlink_metadata().is_ok() {
        std::fs::remove_file(&link_path)?;
    }
    std::os::unix::fs::symlink(target, &link_path)?;
    Ok(link_path)
}

/// Removes the symlink at `path` if present. A missing symlink is not an
/// error (the stop sequence may run after a prior cleanup attempt).
pub fn remove_symlink(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resolve_symlink_prefix_falls_back_when_file_missing() {
        let prefix = resolve_symlink_prefix_from(Path::new("/nonexistent/udevprefix.conf"));
        assert_eq!(prefix, DEFAULT_SYMLINK_PREFIX);
    }

    #[test]
    fn resolve_symlink_prefix_prepends_literal_v() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file_path = dir.path().join("udevprefix.conf");
        let mut f = File::create(&file_path).expect("create");
        writeln!(f, "S0-").expect("write");

        let prefix = resolve_symlink_prefix_from(&file_path);
        assert_eq!(prefix, "VS0-");
    }

    #[test]
    fn create_symlink_replaces_existing_entity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target_a = dir.path().join("slave_a");
        let target_b = dir.path().join("slave_b");
        File::create(&target_a).expect("create a");
        File::create(&target_b).expect("create b");

        let prefix = format!("{}/VC0-", dir.path().display());
        let link = create_symlink(&prefix, "1", &target_a).expect("first link");
        assert_eq!(std::fs::read_link(&link).expect("read link"), target_a);

        let link = create_symlink(&prefix, "1", &target_b).expect("replace link");
        assert_eq!(std::fs::read_link(&link).expect("read link"), target_b);
    }

    #[test]
    fn remove_symlink_on_missing_path_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("does-not-exist");
        assert!(remove_symlink(&path).is_ok());
    }
}
