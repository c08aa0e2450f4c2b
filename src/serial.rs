//! Raw-mode serial and pty termios configuration, shared by the link
//! proxy (C4) and the terminal-side heartbeat emitter (C6).
//!
//! "8-N-1, raw, VMIN=VTIME=0" translates to a specific set of termios
//! flags; this module is the one place that bit manipulation lives.

use nix::sys::termios::{self, BaudRate, SetArg, SpecialCharacterIndices, Termios};
use std::fs::{File, OpenOptions};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// An unsupported baud rate was requested. Treated as a fatal start-up
/// error: the caller aborts rather than falling back to a default rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedBaud(pub u32);

impl std::fmt::Display for UnsupportedBaud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unsupported baud rate: {}", self.0)
    }
}

impl std::error::Error for UnsupportedBaud {}

/// Maps an integer baud rate to the `termios` constant, restricted to the
/// closed set of rates this deployment supports.
pub fn baud_rate(baud: u32) -> Result<BaudRate, UnsupportedBaud> {
    match baud {
        1200 => Ok(BaudRate::B1200),
        2400 => Ok(BaudRate::B2400),
        4800 => Ok(BaudRate::B4800),
        9600 => Ok(BaudRate::B9600),
        19200 => Ok(BaudRate::B19200),
        38400 => Ok(BaudRate::B38400),
        57600 => Ok(BaudRate::B57600),
        115_200 => Ok(BaudRate::B115200),
        other => Err(UnsupportedBaud(other)),
    }
}

/// Opens `device_path` read/write, non-controlling, non-blocking, and
/// configures it 8-N-1 raw at `baud`.
pub fn open_serial_device(device_path: &Path, baud: u32) -> anyhow::Result<File> {
    let rate = baud_rate(baud)?;
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
        .open(device_path)?;
    configure_serial(file.as_fd(), rate)?;
    Ok(file)
}

/// Applies raw 8-N-1 termios settings to an already-open serial fd: clears
/// input/output post-processing and local
/// echo, ignores modem control lines, sets `VMIN=VTIME=0` for fully
/// non-blocking reads, and applies the given baud rate.
pub fn configure_serial(fd: BorrowedFd<'_>, rate: BaudRate) -> nix::Result<()> {
    let mut tio: Termios = termios::tcgetattr(fd)?;

    tio.input_flags.remove(
        termios::InputFlags::IGNBRK
            | termios::InputFlags::BRKINT
            | termios::InputFlags::PARMRK
            | termios::InputFlags::ISTRIP
            | termios::InputFlags::INLCR
            | termios::InputFlags::IGNCR
            | termios::InputFlags::ICRNL
            | termios::InputFlags::IXON,
    );
    tio.output_flags.remove(termios::OutputFlags::OPOST);
    tio.control_flags.remove(
        termios::ControlFlags::PARENB | termios::ControlFlags::CSTOPB | termios::ControlFlags::CSIZE,
    );
    tio.control_flags.insert(
        termios::ControlFlags::CS8 | termios::ControlFlags::CREAD | termios::ControlFlags::CLOCAL,
    );
    tio.local_flags.remove(
        termios::LocalFlags::ECHO
            | termios::LocalFlags::ECHONL
            | termios::LocalFlags::ICANON
            | termios::LocalFlags::ISIG
            | termios::LocalFlags::IEXTEN,
    );
    tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    tio.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;

    termios::cfsetispeed(&mut tio, rate)?;
    termios::cfsetospeed(&mut tio, rate)?;

    termios::tcsetattr(fd, SetArg::TCSANOW, &tio)?;
    termios::tcflush(fd, termios::FlushArg::TCIOFLUSH)?;
    Ok(())
}

/// Sets a pty fd (master or slave) raw with local echo disabled, the
/// configuration the link proxy applies to both ends of its pty pair.
pub fn configure_pty_raw(fd: BorrowedFd<'_>) -> nix::Result<()> {
    let mut tio: Termios = termios::tcgetattr(fd)?;
    termios::cfmakeraw(&mut tio);
    tio.local_flags
        .remove(termios::LocalFlags::ECHO | termios::LocalFlags::ECHONL);
    termios::tcsetattr(fd, SetArg::TCSANOW, &tio)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baud_rate_accepts_known_values() {
        for b in [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115_200] {
            assert!(baud_rate(b).is_ok(), "expected {b} to be supported");
        }
    }

    #[test]
    fn baud_rate_rejects_unknown_values() {
        assert_eq!(baud_rate(300), Err(UnsupportedBaud(300)));
        assert_eq!(baud_rate(1_000_000), Err(UnsupportedBaud(1_000_000)));
    }
}
