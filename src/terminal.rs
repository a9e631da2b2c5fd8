//! Terminal device operations and raw-mode control.
//!
//! This module provides:
//! - The [`Terminal`] trait, the stream pair the detector talks to
//! - [`Tty`], its implementation over a terminal device (`/dev/tty` by default)
//! - [`RawModeGuard`], which restores the input mode exactly once on every exit path

use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{self, IsTerminal, Read, Write};
use std::ops::{Deref, DerefMut};
use std::os::unix::io::AsRawFd;

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use termios::{ECHO, ICANON, TCSANOW, Termios, tcsetattr};
use tokio::io::unix::AsyncFd;
use tracing::{trace, warn};

/// Input/output stream pair of an interactive terminal.
///
/// The detector only needs to know whether the streams are a terminal at all,
/// to flip the input between raw and cooked mode, to send one query and to read
/// whatever comes back.
pub trait Terminal {
    /// Whether both streams are attached to an interactive terminal.
    fn is_interactive(&self) -> bool;

    /// Whether the input stream is currently in raw mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal attributes cannot be read.
    fn is_raw(&self) -> io::Result<bool>;

    /// Switch the input stream into raw mode, or back out of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal attributes cannot be changed.
    fn set_raw(&mut self, raw: bool) -> io::Result<()>;

    /// Write `query` in full to the output stream.
    fn write_query(&mut self, query: &[u8]) -> impl Future<Output = io::Result<()>>;

    /// Wait for the next chunk of input and copy it into `buf`.
    ///
    /// Resolves to the number of bytes read, `0` meaning end of input.
    fn read_chunk(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>>;
}

/// Whether stdin and stdout are both attached to a terminal.
pub(crate) fn stdio_is_terminal() -> bool {
    io::stdin().is_terminal() && io::stdout().is_terminal()
}

/// Opens the terminal device for direct access.
///
/// `/dev/tty` is opened with both read and write permissions, which gives a
/// private file description for the controlling terminal: switching it to
/// non-blocking mode does not leak into the stdio descriptors shared with the
/// parent shell.
fn open_terminal_device() -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open("/dev/tty")
}

/// Configures the file descriptor for non-blocking I/O.
///
/// # Arguments
///
/// - `file` - Terminal device file handle
///
/// # Returns
///
/// - `Ok(())` once `O_NONBLOCK` is set
/// - `Err` if the file status flags cannot be read or changed
fn set_non_blocking(file: &File) -> io::Result<()> {
    let flags = fcntl(file, FcntlArg::F_GETFL)?;
    let new_flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(file, FcntlArg::F_SETFL(new_flags))?;
    Ok(())
}

/// A terminal device, normally the controlling terminal of the process.
///
/// Raw mode here means canonical input processing and echo are disabled, so
/// the terminal's reply reaches us byte by byte instead of waiting for a line
/// terminator, and never shows up on screen.
pub struct Tty {
    device: AsyncFd<File>,
    saved: Option<Termios>,
}

impl Tty {
    /// Open the controlling terminal and register it with the tokio reactor.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Returns
    ///
    /// - `Ok(Tty)` wrapping `/dev/tty`, in non-blocking mode
    /// - `Err` if there is no controlling terminal, or if it cannot be put into
    ///   non-blocking mode
    ///
    /// # Errors
    ///
    /// See above.
    pub fn open() -> io::Result<Self> {
        Self::from_file(open_terminal_device()?)
    }

    /// Wrap an already open terminal device, such as the slave side of a pty.
    ///
    /// The file is switched to non-blocking mode and registered with the tokio
    /// reactor, so this must be called from within a tokio runtime.
    ///
    /// # Arguments
    ///
    /// - `file` - Terminal device opened for both reading and writing
    ///
    /// # Returns
    ///
    /// - `Ok(Tty)` owning `file`
    /// - `Err` if the file status flags cannot be changed or the reactor
    ///   refuses the descriptor
    ///
    /// # Errors
    ///
    /// See above.
    pub fn from_file(file: File) -> io::Result<Self> {
        set_non_blocking(&file)?;
        #[allow(unsafe_code)]
        // SAFETY: the `File` is moved into the `AsyncFd` and owned by it until the
        // `AsyncFd` is dropped, so its descriptor stays open and unchanged.
        let device = unsafe { AsyncFd::register(file) }?;
        Ok(Self {
            device,
            saved: None,
        })
    }

    fn attributes(&self) -> io::Result<Termios> {
        Termios::from_fd(self.device.as_raw_fd())
    }
}

impl Terminal for Tty {
    fn is_interactive(&self) -> bool {
        self.device.get_ref().is_terminal()
    }

    fn is_raw(&self) -> io::Result<bool> {
        Ok(self.attributes()?.c_lflag & (ICANON | ECHO) == 0)
    }

    fn set_raw(&mut self, raw: bool) -> io::Result<()> {
        let fd = self.device.as_raw_fd();
        if raw {
            let current = self.attributes()?;
            let mut new_termios = current;
            new_termios.c_lflag &= !(ICANON | ECHO);
            tcsetattr(fd, TCSANOW, &new_termios)?;
            self.saved.get_or_insert(current);
            return Ok(());
        }

        let restored = match self.saved.take() {
            Some(saved) => saved,
            None => {
                let mut cooked = self.attributes()?;
                cooked.c_lflag |= ICANON | ECHO;
                cooked
            }
        };
        tcsetattr(fd, TCSANOW, &restored)
    }

    async fn write_query(&mut self, query: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < query.len() {
            let mut ready = self.device.writable_mut().await?;
            match ready.try_io(|inner| inner.get_mut().write(&query[written..])) {
                Ok(Ok(0)) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(Ok(n)) => written += n,
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => {}
            }
        }
        trace!(bytes = written, "query sent");
        Ok(())
    }

    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut ready = self.device.readable_mut().await?;
            match ready.try_io(|inner| inner.get_mut().read(&mut *buf)) {
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                Ok(result) => return result,
                Err(_would_block) => {}
            }
        }
    }
}

/// Raw mode borrowed for the lifetime of the guard.
///
/// Acquiring records whether the input was already raw and switches it on if
/// it was not. Dropping the guard switches it back off, once, and only when the
/// guard was the one that switched it on. The terminal stays reachable through
/// the guard via `Deref`.
pub struct RawModeGuard<'a, T: Terminal> {
    terminal: &'a mut T,
    restore: bool,
}

impl<'a, T: Terminal> RawModeGuard<'a, T> {
    /// Put `terminal` into raw mode unless it already is.
    ///
    /// # Arguments
    ///
    /// - `terminal` - Terminal whose input mode is borrowed
    ///
    /// # Returns
    ///
    /// - `Ok(RawModeGuard)` that restores the previous mode when dropped
    /// - `Err` if the mode cannot be read or changed
    ///
    /// # Errors
    ///
    /// Returns an error if the current mode cannot be read or changed. Nothing
    /// is left to restore in that case.
    pub fn acquire(terminal: &'a mut T) -> io::Result<Self> {
        let was_raw = terminal.is_raw()?;
        if !was_raw {
            terminal.set_raw(true)?;
        }
        Ok(Self {
            terminal,
            restore: !was_raw,
        })
    }
}

impl<T: Terminal> Deref for RawModeGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &*self.terminal
    }
}

impl<T: Terminal> DerefMut for RawModeGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut *self.terminal
    }
}

impl<T: Terminal> Drop for RawModeGuard<'_, T> {
    fn drop(&mut self) {
        if std::mem::take(&mut self.restore)
            && let Err(err) = self.terminal.set_raw(false)
        {
            warn!(%err, "failed to restore terminal mode");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTerminal;

    #[test]
    fn test_guard_restores_cooked_terminal() -> io::Result<()> {
        let mut term = ScriptedTerminal::cooked();
        {
            let guard = RawModeGuard::acquire(&mut term)?;
            assert!(guard.raw);
        }
        assert!(!term.raw);
        assert_eq!(term.transitions, vec![true, false]);
        Ok(())
    }

    #[test]
    fn test_guard_leaves_raw_terminal_alone() -> io::Result<()> {
        let mut term = ScriptedTerminal::raw();
        {
            let guard = RawModeGuard::acquire(&mut term)?;
            assert!(guard.raw);
        }
        assert!(term.raw);
        assert!(term.transitions.is_empty());
        Ok(())
    }

    #[test]
    fn test_guard_failed_acquire_touches_nothing() {
        let mut term = ScriptedTerminal::cooked().failing_mode_switch();
        assert!(RawModeGuard::acquire(&mut term).is_err());
        assert!(!term.raw);
        assert!(term.transitions.is_empty());
    }

    #[test]
    fn test_guard_survives_failed_restore() -> io::Result<()> {
        let mut term = ScriptedTerminal::cooked();
        {
            let mut guard = RawModeGuard::acquire(&mut term)?;
            guard.fail_mode_switch = true;
        }
        assert!(term.raw);
        assert_eq!(term.transitions, vec![true]);
        Ok(())
    }

    mod pty {
        use std::thread;
        use std::time::Duration;

        use nix::pty::openpty;
        use termios::tcflag_t;

        use super::*;
        use crate::{Classification, OSC11_QUERY, detect_on};

        const WHITE_REPLY: &[u8] = b"\x1b]11;rgb:ffff/ffff/ffff\x1b\\";

        /// Opens a pty pair with the slave in the requested mode. Returns the
        /// master, a duplicate of the slave for inspecting its attributes, and a
        /// `Tty` over the slave.
        fn open_pty(raw: bool) -> io::Result<(File, File, Tty)> {
            let pair = openpty(None, None)?;
            let master = File::from(pair.master);
            let slave = File::from(pair.slave);

            let mut attrs = Termios::from_fd(slave.as_raw_fd())?;
            if raw {
                attrs.c_lflag &= !(ICANON | ECHO);
            } else {
                attrs.c_lflag |= ICANON | ECHO;
            }
            tcsetattr(slave.as_raw_fd(), TCSANOW, &attrs)?;

            let observer = slave.try_clone()?;
            Ok((master, observer, Tty::from_file(slave)?))
        }

        fn lflag(file: &File) -> io::Result<tcflag_t> {
            Ok(Termios::from_fd(file.as_raw_fd())?.c_lflag)
        }

        /// Plays the terminal: waits for the query, then answers with `reply`.
        /// The master is handed back so it outlives the exchange.
        fn answer(
            mut master: File,
            reply: &'static [u8],
        ) -> thread::JoinHandle<io::Result<(Vec<u8>, File)>> {
            thread::spawn(move || {
                let mut query = vec![0u8; OSC11_QUERY.len()];
                master.read_exact(&mut query)?;
                master.write_all(reply)?;
                Ok((query, master))
            })
        }

        #[tokio::test]
        async fn test_tty_set_raw_round_trip() -> io::Result<()> {
            let (_master, observer, mut tty) = open_pty(false)?;
            let before = lflag(&observer)?;
            assert!(!tty.is_raw()?);

            tty.set_raw(true)?;
            assert!(tty.is_raw()?);
            assert_eq!(lflag(&observer)? & (ICANON | ECHO), 0);

            tty.set_raw(false)?;
            assert!(!tty.is_raw()?);
            assert_eq!(lflag(&observer)?, before);
            Ok(())
        }

        #[tokio::test]
        async fn test_tty_cooked_without_saved_attributes() -> io::Result<()> {
            let (_master, observer, mut tty) = open_pty(true)?;
            assert!(tty.is_raw()?);
            tty.set_raw(false)?;
            assert_eq!(lflag(&observer)? & (ICANON | ECHO), ICANON | ECHO);
            Ok(())
        }

        #[tokio::test]
        async fn test_tty_reply_restores_cooked_mode() -> io::Result<()> {
            let (master, observer, mut tty) = open_pty(false)?;
            let before = lflag(&observer)?;
            let terminal_side = answer(master, WHITE_REPLY);

            let result = detect_on(&mut tty, Duration::from_secs(5)).await;
            let (query, _master) = terminal_side.join().expect("terminal side panicked")?;

            assert_eq!(result, Classification::Light);
            assert_eq!(query, OSC11_QUERY);
            assert_eq!(lflag(&observer)?, before);
            assert_ne!(before & ICANON, 0);
            Ok(())
        }

        #[tokio::test]
        async fn test_tty_reply_keeps_raw_mode() -> io::Result<()> {
            let (master, observer, mut tty) = open_pty(true)?;
            let before = lflag(&observer)?;
            let terminal_side = answer(master, b"\x1b]11;rgb:0000/0000/0000\x07");

            let result = detect_on(&mut tty, Duration::from_secs(5)).await;
            let (query, _master) = terminal_side.join().expect("terminal side panicked")?;

            assert_eq!(result, Classification::Dark);
            assert_eq!(query, OSC11_QUERY);
            assert_eq!(lflag(&observer)?, before);
            assert_eq!(before & (ICANON | ECHO), 0);
            Ok(())
        }

        #[tokio::test]
        async fn test_tty_timeout_restores_cooked_mode() -> io::Result<()> {
            let (_master, observer, mut tty) = open_pty(false)?;
            let before = lflag(&observer)?;

            let result = detect_on(&mut tty, Duration::from_millis(50)).await;

            assert_eq!(result, Classification::Unknown);
            assert_eq!(lflag(&observer)?, before);
            Ok(())
        }

        #[tokio::test]
        async fn test_tty_timeout_keeps_raw_mode() -> io::Result<()> {
            let (_master, observer, mut tty) = open_pty(true)?;
            let before = lflag(&observer)?;

            let result = detect_on(&mut tty, Duration::from_millis(50)).await;

            assert_eq!(result, Classification::Unknown);
            assert_eq!(lflag(&observer)?, before);
            Ok(())
        }
    }
}
