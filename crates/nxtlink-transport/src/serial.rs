use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::debug;

/// A serial device node bound to the brick by the host Bluetooth stack
/// (for example `/dev/rfcomm0` after `rfcomm bind`).
///
/// The node is switched to raw mode on open so the line discipline never
/// rewrites protocol bytes. Nodes that are not terminals (FIFOs, plain
/// files) are accepted as-is.
pub struct SerialNode {
    file: File,
    path: PathBuf,
    // Milliseconds; zero means block indefinitely.
    read_timeout_ms: AtomicU64,
    write_timeout_ms: AtomicU64,
}

impl SerialNode {
    /// Open a device node for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&path)?;
        make_raw(&file)?;
        debug!(?path, "opened serial device node");
        Ok(Self {
            file,
            path,
            read_timeout_ms: AtomicU64::new(0),
            write_timeout_ms: AtomicU64::new(0),
        })
    }

    /// Path of the device node.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) {
        self.read_timeout_ms
            .store(timeout_to_millis(timeout), Ordering::Relaxed);
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) {
        self.write_timeout_ms
            .store(timeout_to_millis(timeout), Ordering::Relaxed);
    }

    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            file: self.file.try_clone()?,
            path: self.path.clone(),
            read_timeout_ms: AtomicU64::new(self.read_timeout_ms.load(Ordering::Relaxed)),
            write_timeout_ms: AtomicU64::new(self.write_timeout_ms.load(Ordering::Relaxed)),
        })
    }

    fn wait_for(&self, events: libc::c_short, timeout_ms: u64) -> io::Result<()> {
        if timeout_ms == 0 {
            return Ok(());
        }
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events,
            revents: 0,
        };
        let timeout = libc::c_int::try_from(timeout_ms).unwrap_or(libc::c_int::MAX);

        // SAFETY: `pfd` is a valid, initialized pollfd and we pass a count of 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout) };
        match rc {
            0 => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "serial device did not become ready in time",
            )),
            n if n < 0 => Err(io::Error::last_os_error()),
            _ => Ok(()),
        }
    }
}

impl Read for SerialNode {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.wait_for(libc::POLLIN, self.read_timeout_ms.load(Ordering::Relaxed))?;
        self.file.read(buf)
    }
}

impl Write for SerialNode {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.wait_for(libc::POLLOUT, self.write_timeout_ms.load(Ordering::Relaxed))?;
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn timeout_to_millis(timeout: Option<Duration>) -> u64 {
    match timeout {
        // A sub-millisecond timeout still has to time out.
        Some(t) => u64::try_from(t.as_millis()).unwrap_or(u64::MAX).max(1),
        None => 0,
    }
}

fn make_raw(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();

    // SAFETY: an all-zero termios is a valid value for tcgetattr to fill in.
    let mut term: libc::termios = unsafe { std::mem::zeroed() };

    // SAFETY: `fd` is open for the lifetime of `file`; `term` is writable.
    if unsafe { libc::tcgetattr(fd, &mut term) } != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOTTY) {
            return Ok(());
        }
        return Err(err);
    }

    // SAFETY: `term` was initialized by tcgetattr above.
    unsafe { libc::cfmakeraw(&mut term) };

    // SAFETY: `fd` is open and `term` is a fully initialized termios.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &term) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
