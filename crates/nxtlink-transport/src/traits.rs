use std::io::{Read, Write};

use crate::error::Result;

/// A connected link to the brick (or to a local endpoint); implements Read + Write.
///
/// This is the fundamental I/O type returned by transport operations.
/// On a real host it wraps a serial device node bound to the paired brick;
/// simulators and tests use a Unix domain socket stream.
pub struct LinkStream {
    inner: LinkStreamInner,
}

enum LinkStreamInner {
    Unix(std::os::unix::net::UnixStream),
    Serial(crate::serial::SerialNode),
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Unix(stream) => stream.read(buf),
            LinkStreamInner::Serial(node) => node.read(buf),
        }
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Unix(stream) => stream.write(buf),
            LinkStreamInner::Serial(node) => node.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            LinkStreamInner::Unix(stream) => stream.flush(),
            LinkStreamInner::Serial(node) => node.flush(),
        }
    }
}

impl LinkStream {
    /// Wrap a Unix domain socket stream.
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: LinkStreamInner::Unix(stream),
        }
    }

    /// Wrap an opened serial device node.
    pub fn from_serial(node: crate::serial::SerialNode) -> Self {
        Self {
            inner: LinkStreamInner::Serial(node),
        }
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            LinkStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            LinkStreamInner::Serial(node) => {
                node.set_read_timeout(timeout);
                Ok(())
            }
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            LinkStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            LinkStreamInner::Serial(node) => {
                node.set_write_timeout(timeout);
                Ok(())
            }
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            LinkStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
            LinkStreamInner::Serial(node) => Ok(Self::from_serial(node.try_clone()?)),
        }
    }

    /// Shut down both directions of the stream.
    ///
    /// Serial nodes have no half-close; they are released when the last
    /// clone is dropped.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            LinkStreamInner::Unix(stream) => stream
                .shutdown(std::net::Shutdown::Both)
                .map_err(Into::into),
            LinkStreamInner::Serial(_) => Ok(()),
        }
    }

    /// Transport kind for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            LinkStreamInner::Unix(_) => "unix",
            LinkStreamInner::Serial(_) => "serial",
        }
    }
}

impl From<std::os::unix::net::UnixStream> for LinkStream {
    fn from(stream: std::os::unix::net::UnixStream) -> Self {
        Self::from_unix(stream)
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            LinkStreamInner::Unix(_) => f.debug_struct("LinkStream").field("type", &"unix").finish(),
            LinkStreamInner::Serial(node) => f
                .debug_struct("LinkStream")
                .field("type", &"serial")
                .field("path", &node.path())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{ErrorKind, Read, Write};
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    use super::*;

    #[test]
    fn unix_pair_carries_bytes_both_ways() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut left = LinkStream::from(left);
        let mut right = LinkStream::from(right);

        left.write_all(&[0x80, 0x0D]).unwrap();
        let mut buf = [0u8; 2];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x80, 0x0D]);
        assert_eq!(left.kind(), "unix");
    }

    #[test]
    fn read_timeout_applies() {
        let (left, _right) = UnixStream::pair().unwrap();
        let mut link = LinkStream::from(left);
        link.set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();

        let mut buf = [0u8; 1];
        let err = link.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::WouldBlock | ErrorKind::TimedOut
        ));
    }

    #[test]
    fn shutdown_signals_eof_to_peer() {
        let (left, right) = UnixStream::pair().unwrap();
        let left = LinkStream::from(left);
        let mut right = LinkStream::from(right);

        left.shutdown().unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(right.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn cloned_stream_shares_connection() {
        let (left, right) = UnixStream::pair().unwrap();
        let left = LinkStream::from(left);
        let mut writer = left.try_clone().unwrap();
        let mut right = LinkStream::from(right);

        writer.write_all(b"x").unwrap();
        let mut buf = [0u8; 1];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"x");
        drop(left);
    }

    #[test]
    fn serial_node_link_clones_and_shuts_down() {
        let node = crate::serial::SerialNode::open("/dev/null").unwrap();
        let link = LinkStream::from_serial(node);
        assert_eq!(link.kind(), "serial");
        assert!(format!("{link:?}").contains("/dev/null"));

        let mut clone = link.try_clone().unwrap();
        clone.write_all(&[0x80, 0x0D]).unwrap();
        link.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        link.shutdown().unwrap();
    }
}
