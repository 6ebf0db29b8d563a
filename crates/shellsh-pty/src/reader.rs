//! Readiness-polled reads from the PTY master.

use std::fs::File;
use std::io::{self, Read};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::time::Duration;

use tracing::debug;

use shellsh_core::{Error, Result};

/// Outcome of a single [`PtyReader::read_timeout`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were read into the buffer
    Data(usize),
    /// Nothing became readable within the timeout
    Timeout,
    /// The other side of the pty is gone
    Eof,
}

/// Reading end of the PTY master.
///
/// Owns its own duplicate of the master descriptor, so it stays valid even
/// after the [`PtyHandle`](crate::PtyHandle) releases the master.
#[derive(Debug)]
pub struct PtyReader {
    file: File,
}

impl PtyReader {
    /// Duplicate `master_fd` into a new reader.
    pub(crate) fn from_master_fd(master_fd: RawFd) -> Result<Self> {
        // SAFETY: fcntl with F_DUPFD_CLOEXEC only reads `master_fd`, which the
        // caller keeps open for the duration of this call.
        let fd = unsafe { libc::fcntl(master_fd, libc::F_DUPFD_CLOEXEC, 0) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            return Err(Error::Spawn(format!("Failed to duplicate PTY master: {err}")));
        }
        debug!("Duplicated PTY master fd {} as reader fd {}", master_fd, fd);

        // SAFETY: `fd` was just created above and nothing else owns it.
        let file = unsafe { File::from_raw_fd(fd) };
        Ok(Self { file })
    }

    /// Wait up to `timeout` for the pty to become readable, then read at most
    /// `buf.len()` bytes.
    ///
    /// Linux reports a closed subordinate side as `EIO` rather than a
    /// zero-length read; both map to [`ReadOutcome::Eof`].
    pub fn read_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<ReadOutcome> {
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: `pfd` is a valid pollfd and the count matches.
        let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(ReadOutcome::Timeout);
            }
            return Err(err);
        }
        if ready == 0 {
            return Ok(ReadOutcome::Timeout);
        }

        // Readable or hung up; the read tells which.
        match self.file.read(buf) {
            Ok(0) => Ok(ReadOutcome::Eof),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e) if e.raw_os_error() == Some(libc::EIO) => Ok(ReadOutcome::Eof),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(ReadOutcome::Timeout)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::time::Instant;

    fn reader_for(stream: &UnixStream) -> PtyReader {
        PtyReader::from_master_fd(stream.as_raw_fd()).unwrap()
    }

    #[test]
    fn test_read_timeout_without_data() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut reader = reader_for(&a);
        let mut buf = [0u8; 64];

        let start = Instant::now();
        let outcome = reader
            .read_timeout(&mut buf, Duration::from_millis(50))
            .unwrap();
        assert_eq!(outcome, ReadOutcome::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_read_available_data() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut reader = reader_for(&a);
        b.write_all(b"hello").unwrap();

        let mut buf = [0u8; 64];
        let outcome = reader
            .read_timeout(&mut buf, Duration::from_millis(500))
            .unwrap();
        assert_eq!(outcome, ReadOutcome::Data(5));
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn test_read_respects_buffer_size() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut reader = reader_for(&a);
        b.write_all(b"0123456789").unwrap();

        let mut buf = [0u8; 4];
        let outcome = reader
            .read_timeout(&mut buf, Duration::from_millis(500))
            .unwrap();
        assert_eq!(outcome, ReadOutcome::Data(4));
        assert_eq!(&buf, b"0123");
    }

    #[test]
    fn test_eof_when_peer_closes() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut reader = reader_for(&a);
        drop(b);

        let mut buf = [0u8; 64];
        let outcome = reader
            .read_timeout(&mut buf, Duration::from_millis(500))
            .unwrap();
        assert_eq!(outcome, ReadOutcome::Eof);
    }

    #[test]
    fn test_reader_outlives_original_fd() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut reader = reader_for(&a);
        drop(a);

        b.write_all(b"still here").unwrap();
        let mut buf = [0u8; 64];
        let outcome = reader
            .read_timeout(&mut buf, Duration::from_millis(500))
            .unwrap();
        assert_eq!(outcome, ReadOutcome::Data(10));
    }
}
