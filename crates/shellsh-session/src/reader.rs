//! Background output reader.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use shellsh_core::{Error, Result, TimingSettings};
use shellsh_pty::{PtyReader, ReadOutcome};

use crate::output::OutputBuffer;

/// State shared between a session and its reader thread.
#[derive(Debug)]
pub(crate) struct ReaderState {
    buffer: Mutex<OutputBuffer>,
    running: AtomicBool,
    exited: AtomicBool,
}

impl ReaderState {
    pub(crate) fn new() -> Self {
        Self {
            buffer: Mutex::new(OutputBuffer::new()),
            running: AtomicBool::new(true),
            exited: AtomicBool::new(false),
        }
    }

    /// Lock the output buffer. A poisoned lock is recovered, since every
    /// buffer mutation leaves it consistent.
    pub(crate) fn buffer(&self) -> MutexGuard<'_, OutputBuffer> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the reader to stop at its next poll.
    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Whether the reader saw the shell side of the pty go away.
    pub(crate) fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    fn mark_exited(&self) {
        self.exited.store(true, Ordering::Release);
    }
}

/// Start the reader thread.
///
/// The thread polls `reader` for at most `poll_interval` per iteration so it
/// notices [`ReaderState::stop`] promptly, and ends on EOF or the first read
/// error without restarting.
pub(crate) fn spawn(
    name: &str,
    reader: PtyReader,
    state: Arc<ReaderState>,
    timing: &TimingSettings,
) -> Result<JoinHandle<()>> {
    let poll_interval = timing.poll_interval();
    let chunk_size = timing.read_chunk_size;
    let label = name.to_string();

    thread::Builder::new()
        .name(format!("shellsh-reader-{name}"))
        .spawn(move || run(&label, reader, &state, poll_interval, chunk_size))
        .map_err(|e| Error::Spawn(format!("Failed to start output reader: {e}")))
}

fn run(
    name: &str,
    mut reader: PtyReader,
    state: &ReaderState,
    poll_interval: Duration,
    chunk_size: usize,
) {
    debug!("Output reader started: session={}", name);
    let mut buf = vec![0u8; chunk_size];
    let mut decoder = Utf8Decoder::default();

    while state.is_running() {
        match reader.read_timeout(&mut buf, poll_interval) {
            Ok(ReadOutcome::Data(n)) => {
                debug!("Read {} bytes from PTY: session={}", n, name);
                let text = decoder.decode(&buf[..n]);
                state.buffer().append(text);
            }
            Ok(ReadOutcome::Timeout) => {}
            Ok(ReadOutcome::Eof) => {
                info!("Shell output reached EOF: session={}", name);
                state.mark_exited();
                break;
            }
            Err(e) => {
                warn!("PTY read failed, output reader stopping: session={}, {}", name, e);
                state.mark_exited();
                break;
            }
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        state.buffer().append(tail);
    }
    debug!("Output reader stopped: session={}", name);
}

/// Lossy UTF-8 decoder that carries an incomplete trailing character over to
/// the next chunk instead of replacing it.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode `bytes`, holding back a trailing partial character.
    pub(crate) fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let split = incomplete_tail_start(&self.pending);
        let tail = self.pending.split_off(split);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        text
    }

    /// Flush whatever is held back, replacing it if it never completed.
    pub(crate) fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Index where a truncated multi-byte sequence at the end of `bytes` begins,
/// or `bytes.len()` if the input does not end mid-character.
fn incomplete_tail_start(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let i = len - back;
        let b = bytes[i];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let width = match b {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return len,
        };
        return if width > back { i } else { len };
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ascii() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"hello"), "hello");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decode_split_multibyte() {
        let bytes = "héllo".as_bytes();
        let mut decoder = Utf8Decoder::default();

        // Split inside the two-byte 'é'
        assert_eq!(decoder.decode(&bytes[..2]), "h");
        assert_eq!(decoder.decode(&bytes[2..]), "éllo");
    }

    #[test]
    fn test_decode_split_four_byte_char() {
        let bytes = "a🦀b".as_bytes();
        let mut decoder = Utf8Decoder::default();

        assert_eq!(decoder.decode(&bytes[..2]), "a");
        assert_eq!(decoder.decode(&bytes[2..4]), "");
        assert_eq!(decoder.decode(&bytes[4..]), "🦀b");
    }

    #[test]
    fn test_decode_invalid_bytes_replaced() {
        let mut decoder = Utf8Decoder::default();
        let text = decoder.decode(b"ok\xFFok");
        assert_eq!(text, "ok\u{FFFD}ok");
    }

    #[test]
    fn test_finish_replaces_truncated_char() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&[b'x', 0xE2, 0x82]), "x");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_incomplete_tail_start() {
        assert_eq!(incomplete_tail_start(b""), 0);
        assert_eq!(incomplete_tail_start(b"abc"), 3);
        assert_eq!(incomplete_tail_start(&[b'a', 0xC3]), 1);
        assert_eq!(incomplete_tail_start("é".as_bytes()), 2);
        // A stray continuation byte is not held back
        assert_eq!(incomplete_tail_start(&[b'a', 0x80]), 2);
    }

    #[test]
    fn test_reader_state_flags() {
        let state = ReaderState::new();
        assert!(state.is_running());
        assert!(!state.has_exited());

        state.stop();
        assert!(!state.is_running());

        state.mark_exited();
        assert!(state.has_exited());
    }
}
