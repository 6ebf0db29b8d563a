//! Captured shell output.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Output buffer holding decoded chunks in the order the shell produced them.
///
/// Appended to only by the output reader and drained only by
/// [`Session::flush`](crate::Session::flush); both happen under the same lock.
#[derive(Debug)]
pub struct OutputBuffer {
    /// Decoded chunks since the last drain
    chunks: VecDeque<String>,
    /// Bytes of text currently held
    len: usize,
    /// Number of drains so far, so byte offsets can be tied to one epoch
    drains: u64,
    /// When the reader last received bytes from the shell
    last_activity: Instant,
}

impl OutputBuffer {
    /// Create a new output buffer.
    pub fn new() -> Self {
        Self {
            chunks: VecDeque::new(),
            len: 0,
            drains: 0,
            last_activity: Instant::now(),
        }
    }

    /// Append a decoded chunk and mark activity.
    ///
    /// Activity is recorded even for an empty chunk, which happens when a
    /// read ends in the middle of a multi-byte character.
    pub fn append(&mut self, text: String) {
        self.last_activity = Instant::now();
        if text.is_empty() {
            return;
        }
        self.len += text.len();
        self.chunks.push_back(text);
    }

    /// Take everything accumulated so far, leaving the buffer empty.
    pub fn drain(&mut self) -> String {
        let mut output = String::with_capacity(self.len);
        for chunk in self.chunks.drain(..) {
            output.push_str(&chunk);
        }
        self.len = 0;
        self.drains += 1;
        output
    }

    /// Concatenated contents without draining.
    pub fn contents(&self) -> String {
        let mut output = String::with_capacity(self.len);
        for chunk in &self.chunks {
            output.push_str(chunk);
        }
        output
    }

    /// Text from byte `offset` of the unflushed output to its end.
    ///
    /// `offset` must lie on a character boundary. Chunks entirely before it
    /// are skipped without copying.
    pub fn text_from(&self, offset: usize) -> String {
        let mut output = String::with_capacity(self.len.saturating_sub(offset));
        let mut start = 0;
        for chunk in &self.chunks {
            let end = start + chunk.len();
            if end > offset {
                let skip = offset.saturating_sub(start);
                output.push_str(&chunk[skip..]);
            }
            start = end;
        }
        output
    }

    /// How many times the buffer has been drained.
    ///
    /// Offsets into the unflushed output are only meaningful while this
    /// stays the same.
    pub fn drain_count(&self) -> u64 {
        self.drains
    }

    /// Bytes of text held.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has accumulated since the last drain.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of chunks held.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Time of the most recent read.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Time since the most recent read.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}
