//! Command completion tracking.
//!
//! Every submitted command is followed by a line that prints a fresh
//! [`Marker`]. The shell executes input lines in order, so seeing a marker
//! anchored in the output means its command and every command before it
//! have finished.

use std::collections::VecDeque;

use tracing::debug;

use shellsh_core::Marker;

use crate::output::OutputBuffer;

/// FIFO queue of markers whose appearance has not been observed yet.
#[derive(Debug)]
pub struct CompletionTracker {
    prefix: String,
    pending: VecDeque<Marker>,
    /// Where the next scan of the output buffer starts
    cursor: ScanCursor,
}

/// Start of the last incomplete line seen in the output buffer.
///
/// Text before it has been scanned once already and ends in a newline, so no
/// marker issued later can start there.
#[derive(Debug, Default, Clone, Copy)]
struct ScanCursor {
    /// Drain count of the buffer the offset refers to
    drains: u64,
    /// Byte offset of the first unscanned line
    offset: usize,
}

impl CompletionTracker {
    /// Create a tracker generating markers with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            pending: VecDeque::new(),
            cursor: ScanCursor::default(),
        }
    }

    /// Generate a marker for a newly submitted command and queue it.
    pub fn issue(&mut self) -> Marker {
        let marker = Marker::generate(&self.prefix);
        if !self.pending.is_empty() {
            debug!(
                "Queueing marker {} behind {} unresolved marker(s)",
                marker,
                self.pending.len()
            );
        }
        self.pending.push_back(marker.clone());
        marker
    }

    /// Resolve markers visible in `output`.
    ///
    /// Finds the newest pending marker anchored in `output` and resolves it
    /// together with every older one. Returns how many were resolved.
    pub fn observe(&mut self, output: &str) -> usize {
        let newest_seen = self
            .pending
            .iter()
            .rposition(|marker| marker.is_anchored_in(output));

        match newest_seen {
            Some(index) => {
                let resolved = index + 1;
                for marker in self.pending.drain(..resolved) {
                    debug!("Observed completion marker {}", marker);
                }
                resolved
            }
            None => 0,
        }
    }

    /// Resolve markers in the unflushed part of `output`.
    ///
    /// Only text from the start of the last incomplete line onwards is
    /// scanned, so repeated polls of a growing buffer stay cheap.
    pub fn observe_output(&mut self, output: &OutputBuffer) -> usize {
        if output.drain_count() != self.cursor.drains {
            self.cursor = ScanCursor {
                drains: output.drain_count(),
                offset: 0,
            };
        }
        if !self.is_pending() {
            return 0;
        }

        // The window starts the buffer or follows a newline, so a marker at
        // its start is anchored.
        let window = output.text_from(self.cursor.offset);
        let resolved = self.observe(&window);
        if let Some(newline) = window.rfind('\n') {
            self.cursor.offset += newline + 1;
        }
        resolved
    }

    /// Whether any submitted command is still unresolved.
    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of unresolved markers.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Most recently issued unresolved marker.
    pub fn newest(&self) -> Option<&Marker> {
        self.pending.back()
    }

    /// Forget all pending markers.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
