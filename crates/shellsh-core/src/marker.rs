//! Completion markers.
//!
//! A marker is a unique line the shell prints after a submitted command, so
//! its appearance in the output stream means every earlier input line has
//! been executed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A generated completion marker, `<PREFIX>_<token>_DONE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Marker {
    prefix: String,
    token: String,
    text: String,
}

impl Marker {
    /// Generate a fresh marker.
    ///
    /// The token combines a nanosecond timestamp with a process-wide
    /// sequence number, so two markers never compare equal even when the
    /// clock does not advance between calls.
    pub fn generate(prefix: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self::from_parts(prefix, format!("{nanos}_{seq}"))
    }

    fn from_parts(prefix: &str, token: String) -> Self {
        let text = format!("{prefix}_{token}_DONE");
        Self {
            prefix: prefix.to_string(),
            token,
            text,
        }
    }

    /// The full marker text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Shell input line that prints the marker, newline included.
    ///
    /// The marker is split across two `printf` arguments so the terminal's
    /// echo of this line never contains it verbatim. It is printed after a
    /// newline of its own, since a prompt, terminal mode sequences or
    /// unterminated command output may precede it on the same line.
    pub fn echo_line(&self) -> String {
        format!("printf '\\n%s_%s\\n' '{}' '{}_DONE'\n", self.prefix, self.token)
    }

    /// Whether `output` contains the marker at its start or right after a newline.
    pub fn is_anchored_in(&self, output: &str) -> bool {
        find_anchored(output, &self.text).is_some()
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Byte offset of the first occurrence of `needle` that starts `haystack` or
/// follows a `\n`.
pub fn find_anchored(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .match_indices(needle)
        .map(|(i, _)| i)
        .find(|&i| i == 0 || haystack.as_bytes()[i - 1] == b'\n')
}
