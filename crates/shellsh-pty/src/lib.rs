//! # shellsh-pty
//!
//! Pseudo-terminal transport and shell process ownership for shellsh.
//!
//! This crate provides:
//! - PTY allocation and shell spawning in a new session/process group
//! - Raw writes to the PTY master
//! - Readiness-polled, bounded reads for a background reader
//! - Process-group signalling and graceful-then-forced termination
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on shellsh-core and is
//! used by shellsh-session. Only Unix-like platforms are supported.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pty;
pub mod reader;

// Re-export commonly used types
pub use pty::{PtyHandle, Termination};
pub use reader::{PtyReader, ReadOutcome};

/// Signal numbers re-exported for callers of [`PtyHandle::signal`].
pub use libc::{SIGHUP, SIGINT, SIGKILL, SIGTERM};
