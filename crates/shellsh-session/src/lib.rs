//! # shellsh-session
//!
//! Session lifecycle management for shellsh.
//!
//! This crate provides:
//! - Session creation and teardown
//! - Background output capture with idle tracking
//! - Command completion tracking through echoed markers
//! - Blocking and non-blocking submission
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on shellsh-core and
//! shellsh-pty to drive a persistent shell.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod completion;
pub mod output;
mod reader;
pub mod session;

// Re-export commonly used types
pub use completion::CompletionTracker;
pub use output::OutputBuffer;
pub use session::Session;
pub use shellsh_core::{Completion, Error, Result, SessionInfo, SessionState, ShellConfig};
