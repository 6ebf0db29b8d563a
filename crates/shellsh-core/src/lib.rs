//! # shellsh-core
//!
//! Core types for shellsh.
//!
//! This crate contains the fundamental types with **no internal dependencies**
//! on other shellsh crates. It provides:
//!
//! - Error types
//! - Session configuration (loadable from YAML)
//! - Session state types (SessionState, Completion, SessionInfo)
//! - Completion markers
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other shellsh crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod marker;
pub mod session;

// Re-export commonly used types
pub use config::{ShellConfig, TerminalSettings, TimingSettings};
pub use error::{Error, Result};
pub use marker::Marker;
pub use session::{Completion, SessionInfo, SessionState};
