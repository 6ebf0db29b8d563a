//! Session state types.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a session.
///
/// Transitions are monotonic: `Created → Running → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Pty and shell are being set up
    Created,
    /// Shell is running and accepting input
    Running,
    /// Session was closed; no further input is accepted
    Closed,
}

impl SessionState {
    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Created, SessionState::Running)
                | (SessionState::Created, SessionState::Closed)
                | (SessionState::Running, SessionState::Closed)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Running => "running",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What `submit` observed before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Non-blocking submit; completion has not been checked
    Pending,
    /// The command's completion marker was observed
    Completed,
    /// Output went quiet for the idle threshold. The marker is still pending,
    /// so `wait`/`is_alive` can confirm completion.
    Idle,
    /// Neither marker nor idleness was observed before the ceiling
    TimedOut,
}

impl Completion {
    /// True only when completion was confirmed by the marker.
    pub fn is_confirmed(self) -> bool {
        self == Completion::Completed
    }
}

/// Snapshot of a session's observable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Caller-supplied label
    pub name: String,
    /// Lifecycle state
    pub state: SessionState,
    /// Shell process id, when known
    pub pid: Option<u32>,
    /// Whether submit blocks
    pub blocking: bool,
    /// Number of submitted commands whose marker is not yet observed
    pub pending_markers: usize,
    /// Whether the reader saw the shell go away
    pub exited: bool,
}
