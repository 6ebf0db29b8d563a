//! Configuration types for shellsh sessions.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

/// Session configuration, optionally loaded from a YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell program to run
    pub shell: String,
    /// Arguments passed to the shell
    pub args: Vec<String>,
    /// Working directory for the shell (inherits ours when unset)
    pub working_directory: Option<String>,
    /// Extra environment variables, applied on top of the inherited environment
    pub env: Vec<(String, String)>,
    /// Prefix of generated completion markers
    pub marker_prefix: String,
    /// Initial blocking mode for `submit`
    pub blocking: bool,
    /// Terminal settings
    pub terminal: TerminalSettings,
    /// Polling and timeout settings
    pub timing: TimingSettings,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/bash".to_string(),
            args: Vec::new(),
            working_directory: None,
            env: Vec::new(),
            marker_prefix: "SHELLSH".to_string(),
            blocking: false,
            terminal: TerminalSettings::default(),
            timing: TimingSettings::default(),
        }
    }
}

impl ShellConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ShellConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.shell.trim().is_empty() {
            return Err(Error::Config("shell cannot be empty".to_string()));
        }

        if self.terminal.rows == 0 || self.terminal.cols == 0 {
            return Err(Error::Config("terminal dimensions must be > 0".to_string()));
        }

        if self.marker_prefix.is_empty()
            || !self
                .marker_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::Config(format!(
                "marker_prefix '{}' must be non-empty and contain only [A-Za-z0-9_]",
                self.marker_prefix
            )));
        }

        self.timing.validate()
    }
}

/// Terminal settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// Terminal rows
    pub rows: u16,
    /// Terminal columns
    pub cols: u16,
    /// TERM environment variable value
    pub term: String,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            rows: 24,
            cols: 80,
            term: "xterm-256color".to_string(),
        }
    }
}

/// Polling intervals, thresholds and ceilings used by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// How long the reader waits for the pty to become readable per iteration
    pub poll_interval_ms: u64,
    /// Maximum bytes read from the pty at once
    pub read_chunk_size: usize,
    /// Poll interval of `wait` and blocking `submit`
    pub wait_poll_interval_ms: u64,
    /// Output silence that blocking `submit` treats as "probably finished"
    pub idle_threshold_ms: u64,
    /// Delay before blocking `submit` starts checking for idleness
    pub warmup_ms: u64,
    /// Absolute ceiling for blocking `submit`
    pub blocking_timeout_ms: u64,
    /// Grace period between the termination signal and the forced kill on close
    pub close_grace_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            read_chunk_size: 4096,
            wait_poll_interval_ms: 50,
            idle_threshold_ms: 500,
            warmup_ms: 100,
            blocking_timeout_ms: 300_000,
            close_grace_ms: 2000,
        }
    }
}

impl TimingSettings {
    /// Validate timing values.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 || self.wait_poll_interval_ms == 0 {
            return Err(Error::Config("poll intervals must be > 0".to_string()));
        }

        if self.read_chunk_size == 0 {
            return Err(Error::Config("timing.read_chunk_size must be > 0".to_string()));
        }

        Ok(())
    }

    /// Reader poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Poll interval of waiting operations.
    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms)
    }

    /// Idle threshold of blocking submit.
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    /// Warm-up delay of blocking submit.
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    /// Ceiling of blocking submit.
    pub fn blocking_timeout(&self) -> Duration {
        Duration::from_millis(self.blocking_timeout_ms)
    }

    /// Grace period before a forced kill.
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}
