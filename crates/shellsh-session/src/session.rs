//! Persistent shell session management.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use shellsh_core::{Completion, Error, Result, SessionInfo, SessionState, ShellConfig};
use shellsh_pty::PtyHandle;

use crate::completion::CompletionTracker;
use crate::reader::{self, ReaderState};

/// Interrupt control byte (Ctrl-C).
const INTERRUPT: u8 = 0x03;

/// A long-lived interactive shell driven over a pseudo-terminal.
///
/// Commands are written to the shell as input lines and run in one
/// persistent environment, so working directory, variables and shell state
/// carry over between calls. A background reader collects everything the
/// shell prints; [`Session::flush`] hands it out.
///
/// The session assumes one logical caller at a time. Concurrent calls from
/// several threads are memory-safe but may race on completion tracking.
pub struct Session {
    /// Caller-supplied label
    name: String,

    /// Configuration the session was created with
    config: ShellConfig,

    /// PTY and shell process
    pty: PtyHandle,

    /// Output buffer and reader flags, shared with the reader thread
    output: Arc<ReaderState>,

    /// Markers of submitted commands not yet seen in the output
    tracker: Mutex<CompletionTracker>,

    /// Whether submit waits for the command to finish
    blocking: AtomicBool,

    /// Lifecycle state
    state: Mutex<SessionState>,

    /// Reader thread, joined on close
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("pty", &self.pty)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a session running the default shell (`/bin/bash`).
    ///
    /// # Example
    /// ```no_run
    /// use shellsh_session::Session;
    ///
    /// # fn example() -> shellsh_core::Result<()> {
    /// let session = Session::create("demo")?;
    /// session.submit("cd /tmp && export GREETING=hi")?;
    /// session.submit("echo $GREETING from $(pwd)")?;
    /// session.wait(None)?;
    /// println!("{}", session.flush());
    /// session.close();
    /// # Ok(())
    /// # }
    /// ```
    pub fn create(name: impl Into<String>) -> Result<Self> {
        Self::create_with_config(name, ShellConfig::default())
    }

    /// Start a session with an explicit configuration.
    pub fn create_with_config(name: impl Into<String>, config: ShellConfig) -> Result<Self> {
        let name = name.into();
        config.validate()?;
        info!(
            "Creating session: name='{}', shell='{}', blocking={}",
            name, config.shell, config.blocking
        );

        let pty = PtyHandle::spawn(&config)?;
        let output = Arc::new(ReaderState::new());

        let handle = match pty
            .reader()
            .and_then(|r| reader::spawn(&name, r, Arc::clone(&output), &config.timing))
        {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to start output reader for '{}': {}", name, e);
                if let Err(kill_err) = pty.terminate(config.timing.close_grace()) {
                    warn!("Cleanup after failed start reported: {}", kill_err);
                }
                pty.release();
                return Err(e);
            }
        };

        let session = Self {
            tracker: Mutex::new(CompletionTracker::new(config.marker_prefix.clone())),
            blocking: AtomicBool::new(config.blocking),
            state: Mutex::new(SessionState::Created),
            reader: Mutex::new(Some(handle)),
            name,
            config,
            pty,
            output,
        };
        session.transition(SessionState::Running);

        info!(
            "Session created successfully: name='{}', pid={:?}",
            session.name,
            session.pty.pid()
        );
        Ok(session)
    }

    /// Get the session name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration the session was created with.
    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Shell process id.
    pub fn pid(&self) -> Option<u32> {
        self.pty.pid()
    }

    /// Whether the reader has seen the shell go away.
    ///
    /// Once true, `submit`, `wait` and `interrupt` fail with
    /// [`Error::SessionTerminated`]; already captured output can still be
    /// flushed.
    pub fn has_exited(&self) -> bool {
        self.output.has_exited()
    }

    /// Whether `submit` blocks until the command looks finished.
    pub fn is_blocking(&self) -> bool {
        self.blocking.load(Ordering::Relaxed)
    }

    /// Set blocking mode for subsequent `submit` calls.
    pub fn set_blocking(&self, blocking: bool) {
        debug!("Session '{}' blocking mode: {}", self.name, blocking);
        self.blocking.store(blocking, Ordering::Relaxed);
    }

    /// Number of submitted commands whose completion has not been observed.
    pub fn pending_count(&self) -> usize {
        lock(&self.tracker).pending_count()
    }

    /// Snapshot of the session's observable state.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            name: self.name.clone(),
            state: self.state(),
            pid: self.pid(),
            blocking: self.is_blocking(),
            pending_markers: self.pending_count(),
            exited: self.has_exited(),
        }
    }

    /// Submit a command line to the shell.
    ///
    /// The command is followed by a line printing a fresh completion marker.
    /// In non-blocking mode this returns [`Completion::Pending`] right away.
    /// In blocking mode it polls until the marker shows up
    /// ([`Completion::Completed`]), the output stays quiet for the idle
    /// threshold ([`Completion::Idle`], marker still pending), or the ceiling
    /// passes ([`Completion::TimedOut`]).
    pub fn submit(&self, command: &str) -> Result<Completion> {
        self.ensure_running()?;
        debug!("Submitting to '{}': {:?}", self.name, command);

        let mut line = String::with_capacity(command.len() + 1);
        line.push_str(command);
        line.push('\n');
        self.write(line.as_bytes())?;

        let marker = {
            let mut tracker = lock(&self.tracker);
            self.observe(&mut tracker);
            tracker.issue()
        };
        debug!("Issued marker {} for session '{}'", marker, self.name);
        self.write(marker.echo_line().as_bytes())?;

        if !self.is_blocking() {
            return Ok(Completion::Pending);
        }
        self.block_until_settled()
    }

    /// Poll for completion on behalf of a blocking submit.
    fn block_until_settled(&self) -> Result<Completion> {
        let timing = &self.config.timing;
        let start = Instant::now();
        thread::sleep(timing.warmup());

        loop {
            if self.resolve_markers() {
                return Ok(Completion::Completed);
            }
            if self.has_exited() {
                return Err(Error::SessionTerminated);
            }

            let idle = self.output.buffer().idle_for();
            if idle >= timing.idle_threshold() {
                debug!(
                    "Session '{}' idle for {:?}, returning before marker",
                    self.name, idle
                );
                return Ok(Completion::Idle);
            }
            if start.elapsed() >= timing.blocking_timeout() {
                warn!(
                    "Blocking submit on '{}' timed out after {:?}",
                    self.name,
                    timing.blocking_timeout()
                );
                return Ok(Completion::TimedOut);
            }

            thread::sleep(timing.wait_poll_interval());
        }
    }

    /// Block until every submitted command has finished.
    ///
    /// Returns `Ok(true)` once the newest pending marker has been observed,
    /// or right away when nothing is pending. Returns `Ok(false)` when
    /// `timeout` elapses first; the markers stay pending so a later `wait` or
    /// [`Session::is_alive`] can still resolve them.
    ///
    /// Markers are looked for in unflushed output only: flushing the
    /// marker's line away before calling `wait` makes that command's
    /// completion undetectable, apart from a later command's marker.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
        if self.state() != SessionState::Running {
            return Err(Error::SessionTerminated);
        }

        let poll = self.config.timing.wait_poll_interval();
        let start = Instant::now();

        loop {
            if self.resolve_markers() {
                return Ok(true);
            }
            if self.has_exited() {
                return Err(Error::SessionTerminated);
            }

            let sleep_for = match timeout {
                Some(limit) => {
                    let elapsed = start.elapsed();
                    if elapsed >= limit {
                        debug!("Wait on '{}' timed out after {:?}", self.name, elapsed);
                        return Ok(false);
                    }
                    poll.min(limit - elapsed)
                }
                None => poll,
            };
            thread::sleep(sleep_for);
        }
    }

    /// Non-blocking completion check.
    ///
    /// True while a submitted command has not been seen to finish. False
    /// when nothing is pending, once the pending markers appear in the
    /// output, or when the session is closed or its shell is gone.
    pub fn is_alive(&self) -> bool {
        if self.state() != SessionState::Running {
            return false;
        }
        if self.resolve_markers() {
            return false;
        }
        !self.has_exited()
    }

    /// Take all output captured since the last flush.
    ///
    /// Returns an empty string when nothing has accumulated. Never fails,
    /// also not after close.
    pub fn flush(&self) -> String {
        self.output.buffer().drain()
    }

    /// Send Ctrl-C to the shell's foreground job.
    ///
    /// The terminal discards typed-ahead input when it delivers the
    /// interrupt, which includes the marker line of the interrupted command.
    /// That line is therefore written again, so `wait` and `is_alive` still
    /// see the command finish.
    pub fn interrupt(&self) -> Result<()> {
        self.ensure_running()?;
        info!("Interrupting foreground job of session '{}'", self.name);
        self.write(&[INTERRUPT])?;

        let newest = lock(&self.tracker).newest().cloned();
        if let Some(marker) = newest {
            thread::sleep(self.config.timing.wait_poll_interval());
            debug!("Re-sending marker {} after interrupt", marker);
            self.write(marker.echo_line().as_bytes())?;
        }
        Ok(())
    }

    /// Close the session.
    ///
    /// Stops the reader, sends the shell's process groups a termination
    /// signal, waits up to the configured grace period, kills them if they
    /// are still running, and releases the PTY. Output captured before the
    /// close can still be flushed. Calling `close` again does nothing.
    pub fn close(&self) {
        {
            let mut state = lock(&self.state);
            if *state == SessionState::Closed {
                debug!("Session '{}' already closed", self.name);
                return;
            }
            info!(
                "Session state changed: name='{}', {:?} → {:?}",
                self.name,
                *state,
                SessionState::Closed
            );
            *state = SessionState::Closed;
        }

        info!("Closing session: name='{}'", self.name);
        self.output.stop();

        match self.pty.terminate(self.config.timing.close_grace()) {
            Ok(outcome) => debug!("Shell of '{}' terminated: {:?}", self.name, outcome),
            Err(e) => warn!("Failed to terminate shell of '{}': {}", self.name, e),
        }

        if let Some(handle) = lock(&self.reader).take() {
            if handle.join().is_err() {
                warn!("Output reader of '{}' panicked", self.name);
            }
        }

        self.pty.release();
        lock(&self.tracker).clear();
        info!("Session closed: name='{}'", self.name);
    }

    fn transition(&self, next: SessionState) {
        let mut state = lock(&self.state);
        if !state.can_transition_to(next) {
            warn!(
                "Ignoring invalid state change: name='{}', {:?} → {:?}",
                self.name, *state, next
            );
            return;
        }
        info!(
            "Session state changed: name='{}', {:?} → {:?}",
            self.name, *state, next
        );
        *state = next;
    }

    fn ensure_running(&self) -> Result<()> {
        if self.state() != SessionState::Running || self.has_exited() {
            return Err(Error::SessionTerminated);
        }
        Ok(())
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        match self.pty.write(data) {
            Ok(_) => Ok(()),
            Err(_) if self.has_exited() => Err(Error::SessionTerminated),
            Err(e) => Err(e),
        }
    }

    /// Resolve markers visible in unflushed output. Returns true when none
    /// remain pending.
    fn resolve_markers(&self) -> bool {
        let mut tracker = lock(&self.tracker);
        self.observe(&mut tracker);
        !tracker.is_pending()
    }

    fn observe(&self, tracker: &mut CompletionTracker) {
        if !tracker.is_pending() {
            return;
        }
        let resolved = tracker.observe_output(&self.output.buffer());
        if resolved > 0 {
            debug!(
                "Session '{}' resolved {} marker(s), {} pending",
                self.name,
                resolved,
                tracker.pending_count()
            );
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
