//! PTY (Pseudo-Terminal) handling with portable-pty.

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use shellsh_core::{Error, Result, ShellConfig};

use crate::reader::PtyReader;

/// How often `terminate` checks whether the child has exited.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How [`PtyHandle::terminate`] ended the child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The child had already exited before termination was requested
    AlreadyExited,
    /// The child exited within the grace period
    Exited,
    /// The child had to be killed after the grace period
    Killed,
}

/// Owns the PTY master and the shell process bound to its subordinate side.
pub struct PtyHandle {
    /// The master PTY end (None once released)
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    /// PTY writer (None once released)
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    /// The shell process
    child: Mutex<Box<dyn Child + Send + Sync>>,
    /// Shell pid, which is also its process group and session id
    pid: Option<u32>,
}

impl std::fmt::Debug for PtyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyHandle")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl PtyHandle {
    /// Allocate a PTY and spawn the configured shell on it.
    ///
    /// The shell gets the subordinate side as stdin, stdout and stderr, and
    /// runs as the leader of a new session and process group. The parent's
    /// copy of the subordinate side is closed before returning, so the master
    /// sees a hangup once the shell and its descendants are gone.
    ///
    /// # Example
    /// ```no_run
    /// use shellsh_core::ShellConfig;
    /// use shellsh_pty::PtyHandle;
    ///
    /// # fn example() -> shellsh_core::Result<()> {
    /// let pty = PtyHandle::spawn(&ShellConfig::default())?;
    /// pty.write(b"echo hello\n")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn spawn(config: &ShellConfig) -> Result<Self> {
        info!(
            "Spawning PTY: shell='{}' args={:?}, dimensions={}x{}, cwd={:?}",
            config.shell,
            config.args,
            config.terminal.rows,
            config.terminal.cols,
            config.working_directory
        );

        let pty_system = native_pty_system();

        let pty_size = PtySize {
            rows: config.terminal.rows,
            cols: config.terminal.cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        debug!("Opening PTY with native system");
        let pair = pty_system.openpty(pty_size).map_err(|e| {
            error!("Failed to open PTY: {}", e);
            Error::Spawn(format!("Failed to open PTY: {e}"))
        })?;

        let mut cmd = CommandBuilder::new(&config.shell);
        cmd.args(&config.args);
        cmd.env("TERM", &config.terminal.term);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &config.working_directory {
            debug!("Setting working directory to: {}", dir);
            cmd.cwd(dir);
        }

        debug!("Spawning child process: {}", config.shell);
        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            error!("Failed to spawn shell '{}': {}", config.shell, e);
            Error::Spawn(format!("Failed to spawn '{}': {e}", config.shell))
        })?;

        // The child holds its own copy of the subordinate side.
        drop(pair.slave);

        let writer = pair.master.take_writer().map_err(|e| {
            error!("Failed to take PTY writer: {}", e);
            Error::Spawn(format!("Failed to take writer: {e}"))
        })?;

        let pid = child.process_id();
        info!("PTY spawned successfully: shell='{}' pid={:?}", config.shell, pid);

        Ok(Self {
            master: Mutex::new(Some(pair.master)),
            writer: Mutex::new(Some(writer)),
            child: Mutex::new(child),
            pid,
        })
    }

    /// Shell process id.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Create an independent reader on the master.
    pub fn reader(&self) -> Result<PtyReader> {
        let master = lock(&self.master)?;
        let master = master
            .as_ref()
            .ok_or_else(|| Error::Pty("PTY master already released".to_string()))?;
        let fd = master
            .as_raw_fd()
            .ok_or_else(|| Error::Pty("PTY master has no file descriptor".to_string()))?;
        PtyReader::from_master_fd(fd)
    }

    /// Write data to the PTY.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        debug!("Writing {} bytes to PTY", data.len());
        let mut writer = lock(&self.writer)?;
        let writer = writer
            .as_mut()
            .ok_or_else(|| Error::Pty("PTY writer already released".to_string()))?;

        writer.write_all(data)?;
        writer.flush()?;

        Ok(data.len())
    }

    /// Check if the child process is still running.
    pub fn is_alive(&self) -> bool {
        self.try_wait().is_none()
    }

    /// Exit code of the child if it has exited.
    pub fn try_wait(&self) -> Option<u32> {
        let mut child = match self.child.lock() {
            Ok(c) => c,
            Err(_) => return None,
        };
        match child.try_wait() {
            Ok(Some(status)) => Some(status.exit_code()),
            _ => None,
        }
    }

    /// Send `signal` to the shell's process group and, when different, to the
    /// terminal's foreground process group.
    ///
    /// Job-control shells run foreground commands in their own group, so
    /// signalling only the shell's group would miss them.
    pub fn signal(&self, signal: libc::c_int) -> Result<()> {
        let Some(pid) = self.pid else {
            return Err(Error::Pty("Shell pid unknown".to_string()));
        };
        let shell_group = pid as libc::pid_t;

        let mut groups = vec![shell_group];
        if let Some(fg) = self.foreground_group() {
            if fg > 0 && fg != shell_group {
                groups.push(fg);
            }
        }

        for group in groups {
            debug!("Sending signal {} to process group {}", signal, group);
            // SAFETY: kill(2) has no memory-safety preconditions.
            let rc = unsafe { libc::kill(-group, signal) };
            if rc == -1 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ESRCH) {
                    return Err(Error::Io(err));
                }
            }
        }

        Ok(())
    }

    fn foreground_group(&self) -> Option<libc::pid_t> {
        let master = self.master.lock().ok()?;
        let fd = master.as_ref()?.as_raw_fd()?;
        // SAFETY: `fd` belongs to the master we hold locked.
        let pgrp = unsafe { libc::tcgetpgrp(fd) };
        (pgrp > 0).then_some(pgrp)
    }

    /// Terminate the child process.
    ///
    /// Sends SIGTERM and SIGHUP to the process groups, waits up to `grace`
    /// for the shell to exit, then escalates to SIGKILL and reaps it.
    pub fn terminate(&self, grace: Duration) -> Result<Termination> {
        if !self.is_alive() {
            debug!("Child already exited, nothing to terminate");
            return Ok(Termination::AlreadyExited);
        }

        info!("Terminating PTY process: pid={:?}", self.pid);
        for sig in [libc::SIGTERM, libc::SIGHUP] {
            if let Err(e) = self.signal(sig) {
                warn!("Failed to send signal {}: {}", sig, e);
            }
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !self.is_alive() {
                info!("PTY process exited within grace period: pid={:?}", self.pid);
                return Ok(Termination::Exited);
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }

        warn!(
            "PTY process still running after {:?}, killing: pid={:?}",
            grace, self.pid
        );
        if let Err(e) = self.signal(libc::SIGKILL) {
            warn!("Failed to SIGKILL process group: {}", e);
        }

        let mut child = lock(&self.child)?;
        if let Err(e) = child.kill() {
            debug!("Direct kill after SIGKILL reported: {}", e);
        }
        child
            .wait()
            .map_err(|e| Error::Pty(format!("Wait failed: {e}")))?;

        Ok(Termination::Killed)
    }

    /// Release the writer and the master descriptor.
    ///
    /// Readers created by [`PtyHandle::reader`] keep their own descriptor.
    pub fn release(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            writer.take();
        }
        if let Ok(mut master) = self.master.lock() {
            if master.take().is_some() {
                debug!("Released PTY master: pid={:?}", self.pid);
            }
        }
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| Error::Pty(format!("Lock error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ReadOutcome;

    fn sh_config() -> ShellConfig {
        ShellConfig {
            shell: "/bin/sh".to_string(),
            ..Default::default()
        }
    }

    /// Read until `needle` shows up or the deadline passes.
    fn read_until(reader: &mut PtyReader, needle: &str, within: Duration) -> String {
        let deadline = Instant::now() + within;
        let mut output = Vec::new();
        let mut buf = [0u8; 4096];
        while Instant::now() < deadline {
            match reader.read_timeout(&mut buf, Duration::from_millis(100)) {
                Ok(ReadOutcome::Data(n)) => {
                    output.extend_from_slice(&buf[..n]);
                    if String::from_utf8_lossy(&output).contains(needle) {
                        break;
                    }
                }
                Ok(ReadOutcome::Timeout) => {}
                Ok(ReadOutcome::Eof) | Err(_) => break,
            }
        }
        String::from_utf8_lossy(&output).into_owned()
    }

    #[test]
    fn test_pty_spawn() {
        let pty = PtyHandle::spawn(&sh_config());
        assert!(pty.is_ok(), "Failed to spawn PTY: {:?}", pty.err());

        let pty = pty.unwrap();
        assert!(pty.is_alive());
        assert!(pty.pid().is_some());
        pty.terminate(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_pty_spawn_missing_shell() {
        let config = ShellConfig {
            shell: "/nonexistent/shell-for-tests".to_string(),
            ..Default::default()
        };
        let result = PtyHandle::spawn(&config);
        assert!(matches!(result, Err(Error::Spawn(_))));
    }

    #[test]
    fn test_pty_write_and_read() {
        let pty = PtyHandle::spawn(&sh_config()).unwrap();
        let mut reader = pty.reader().unwrap();

        pty.write(b"echo PTY_$((40 + 2))\n").unwrap();

        let output = read_until(&mut reader, "PTY_42", Duration::from_secs(5));
        assert!(output.contains("PTY_42"), "unexpected output: {output}");
        pty.terminate(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_pty_stderr_is_merged() {
        let pty = PtyHandle::spawn(&sh_config()).unwrap();
        let mut reader = pty.reader().unwrap();

        pty.write(b"echo ERR_$((1 + 1)) >&2\n").unwrap();

        let output = read_until(&mut reader, "ERR_2", Duration::from_secs(5));
        assert!(output.contains("ERR_2"), "unexpected output: {output}");
        pty.terminate(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_pty_env_and_cwd() {
        let config = ShellConfig {
            working_directory: Some("/".to_string()),
            env: vec![("SHELLSH_TEST_VAR".to_string(), "xyzzy".to_string())],
            ..sh_config()
        };
        let pty = PtyHandle::spawn(&config).unwrap();
        let mut reader = pty.reader().unwrap();

        pty.write(b"echo \"[$SHELLSH_TEST_VAR:$(pwd)]\"\n").unwrap();

        let output = read_until(&mut reader, "[xyzzy:/]", Duration::from_secs(5));
        assert!(output.contains("[xyzzy:/]"), "unexpected output: {output}");
        pty.terminate(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_pty_terminate() {
        let pty = PtyHandle::spawn(&sh_config()).unwrap();
        assert!(pty.is_alive());

        let outcome = pty.terminate(Duration::from_secs(2)).unwrap();
        assert!(matches!(outcome, Termination::Exited | Termination::Killed));
        assert!(!pty.is_alive());

        // A second termination finds nothing left to do
        let outcome = pty.terminate(Duration::from_secs(2)).unwrap();
        assert_eq!(outcome, Termination::AlreadyExited);
    }

    #[test]
    fn test_pty_terminate_escalates_to_kill() {
        let pty = PtyHandle::spawn(&sh_config()).unwrap();
        let mut reader = pty.reader().unwrap();

        pty.write(b"trap '' TERM HUP; echo TRAPS_SET\n").unwrap();
        let output = read_until(&mut reader, "TRAPS_SET", Duration::from_secs(5));
        assert!(output.contains("TRAPS_SET"));

        let start = Instant::now();
        let outcome = pty.terminate(Duration::from_millis(300)).unwrap();
        assert_eq!(outcome, Termination::Killed);
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(!pty.is_alive());
    }

    #[test]
    fn test_pty_exit_reaches_reader() {
        let pty = PtyHandle::spawn(&sh_config()).unwrap();
        let mut reader = pty.reader().unwrap();

        pty.write(b"exit 0\n").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut buf = [0u8; 4096];
        let mut ended = false;
        while Instant::now() < deadline {
            match reader.read_timeout(&mut buf, Duration::from_millis(100)) {
                Ok(ReadOutcome::Eof) | Err(_) => {
                    ended = true;
                    break;
                }
                _ => {}
            }
        }
        assert!(ended, "reader never observed the shell exit");

        let deadline = Instant::now() + Duration::from_secs(3);
        while pty.is_alive() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(pty.try_wait(), Some(0));
    }

    #[test]
    fn test_pty_release() {
        let pty = PtyHandle::spawn(&sh_config()).unwrap();
        pty.terminate(Duration::from_secs(2)).unwrap();
        pty.release();

        assert!(matches!(pty.write(b"echo nope\n"), Err(Error::Pty(_))));
        assert!(matches!(pty.reader(), Err(Error::Pty(_))));

        // Releasing twice is harmless
        pty.release();
    }
}
