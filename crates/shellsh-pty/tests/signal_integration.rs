//! Integration tests for signalling a shell's jobs through the PTY handle.

use std::time::{Duration, Instant};

use shellsh_core::ShellConfig;
use shellsh_pty::{PtyHandle, PtyReader, ReadOutcome, Termination, SIGINT};

fn sh_config() -> ShellConfig {
    ShellConfig {
        shell: "/bin/sh".to_string(),
        ..Default::default()
    }
}

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
fn test_sigint_stops_foreground_command() {
    let pty = PtyHandle::spawn(&sh_config()).unwrap();
    let mut reader = pty.reader().unwrap();

    pty.write(b"sleep 30\n").unwrap();
    pty.write(b"echo AFTER_$((2 + 3))\n").unwrap();
    std::thread::sleep(Duration::from_millis(300));

    let start = Instant::now();
    pty.signal(SIGINT).unwrap();

    let output = read_until(&mut reader, "AFTER_5", Duration::from_secs(10));
    assert!(output.contains("AFTER_5"), "unexpected output: {output}");
    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(pty.is_alive());

    pty.terminate(Duration::from_secs(2)).unwrap();
}

#[test]
fn test_terminate_with_running_job() {
    let pty = PtyHandle::spawn(&sh_config()).unwrap();
    pty.write(b"sleep 30\n").unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let start = Instant::now();
    let outcome = pty.terminate(Duration::from_secs(2)).unwrap();

    assert_ne!(outcome, Termination::AlreadyExited);
    assert!(!pty.is_alive());
    assert!(start.elapsed() < Duration::from_secs(5));
    pty.release();
}
