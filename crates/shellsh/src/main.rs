//! # shellsh
//!
//! Line-oriented front end for a persistent shell session.
//!
//! ## Overview
//!
//! Every line read from stdin is submitted to one long-lived shell, and the
//! output it produced is printed once the command finishes. A few lines are
//! handled by the front end itself:
//! - `:int` interrupts the running command
//! - `:info` prints the session state as JSON
//! - `:quit` (or end of input) closes the session
//!
//! ## Architecture
//!
//! This is Layer 3 - the binary that ties together:
//! - shellsh-core: Configuration and shared types
//! - shellsh-session: Session lifecycle and completion tracking

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{bail, Context};
use shellsh_core::ShellConfig;
use shellsh_session::Session;

/// Command line options.
#[derive(Debug, Default)]
struct Options {
    blocking: bool,
    config: Option<String>,
    name: Option<String>,
}

fn parse_args(args: &[String]) -> anyhow::Result<Options> {
    let mut options = Options::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--blocking" => options.blocking = true,
            "--config" => {
                let path = iter.next().context("--config requires a file path")?;
                options.config = Some(path.clone());
            }
            "--name" => {
                let name = iter.next().context("--name requires a label")?;
                options.name = Some(name.clone());
            }
            "-h" | "--help" => {
                println!("usage: shellsh [--blocking] [--config <file.yaml>] [--name <label>]");
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    Ok(options)
}

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = parse_args(&args)?;

    // Initialize logging on stderr so it stays out of the shell output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = match &options.config {
        Some(path) => ShellConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {path}"))?,
        None => ShellConfig::default(),
    };
    if options.blocking {
        config.blocking = true;
    }

    let name = options.name.unwrap_or_else(|| "shellsh".to_string());
    let wait_limit = config.timing.blocking_timeout();

    tracing::info!("shellsh v{} starting", env!("CARGO_PKG_VERSION"));
    let session = Session::create_with_config(name, config).context("Failed to start shell")?;

    let result = run(&session, wait_limit);
    session.close();

    tracing::info!("shellsh shutting down");
    result
}

fn run(session: &Session, wait_limit: Duration) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;

        match line.trim() {
            ":quit" => break,
            ":int" => session.interrupt()?,
            ":info" => {
                let info = serde_json::to_string_pretty(&session.info())?;
                writeln!(stdout, "{info}")?;
                continue;
            }
            _ => {
                let completion = session.submit(&line)?;
                tracing::debug!("Submit returned {:?}", completion);
            }
        }

        if !session.wait(Some(wait_limit))? {
            tracing::warn!("Command still running after {:?}", wait_limit);
        }
        write!(stdout, "{}", session.flush())?;
        stdout.flush()?;
    }

    Ok(())
}
