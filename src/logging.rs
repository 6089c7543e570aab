//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; binaries and test harnesses decide
//! where they go. `RUST_LOG` overrides the level chosen here.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Off,
    Stdout,
    Stderr,
    File(PathBuf),
}

impl FromStr for LogTarget {
    type Err = std::convert::Infallible;

    /// `0`/`off`, `1`/`stdout`, `2`/`stderr`, anything else is a file name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "0" | "off" => LogTarget::Off,
            "1" | "stdout" => LogTarget::Stdout,
            "2" | "stderr" => LogTarget::Stderr,
            filename => LogTarget::File(PathBuf::from(filename)),
        })
    }
}

pub fn level(verbose: bool) -> Level {
    if verbose { Level::DEBUG } else { Level::INFO }
}

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level(verbose).as_str().to_ascii_lowercase()))
}

/// Install the global subscriber. Does nothing if one is already installed.
pub fn init(target: &LogTarget, verbose: bool) -> std::io::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(filter(verbose));
    let result = match target {
        LogTarget::Off => return Ok(()),
        LogTarget::Stdout => builder.with_writer(std::io::stdout).try_init(),
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .try_init()
        }
    };
    if let Err(e) = result {
        tracing::debug!("tracing subscriber already installed: {e}");
    }
    Ok(())
}

/// Send logs to the test harness' captured output.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(true))
        .with_test_writer()
        .try_init();
}
