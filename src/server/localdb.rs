//! [`InstanceController`] backed by the `sqllocaldb` command line tool.

use super::{InstanceController, InstanceInfo};
use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Drives LocalDB instances through `sqllocaldb`.
#[derive(Debug, Clone)]
pub struct SqlLocalDb {
    program: String,
}

impl Default for SqlLocalDb {
    fn default() -> Self {
        Self {
            program: "sqllocaldb".to_string(),
        }
    }
}

/// Captured output of one tool invocation.
struct ToolOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl SqlLocalDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable (e.g. a full path to `SqlLocalDB.exe`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn run(&self, args: &[&str]) -> Result<ToolOutput> {
        debug!(program = %self.program, ?args, "running localdb tool");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::instance(format!("Failed to run {}: {}", self.program, e)))?;

        Ok(ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run_checked(&self, verb: &str, name: &str) -> Result<()> {
        let output = self.run(&[verb, name]).await?;
        if output.success {
            return Ok(());
        }
        let detail = output.stderr.trim();
        let detail = if detail.is_empty() {
            output.stdout.trim()
        } else {
            detail
        };
        Err(Error::instance(format!(
            "sqllocaldb {} \"{}\" failed: {}",
            verb,
            name,
            if detail.is_empty() { "(no output)" } else { detail }
        )))
    }
}

#[async_trait]
impl InstanceController for SqlLocalDb {
    async fn info(&self, name: &str) -> Result<InstanceInfo> {
        let output = self.run(&["info", name]).await?;
        Ok(parse_info(&output.stdout, output.success))
    }

    async fn create(&self, name: &str) -> Result<()> {
        self.run_checked("create", name).await
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.run_checked("start", name).await
    }

    async fn stop(&self, name: &str) -> Result<()> {
        // stopping an instance that is not running is fine
        if !self.info(name).await?.is_running {
            return Ok(());
        }
        self.run_checked("stop", name).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        if !self.info(name).await?.exists {
            return Ok(());
        }
        self.run_checked("delete", name).await
    }
}

/// Interpret `sqllocaldb info <name>` output.
///
/// A missing instance makes the tool fail (or print nothing useful); an
/// existing one prints `Name:` and `State:` lines.
pub fn parse_info(stdout: &str, success: bool) -> InstanceInfo {
    if !success {
        return InstanceInfo::ABSENT;
    }

    let mut exists = false;
    let mut is_running = false;
    for line in stdout.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "Name" => exists = true,
            "State" => is_running = value.trim().eq_ignore_ascii_case("running"),
            _ => {}
        }
    }

    InstanceInfo { exists, is_running }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::InstanceState;

    const RUNNING: &str = "Name:               Tests
Version:            15.0.4153.1
Shared name:
Owner:              MACHINE\\user
Auto-create:        No
State:              Running
Last start time:    1/01/2024 10:00:00 AM
Instance pipe name: np:\\\\.\\pipe\\LOCALDB#ABC\\tsql\\query
";

    #[test]
    fn test_parse_running() {
        assert_eq!(parse_info(RUNNING, true).state(), InstanceState::Running);
    }

    #[test]
    fn test_parse_stopped() {
        let stopped = RUNNING.replace("Running", "Stopped");
        assert_eq!(parse_info(&stopped, true).state(), InstanceState::Stopped);
    }

    #[test]
    fn test_parse_missing() {
        assert_eq!(
            parse_info("LocalDB instance \"Tests\" doesn't exist!", false),
            InstanceInfo::ABSENT
        );
        assert_eq!(parse_info("", true), InstanceInfo::ABSENT);
    }

    #[tokio::test]
    async fn test_missing_tool_is_an_instance_error() {
        let localdb = SqlLocalDb::new().with_program("definitely-not-sqllocaldb-xyz");
        let err = localdb.create("Tests").await.unwrap_err();
        assert!(matches!(err, Error::Instance(_)));
    }
}
