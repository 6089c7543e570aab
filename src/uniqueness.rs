//! Deriving uniqueness tokens from timestamps.
//!
//! A token identifies the version of the template-building logic. When the
//! caller does not supply one, the modification time of the test executable
//! is used, so recompiling the tests triggers a template rebuild.

use crate::error::Result;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Format a timestamp as a token, e.g. `2024-03-01T101530`.
pub fn from_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H%M%S").to_string()
}

/// Token from the last modification time of a file.
pub fn from_last_modified(path: &Path) -> Result<String> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(from_timestamp(DateTime::<Utc>::from(modified)))
}

/// Token from the last modification time of the running executable.
pub fn from_current_exe() -> Result<String> {
    let exe = std::env::current_exe()?;
    from_last_modified(&exe)
}
