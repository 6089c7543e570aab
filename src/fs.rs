//! File primitives used while building and cloning templates.

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

/// Copy `from` over `to`, replacing any stale file.
pub async fn copy_overwrite(from: &Path, to: &Path) -> std::io::Result<()> {
    remove_if_exists(to).await?;
    fs::copy(from, to).await?;
    Ok(())
}

/// Delete a file; a missing file is not an error.
pub async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Clear the read-only flag. Template files may be copied from a read-only source.
pub async fn mark_writable(path: &Path) -> std::io::Result<()> {
    let mut permissions = fs::metadata(path).await?.permissions();
    if !permissions.readonly() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o200);
    }
    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions).await
}

/// Remove everything inside `directory`, creating it if missing.
pub async fn flush_directory(directory: &Path) -> std::io::Result<()> {
    fs::create_dir_all(directory).await?;
    let mut entries = fs::read_dir(directory).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            if let Err(e) = mark_writable(&path).await {
                tracing::debug!(path = %path.display(), "could not clear read-only flag: {e}");
            }
            fs::remove_file(&path).await?;
        }
    }
    Ok(())
}

/// Remove a directory tree; a missing directory is not an error.
pub async fn remove_dir_if_exists(directory: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(directory).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Read a small text file, `None` when it does not exist.
pub async fn read_optional(path: &Path) -> std::io::Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
