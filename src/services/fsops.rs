//! Filesystem helpers for the update pipeline: lock-tolerant removal,
//! recursive copies, and the config-file scan used by preserve/restore.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use crate::config::CONFIG;
use crate::services::retry::retry_transient;

/// File extensions treated as server configuration when scanning the
/// installation subtree
pub const CONFIG_EXTENSIONS: &[&str] =
    &["json", "yml", "yaml", "toml", "properties", "conf", "cfg"];

/// Lock-class errors: antivirus scanners, lingering OS handles, delayed
/// process exit. Raw os errors 32/33 are the Windows sharing/lock violations.
pub fn is_lock_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock
    ) || matches!(err.raw_os_error(), Some(32) | Some(33))
}

/// Whether a path looks like a recognized config file
pub fn is_config_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| CONFIG_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

async fn remove_path(path: &Path) -> io::Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        // Already gone: removal is idempotent so cleanup paths can double-fire
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove a file or directory tree, retrying lock-class errors with the
/// configured bounded backoff. Missing paths are not an error.
pub async fn remove_path_with_retry(path: &Path) -> io::Result<()> {
    retry_transient(
        CONFIG.updates.remove_retry_attempts,
        Duration::from_millis(CONFIG.updates.remove_retry_backoff_ms),
        is_lock_error,
        || remove_path(path),
    )
    .await
}

/// Recursively copy a directory tree. Existing files at the destination are
/// overwritten; extra destination files are left alone.
pub fn copy_dir_all<'a>(
    src: &'a Path,
    dst: &'a Path,
) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(dst).await?;

        let mut entries = tokio::fs::read_dir(src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let src_path = entry.path();
            let dst_path = dst.join(entry.file_name());

            if entry.file_type().await?.is_dir() {
                copy_dir_all(&src_path, &dst_path).await?;
            } else {
                tokio::fs::copy(&src_path, &dst_path).await?;
            }
        }

        Ok(())
    })
}

/// Copy a single path, file or directory, creating parent directories at the
/// destination as needed.
pub async fn copy_path(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let meta = tokio::fs::metadata(src).await?;
    if meta.is_dir() {
        copy_dir_all(src, dst).await
    } else {
        tokio::fs::copy(src, dst).await.map(|_| ())
    }
}

/// Find every recognized config file under `root`, returned as paths relative
/// to `root`, in no particular order.
pub async fn find_config_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk_config_files(root, PathBuf::new(), &mut found).await?;
    Ok(found)
}

fn walk_config_files<'a>(
    dir: &'a Path,
    rel: PathBuf,
    found: &'a mut Vec<PathBuf>,
) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let entry_rel = rel.join(entry.file_name());

            if entry.file_type().await?.is_dir() {
                walk_config_files(&path, entry_rel, found).await?;
            } else if is_config_file(&path) {
                found.push(entry_rel);
            }
        }
        Ok(())
    })
}
