// SPDX-License-Identifier: MIT

//! Directory deletion with immutable-file handling (spec.md §9,
//! "Directory deletion with immutable files"): try a plain recursive
//! unlink first; on a permission error, clear immutable/append-only
//! flags recursively via `chattr` and retry; treat post-subvolume-
//! delete `ENOENT` as success. Swapfiles under a machine's rootfs are
//! disabled before unlink.
//!
//! Shelling out to `chattr`/`swapoff` rather than issuing the
//! equivalent ioctls directly keeps this module free of `unsafe` (the
//! workspace denies it outright) and gives every failure path a
//! captured-stderr [`conman_core::Error::ExternalProcess`], exactly the
//! kind spec.md §7 reserves for "external utility (tar, cp, unsquashfs,
//! etc.) failed."

use conman_core::Error;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};

async fn run(program: &str, args: &[&str]) -> Result<(), Error> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| Error::ExternalProcess { program: program.to_string(), stderr: e.to_string() })?;
    if output.status.success() {
        Ok(())
    } else {
        Err(Error::ExternalProcess {
            program: program.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Best-effort: disable any swapfile under `dir` so unlinking it
/// doesn't race a live swap device. Failures are logged, never
/// propagated — a machine whose rootfs never enabled swap has nothing
/// to disable, and that is the common case.
async fn disable_swapfiles(dir: &Path) {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else { return };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_swap = path.file_name().map(|n| n.to_string_lossy().contains("swapfile")).unwrap_or(false);
        if is_swap {
            if let Err(e) = run("swapoff", &[&path.to_string_lossy()]).await {
                debug!(path = %path.display(), error = %e, "swapoff (likely not an active swap device)");
            }
        }
    }
}

/// Clear the immutable (`i`) and append-only (`a`) attributes
/// recursively, via `chattr -R -i -a`.
async fn clear_immutable_flags(dir: &Path) -> Result<(), Error> {
    run("chattr", &["-R", "-i", "-a", &dir.to_string_lossy()]).await
}

/// Delete a machine's data directory (spec.md §3 "Deleted" lifecycle,
/// §9). Tries a plain recursive remove first; on a permission error,
/// clears immutable/append-only flags and retries; `ENOENT` after that
/// retry (e.g. a filesystem-level subvolume delete already removed it
/// out from under us) is treated as success, not an error.
pub async fn delete_data_dir(dir: &Path) -> Result<(), Error> {
    disable_swapfiles(dir).await;

    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            warn!(dir = %dir.display(), "recursive delete hit a permission error, clearing immutable flags and retrying");
        }
        Err(e) => return Err(Error::ExternalProcess { program: "rmdir".to_string(), stderr: e.to_string() }),
    }

    clear_immutable_flags(dir).await?;

    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::ExternalProcess { program: "rmdir".to_string(), stderr: e.to_string() }),
    }
}

/// `fsync` a directory's own metadata (e.g. the parent of a just-
/// deleted data dir, per spec.md's "Deleted" lifecycle: "fsync the
/// parent dir").
pub async fn fsync_dir(dir: &Path) -> Result<(), Error> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let handle = std::fs::File::open(&dir)
            .map_err(|e| Error::ExternalProcess { program: "fsync".to_string(), stderr: e.to_string() })?;
        handle.sync_all().map_err(|e| Error::ExternalProcess { program: "fsync".to_string(), stderr: e.to_string() })
    })
    .await
    .map_err(|e| Error::ExternalProcess { program: "fsync".to_string(), stderr: e.to_string() })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deleting_an_already_absent_dir_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("never-created");
        delete_data_dir(&target).await.unwrap();
    }

    #[tokio::test]
    async fn deletes_a_populated_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("machine-data");
        tokio::fs::create_dir_all(target.join("rootfs")).await.unwrap();
        tokio::fs::write(target.join("rootfs/file.txt"), b"hello").await.unwrap();
        delete_data_dir(&target).await.unwrap();
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn fsync_on_a_directory_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        fsync_dir(dir.path()).await.unwrap();
    }
}
