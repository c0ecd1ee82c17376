//! Mount point discovery for the watched path.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// Returns `true` if `path` is the root of a mount.
///
/// A path is a mount point when its parent lives on another device or when
/// it is its own parent. Symlinks are never mount points.
pub fn is_mount_point(path: &Path) -> bool {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return false;
    };
    if meta.file_type().is_symlink() {
        return false;
    }
    let Ok(parent) = std::fs::symlink_metadata(path.join("..")) else {
        return false;
    };
    meta.dev() != parent.dev() || meta.ino() == parent.ino()
}

/// Walks up from `path` to the nearest mount point.
///
/// Returns `None` if the walk reaches the top without finding one.
pub fn find_mount_point(path: &Path) -> Option<PathBuf> {
    let mut current = std::path::absolute(path).ok()?;
    loop {
        if is_mount_point(&current) {
            return Some(current);
        }
        current = current.parent()?.to_path_buf();
    }
}
