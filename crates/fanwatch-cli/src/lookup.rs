//! Best-effort process and descriptor lookups for display.
//!
//! The process may already have exited and the file may already be gone,
//! so every lookup returns `None` instead of an error.

use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

use fanwatch_common::constants::PROC_ROOT;

/// Reads `/proc/<pid>/comm`.
pub fn process_name(pid: i32) -> Option<String> {
    process_name_in(Path::new(PROC_ROOT), pid)
}

fn process_name_in(proc_root: &Path, pid: i32) -> Option<String> {
    let path = proc_root.join(pid.to_string()).join("comm");
    match std::fs::read_to_string(&path) {
        Ok(name) => Some(name.trim_end().to_owned()).filter(|name| !name.is_empty()),
        Err(err) => {
            tracing::trace!(pid, error = %err, "process name lookup failed");
            None
        }
    }
}

/// Resolves an open descriptor of this process to the path it refers to.
pub fn descriptor_path(fd: RawFd) -> Option<PathBuf> {
    if fd < 0 {
        return None;
    }
    let link = Path::new(PROC_ROOT).join("self/fd").join(fd.to_string());
    match std::fs::read_link(&link) {
        Ok(target) => Some(target),
        Err(err) => {
            tracing::trace!(fd, error = %err, "descriptor path lookup failed");
            None
        }
    }
}
