// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-aware data directory resolution.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Return the application data directory, creating it if needed.
///
/// On mobile the platform bridge should provide the app's files directory
/// instead.
pub fn data_dir() -> PathBuf {
    let base = base_dir(
        std::env::var_os("XDG_DATA_HOME").as_deref().map(Path::new),
        std::env::var_os("HOME").as_deref().map(Path::new),
    );
    let dir = base.join("jobwerk");
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!(path = %dir.display(), error = %e, "could not create data directory");
    }
    dir
}

/// XDG data dir, then `~/.local/share`, then `/tmp`.
fn base_dir(xdg_data_home: Option<&Path>, home: Option<&Path>) -> PathBuf {
    match (xdg_data_home, home) {
        (Some(xdg), _) if !xdg.as_os_str().is_empty() => xdg.to_path_buf(),
        (_, Some(home)) if !home.as_os_str().is_empty() => home.join(".local").join("share"),
        _ => PathBuf::from("/tmp"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_xdg_then_home_then_tmp() {
        assert_eq!(
            base_dir(Some(Path::new("/xdg")), Some(Path::new("/home/u"))),
            PathBuf::from("/xdg")
        );
        assert_eq!(
            base_dir(None, Some(Path::new("/home/u"))),
            PathBuf::from("/home/u/.local/share")
        );
        assert_eq!(base_dir(Some(Path::new("")), None), PathBuf::from("/tmp"));
    }
}
