// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Load and persist `config.json` in the data directory.

use std::path::{Path, PathBuf};

use jobwerk_core::JobwerkConfig;
use jobwerk_core::error::Result;
use tracing::{debug, warn};

const CONFIG_FILE: &str = "config.json";

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

/// Load the persisted config. A missing or unreadable file yields defaults.
pub fn load_config(data_dir: &Path) -> JobwerkConfig {
    let path = config_path(data_dir);
    let data = match std::fs::read_to_string(&path) {
        Ok(data) => data,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no config file, using defaults");
            return JobwerkConfig::default();
        }
    };
    serde_json::from_str(&data).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "malformed config file, using defaults");
        JobwerkConfig::default()
    })
}

pub fn persist_config(data_dir: &Path, config: &JobwerkConfig) -> Result<()> {
    let path = config_path(data_dir);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}
