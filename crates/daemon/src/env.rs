// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment overrides for daemon paths.

use std::path::PathBuf;

/// Root state directory.
///
/// `SR_STATE_DIR` wins; otherwise the platform state dir (falling back to
/// the local data dir), suffixed `subrelay`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SR_STATE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|dir| dir.join("subrelay"))
        .unwrap_or_else(|| PathBuf::from(".subrelay"))
}

/// Explicit config file path from `SR_CONFIG`, if set.
pub fn config_path() -> Option<PathBuf> {
    std::env::var("SR_CONFIG").ok().map(PathBuf::from)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
