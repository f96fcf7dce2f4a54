//! Local control file tracking resource group iterations.
//!
//! Each deploy removes `<name>-<N>` and creates `<name>-<N+1>`, so the
//! previous group can be torn down while the next one is provisioned. The
//! counter for every base name lives in `<app_root>/.deploy`:
//!
//! ```json
//! { "chef-ama": { "iteration": 3 } }
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Control file name, relative to the application root.
pub const CONTROL_FILE: &str = ".deploy";

/// Path of the control file for an application root.
pub fn control_file_path(app_root: &Path) -> PathBuf {
    app_root.join(CONTROL_FILE)
}

/// Resource group name for an iteration.
pub fn group_name(base: &str, iteration: u64) -> String {
    format!("{base}-{iteration}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iteration {
    pub iteration: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlFile {
    groups: BTreeMap<String, Iteration>,
}

impl ControlFile {
    /// Create the control file with iteration 1 for `name` if it does not exist.
    pub fn ensure(path: &Path, name: &str) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        log::info!("Creating control file: {}", path.display());

        let mut control = Self::default();
        control
            .groups
            .insert(name.to_string(), Iteration { iteration: 1 });
        control.save(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read control file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid control file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string(self)?;
        fs::write(path, content)
            .with_context(|| format!("Could not write control file {}", path.display()))
    }

    /// Current iteration for a base name.
    pub fn iteration(&self, name: &str) -> Option<u64> {
        self.groups.get(name).map(|entry| entry.iteration)
    }

    /// Increment the iteration for `name`, starting from 0 when it has no
    /// entry, and return `(previous, next)`.
    pub fn advance(&mut self, name: &str) -> Result<(u64, u64)> {
        let previous = self.iteration(name).unwrap_or(0);
        let Some(next) = previous.checked_add(1) else {
            bail!("Iteration for {name} cannot go past {previous}");
        };
        self.groups
            .insert(name.to_string(), Iteration { iteration: next });
        Ok((previous, next))
    }
}
