//! JSON configuration for the build and deploy commands.
//!
//! Both files carry a `dirs` map whose relative entries are anchored at the
//! application root when the file is loaded.

pub mod build;
pub mod deploy;

pub use build::{BuildConfig, Stage};
pub use deploy::{Action, DeployConfig, DeployOverrides};

use crate::error::ExitError;
use crate::paths;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Read and parse a JSON config file.
///
/// A missing file is reported as [`ExitError::ConfigNotFound`].
fn read_config<T: DeserializeOwned>(kind: &'static str, path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(ExitError::ConfigNotFound {
            kind,
            path: path.to_path_buf(),
        }
        .into());
    }
    log::debug!(
        "Reading {} configuration: {}",
        kind.to_lowercase(),
        path.display()
    );

    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| {
        format!(
            "Invalid {} configuration: {}",
            kind.to_lowercase(),
            path.display()
        )
    })
}

/// Anchor every relative directory at the application root.
fn resolve_dirs(app_root: &Path, dirs: BTreeMap<String, PathBuf>) -> BTreeMap<String, PathBuf> {
    dirs.into_iter()
        .map(|(key, dir)| (key, paths::resolve(app_root, dir)))
        .collect()
}
