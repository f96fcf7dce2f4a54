//! Centralized path resolution for amakit
//!
//! Every relative path in `build.json`, `deploy.json` and on the command line
//! is anchored at the application root: the checkout that holds the
//! templates, scripts and config files.
//!
//! # Application Root Priority
//!
//! 1. `--root` command line option
//! 2. `AMAKIT_ROOT` environment variable (read by clap)
//! 3. Current working directory

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for the application root override
pub const ENV_ROOT: &str = "AMAKIT_ROOT";

/// Default build configuration file name
pub const BUILD_CONFIG_FILE: &str = "build.json";

/// Default deploy configuration file name
pub const DEPLOY_CONFIG_FILE: &str = "deploy.json";

/// Get the application root
///
/// A relative override is taken relative to the current directory.
pub fn app_root(root: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Could not determine current directory")?;

    let path = match root {
        Some(root) => {
            let expanded = expand(&root.to_string_lossy());
            if expanded.is_absolute() {
                expanded
            } else {
                cwd.join(expanded)
            }
        }
        None => cwd,
    };

    log::debug!("Using application root: {}", path.display());
    Ok(path)
}

/// Resolve a path against a base directory.
///
/// `~` and environment variables are expanded first; absolute results are
/// returned unchanged.
pub fn resolve(base: &Path, path: impl AsRef<Path>) -> PathBuf {
    let expanded = expand(&path.as_ref().to_string_lossy());
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

/// Config file to use: the given one resolved against the root, or the default name.
pub fn config_file(root: &Path, given: Option<&Path>, default_name: &str) -> PathBuf {
    match given {
        Some(path) => resolve(root, path),
        None => root.join(default_name),
    }
}

/// Default location of the Azure service principal credentials file
pub fn default_credentials_file() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".azure").join("credentials"))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
