//! Build configuration (`build.json`).

use super::{read_config, resolve_dirs};
use crate::paths;
use anyhow::{Context, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// One of the two working trees a build produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Production,
    Staging,
}

impl Stage {
    /// Packaging order.
    pub const ALL: [Self; 2] = [Self::Production, Self::Staging];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDirs {
    pub production: PathBuf,
    pub staging: PathBuf,
}

impl WorkingDirs {
    fn under(base: &Path) -> Self {
        Self {
            production: base.join(Stage::Production.as_str()),
            staging: base.join(Stage::Staging.as_str()),
        }
    }

    pub fn get(&self, stage: Stage) -> &Path {
        match stage {
            Stage::Production => &self.production,
            Stage::Staging => &self.staging,
        }
    }
}

/// Resolved build directories. All paths are absolute.
#[derive(Debug, Clone)]
pub struct BuildDirs {
    pub app_root: PathBuf,
    pub build: PathBuf,
    pub output: PathBuf,
    pub working: WorkingDirs,
    /// Remaining `dirs` entries, resolved but otherwise unused by the build.
    pub extra: BTreeMap<String, PathBuf>,
}

/// A file or directory to copy into the production tree.
#[derive(Debug, Clone, Deserialize)]
pub struct FileCopy {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// A nested template that gets function code and config inlined.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDef {
    pub template_file: PathBuf,
    pub config: PathBuf,
    /// Code files in document order, keyed by the name used in the template.
    #[serde(default, deserialize_with = "ordered_paths")]
    pub code_files: Vec<(String, PathBuf)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageInfo {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct RawBuildConfig {
    dirs: BTreeMap<String, PathBuf>,
    #[serde(default)]
    files: Vec<FileCopy>,
    #[serde(default)]
    functions: Vec<FunctionDef>,
    package: PackageInfo,
}

fn ordered_paths<'de, D>(deserializer: D) -> Result<Vec<(String, PathBuf)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
    map.into_iter()
        .map(|(name, value)| match value {
            serde_json::Value::String(path) => Ok((name, PathBuf::from(path))),
            other => Err(D::Error::custom(format!(
                "code file \"{name}\" must be a path, found {other}"
            ))),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub dirs: BuildDirs,
    pub files: Vec<FileCopy>,
    pub functions: Vec<FunctionDef>,
    pub package: PackageInfo,
}

impl BuildConfig {
    /// Load and resolve a build configuration file.
    pub fn load(app_root: &Path, file: &Path, work_dir: Option<&Path>) -> Result<Self> {
        let raw: RawBuildConfig = read_config("Build", file)?;
        Self::resolve(app_root, raw, work_dir)
    }

    /// Parse and resolve build configuration from a JSON string.
    #[cfg(test)]
    pub fn parse(app_root: &Path, json: &str, work_dir: Option<&Path>) -> Result<Self> {
        let raw: RawBuildConfig =
            serde_json::from_str(json).context("Invalid build configuration")?;
        Self::resolve(app_root, raw, work_dir)
    }

    fn resolve(app_root: &Path, raw: RawBuildConfig, work_dir: Option<&Path>) -> Result<Self> {
        let mut extra = resolve_dirs(app_root, raw.dirs);
        let build = extra
            .remove("build")
            .context("Build configuration has no \"build\" entry in \"dirs\"")?;

        let working = match work_dir {
            Some(dir) => WorkingDirs::under(&paths::resolve(app_root, dir)),
            None => WorkingDirs::under(&build.join("working")),
        };

        Ok(Self {
            dirs: BuildDirs {
                app_root: app_root.to_path_buf(),
                output: build.join("output"),
                build,
                working,
                extra,
            },
            files: raw.files,
            functions: raw.functions,
            package: raw.package,
        })
    }

    pub fn production_dir(&self) -> &Path {
        &self.dirs.working.production
    }

    pub fn staging_dir(&self) -> &Path {
        &self.dirs.working.staging
    }
}
