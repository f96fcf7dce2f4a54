//! Zip packaging of the working trees.

use crate::config::Stage;
use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::path::Path;
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Pipeline facts that end up in the zip file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    /// `-nightly` for scheduled builds, empty otherwise.
    pub flag: &'static str,
    /// Lowercased source branch, or `local` outside a pipeline.
    pub branch: String,
}

impl BuildInfo {
    /// Read `BUILD_REASON` and `BUILD_SOURCEBRANCHNAME`.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("BUILD_REASON").ok().as_deref(),
            std::env::var("BUILD_SOURCEBRANCHNAME").ok().as_deref(),
        )
    }

    pub fn from_vars(reason: Option<&str>, branch: Option<&str>) -> Self {
        let flag = match reason {
            Some(reason) if reason.eq_ignore_ascii_case("schedule") => "-nightly",
            _ => "",
        };
        let branch = match branch {
            Some(branch) if !branch.is_empty() => branch.to_lowercase(),
            _ => "local".to_string(),
        };
        Self { flag, branch }
    }
}

/// `<name>-<version><flag>-<branch>-<stage>.zip`
pub fn package_file_name(name: &str, version: &str, info: &BuildInfo, stage: Stage) -> String {
    format!(
        "{name}-{version}{}-{}-{stage}.zip",
        info.flag, info.branch
    )
}

/// Zip the contents of `source` into `dest`. Entry names are relative to
/// `source` and `/` separated. Returns the number of files added.
pub fn zip_dir(source: &Path, dest: &Path) -> Result<usize> {
    if !source.is_dir() {
        anyhow::bail!("Directory to package does not exist: {}", source.display());
    }

    let file = File::create(dest).with_context(|| format!("Could not create {}", dest.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    let mut count = 0;

    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();
        let name = crate::fsutil::blob_name(source, path)?;

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else {
            zip.start_file(name, options)?;
            let mut input =
                File::open(path).with_context(|| format!("Could not open {}", path.display()))?;
            io::copy(&mut input, &mut zip)
                .with_context(|| format!("Could not add {} to archive", path.display()))?;
            count += 1;
        }
    }

    zip.finish()?;
    log::debug!("Wrote {} files to {}", count, dest.display());
    Ok(count)
}
