//! Filesystem helpers for assembling and walking working trees.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Copy a directory tree into `dest`, creating it when missing.
///
/// Existing files are overwritten. Returns the number of files copied.
pub fn copy_tree(source: &Path, dest: &Path) -> Result<usize> {
    let mut copied = 0;

    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();
        let rel_path = path.strip_prefix(source).unwrap_or(path);
        let dest_path = dest.join(rel_path);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path)
                .with_context(|| format!("Could not create {}", dest_path.display()))?;
        } else {
            copy_file(path, &dest_path)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Copy a single file, creating the parent directories of `dest`.
pub fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    fs::copy(source, dest).with_context(|| {
        format!("Could not copy {} to {}", source.display(), dest.display())
    })?;
    Ok(())
}

/// Copy a file or directory the way `build copy` does.
///
/// A directory source is merged into `target`. A file source whose target
/// is an existing directory lands at `<target>/<file name>`. Returns the
/// final destination.
pub fn copy_entry(source: &Path, target: &Path) -> Result<PathBuf> {
    if !source.exists() {
        bail!("Source does not exist: {}", source.display());
    }

    if source.is_dir() {
        copy_tree(source, target)?;
        return Ok(target.to_path_buf());
    }

    let dest = match source.file_name() {
        Some(name) if target.is_dir() => target.join(name),
        _ => target.to_path_buf(),
    };
    copy_file(source, &dest)?;
    Ok(dest)
}

/// All files below `root`, sorted.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to list {}", root.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Blob name for a file: its path relative to `root`, `/` separated.
pub fn blob_name(root: &Path, file: &Path) -> Result<String> {
    let rel_path = file
        .strip_prefix(root)
        .with_context(|| format!("{} is not below {}", file.display(), root.display()))?;

    let parts: Vec<String> = rel_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
