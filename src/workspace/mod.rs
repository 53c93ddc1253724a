//! Workspace acquisition and file discovery
//!
//! Remote targets are cloned into a fresh workspace directory; local
//! targets are evolved in place.

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Directories never descended into
const SKIP_DIRS: &[&str] = &[".git", "node_modules"];

/// Whether a target names a remote repository rather than a local path
pub fn is_remote(target: &str) -> bool {
    target.starts_with("https://")
        || target.starts_with("http://")
        || target.starts_with("ssh://")
        || target.starts_with("git@")
        || target.starts_with("file://")
}

/// Empty `dir` (removing any previous contents) and recreate it
pub fn prepare(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to clear workspace {}", dir.display()))?;
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create workspace {}", dir.display()))?;
    Ok(())
}

/// Clone `url` into a freshly prepared `dir`
pub fn clone_repo(url: &str, dir: &Path) -> Result<()> {
    if url.starts_with('-') {
        anyhow::bail!("Invalid repository URL '{}'", url);
    }
    prepare(dir)?;

    info!("Cloning {} into {}", url, dir.display());
    let output = Command::new("git")
        .args(["clone", "--quiet", "--"])
        .arg(url)
        .arg(dir)
        .output()
        .context("Failed to run git clone (is git installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git clone failed: {}", stderr.trim());
    }
    Ok(())
}

/// Resolve a target into the directory to evolve, cloning if needed
pub fn acquire(target: &str, workspace: &Path) -> Result<PathBuf> {
    if is_remote(target) {
        clone_repo(target, workspace)?;
        return Ok(workspace.to_path_buf());
    }

    let path = PathBuf::from(target);
    if !path.is_dir() {
        anyhow::bail!("Target '{}' is neither a repository URL nor a directory", target);
    }
    Ok(path)
}

/// All files under `root` with the given extension, as sorted paths
/// relative to `root`. `.git` and `node_modules` are skipped; ignore files
/// are not honoured.
pub fn list_candidate_files(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            !(is_dir && SKIP_DIRS.iter().any(|d| entry.file_name() == *d))
        })
        .build();

    let mut files = Vec::new();
    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        if let Ok(rel) = path.strip_prefix(root) {
            files.push(rel.to_path_buf());
        }
    }

    files.sort();
    debug!("Found {} .{} files under {}", files.len(), extension, root.display());
    Ok(files)
}
