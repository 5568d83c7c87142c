// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpoint backends for working-tree preservation.
//!
//! Three backends, selected at runtime:
//! - btrfs snapshots: instant, copy-on-write, captures everything
//! - git branches: works anywhere git works, tracked files only
//! - none: explicit no-op for low-risk runs
//!
//! A checkpoint either exists and is restorable, or the backend reports it
//! missing; there is no partial state.

use crate::subprocess::run_argv;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const BTRFS_TIMEOUT: Duration = Duration::from_secs(30);
const GIT_TIMEOUT: Duration = Duration::from_secs(60);
const BRANCH_PREFIX: &str = "loop-checkpoint";

/// Which backend produced a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Snapshot,
    VcsBranch,
    None,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Snapshot => "snapshot",
            BackendKind::VcsBranch => "vcs-branch",
            BackendKind::None => "none",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A restorable point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub name: String,
    pub created_at: String,
    /// Path the checkpoint was taken of.
    pub source_path: String,
    /// Where the backing data lives: snapshot path or branch name.
    pub locator: String,
    pub backend: BackendKind,
}

/// Errors from checkpoint operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint backend failed: {0}")]
    Backend(String),

    #[error("working tree has uncommitted changes; commit or stash before restoring")]
    DirtyTree,

    #[error("checkpoint not found: {0}")]
    NotFound(String),

    #[error("restore is not supported without a checkpoint backend")]
    Unsupported,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability set every backend implements.
pub trait CheckpointBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Create a checkpoint of `path`, returning its ID.
    fn create(&self, label: &str, path: &Path) -> Result<String, CheckpointError>;

    /// Restore `path` to a checkpoint.
    fn restore(&self, checkpoint_id: &str, path: &Path) -> Result<(), CheckpointError>;

    /// Checkpoints known for `path`, newest first.
    fn list(&self, path: &Path) -> Vec<Checkpoint>;

    /// Delete a checkpoint. Deleting a missing checkpoint is not an error.
    fn delete(&self, checkpoint_id: &str) -> Result<(), CheckpointError>;

    fn exists(&self, checkpoint_id: &str) -> bool;
}

fn stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

// === Btrfs snapshots ===

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotMeta {
    name: String,
    created_at: String,
    source_path: String,
    snapshot_path: String,
}

/// Btrfs snapshot backend. Snapshots live under a shared directory with a
/// `metadata.json` sidecar mapping checkpoint IDs to their sources.
pub struct BtrfsBackend {
    snapshot_dir: PathBuf,
}

impl BtrfsBackend {
    pub fn new() -> Self {
        Self::with_dir(dl_core::paths::data_dir().join("loop").join("snapshots"))
    }

    pub fn with_dir(snapshot_dir: impl Into<PathBuf>) -> Self {
        Self { snapshot_dir: snapshot_dir.into() }
    }

    fn metadata_path(&self) -> PathBuf {
        self.snapshot_dir.join("metadata.json")
    }

    fn load_metadata(&self) -> BTreeMap<String, SnapshotMeta> {
        std::fs::read_to_string(self.metadata_path())
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    fn save_metadata(&self, meta: &BTreeMap<String, SnapshotMeta>) -> Result<(), CheckpointError> {
        std::fs::create_dir_all(&self.snapshot_dir)?;
        let body = serde_json::to_vec_pretty(meta)
            .map_err(|e| CheckpointError::Backend(e.to_string()))?;
        std::fs::write(self.metadata_path(), body)?;
        Ok(())
    }

    fn btrfs(&self, args: &[&str]) -> Result<crate::subprocess::CommandOutput, CheckpointError> {
        let mut argv = vec!["btrfs"];
        argv.extend_from_slice(args);
        run_argv(&argv, Path::new("."), BTRFS_TIMEOUT, None).map_err(CheckpointError::Io)
    }
}

impl Default for BtrfsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointBackend for BtrfsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Snapshot
    }

    fn create(&self, label: &str, path: &Path) -> Result<String, CheckpointError> {
        std::fs::create_dir_all(&self.snapshot_dir)?;
        let checkpoint_id = format!("{label}_{}", stamp());
        let snapshot_path = self.snapshot_dir.join(&checkpoint_id);

        let path_str = path.display().to_string();
        let snap_str = snapshot_path.display().to_string();
        let out = self.btrfs(&["subvolume", "snapshot", "-r", &path_str, &snap_str])?;
        if !out.success() {
            return Err(CheckpointError::Backend(format!(
                "btrfs snapshot failed: {}",
                out.stderr.trim()
            )));
        }

        let mut meta = self.load_metadata();
        meta.insert(
            checkpoint_id.clone(),
            SnapshotMeta {
                name: label.to_string(),
                created_at: dl_core::now_iso(),
                source_path: path_str,
                snapshot_path: snap_str,
            },
        );
        self.save_metadata(&meta)?;

        Ok(checkpoint_id)
    }

    fn restore(&self, checkpoint_id: &str, path: &Path) -> Result<(), CheckpointError> {
        let snapshot_path = self.snapshot_dir.join(checkpoint_id);
        if !snapshot_path.exists() {
            return Err(CheckpointError::NotFound(checkpoint_id.to_string()));
        }

        let path_str = path.display().to_string();
        // The live directory must be replaced wholesale: delete the current
        // subvolume, then re-snapshot the checkpoint writable into place.
        let show = self.btrfs(&["subvolume", "show", &path_str])?;
        if show.success() {
            let delete = self.btrfs(&["subvolume", "delete", &path_str])?;
            if !delete.success() {
                return Err(CheckpointError::Backend(format!(
                    "btrfs subvolume delete failed: {}",
                    delete.stderr.trim()
                )));
            }
        }

        let snap_str = snapshot_path.display().to_string();
        let out = self.btrfs(&["subvolume", "snapshot", &snap_str, &path_str])?;
        if !out.success() {
            return Err(CheckpointError::Backend(format!(
                "btrfs snapshot restore failed: {}",
                out.stderr.trim()
            )));
        }
        Ok(())
    }

    fn list(&self, _path: &Path) -> Vec<Checkpoint> {
        let mut checkpoints: Vec<Checkpoint> = self
            .load_metadata()
            .into_iter()
            .filter(|(id, _)| self.snapshot_dir.join(id).exists())
            .map(|(id, meta)| Checkpoint {
                id,
                name: meta.name,
                created_at: meta.created_at,
                source_path: meta.source_path,
                locator: meta.snapshot_path,
                backend: BackendKind::Snapshot,
            })
            .collect();
        checkpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        checkpoints
    }

    fn delete(&self, checkpoint_id: &str) -> Result<(), CheckpointError> {
        let snapshot_path = self.snapshot_dir.join(checkpoint_id);
        if !snapshot_path.exists() {
            return Ok(());
        }
        let snap_str = snapshot_path.display().to_string();
        let out = self.btrfs(&["subvolume", "delete", &snap_str])?;
        if !out.success() {
            return Err(CheckpointError::Backend(format!(
                "btrfs subvolume delete failed: {}",
                out.stderr.trim()
            )));
        }
        let mut meta = self.load_metadata();
        if meta.remove(checkpoint_id).is_some() {
            self.save_metadata(&meta)?;
        }
        Ok(())
    }

    fn exists(&self, checkpoint_id: &str) -> bool {
        self.snapshot_dir.join(checkpoint_id).exists()
    }
}

// === Git branches ===

/// Git-based backend: a checkpoint is a branch at the commit current when it
/// was created. Only tracked files are captured.
pub struct GitBackend {
    repo_path: PathBuf,
}

impl GitBackend {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self { repo_path: repo_path.into() }
    }

    fn git(&self, args: &[&str]) -> Result<crate::subprocess::CommandOutput, CheckpointError> {
        let repo = self.repo_path.display().to_string();
        let mut argv: Vec<&str> = vec!["git", "-C", repo.as_str()];
        argv.extend_from_slice(args);
        run_argv(&argv, Path::new("."), GIT_TIMEOUT, None).map_err(CheckpointError::Io)
    }

    fn is_dirty(&self) -> Result<bool, CheckpointError> {
        let out = self.git(&["status", "--porcelain"])?;
        if !out.success() {
            return Err(CheckpointError::Backend(format!(
                "git status failed: {}",
                out.stderr.trim()
            )));
        }
        Ok(!out.stdout.trim().is_empty())
    }
}

impl CheckpointBackend for GitBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::VcsBranch
    }

    fn create(&self, label: &str, _path: &Path) -> Result<String, CheckpointError> {
        let checkpoint_id = format!("{BRANCH_PREFIX}/{label}_{}", stamp());

        // Stash uncommitted work so the branch lands on a clean commit.
        let stash = self.git(&["stash", "push", "-m", &format!("loop-auto-stash-{checkpoint_id}")])?;
        let had_changes = !stash.stdout.contains("No local changes");

        let head = self.git(&["rev-parse", "HEAD"])?;
        if !head.success() {
            // Repo without commits yet; give it one so a branch can exist.
            self.git(&["add", "-A"])?;
            self.git(&["commit", "-m", "Initial commit for loop checkpoint", "--allow-empty"])?;
        }

        let branch = self.git(&["branch", &checkpoint_id])?;
        if !branch.success() {
            if had_changes {
                self.git(&["stash", "pop"])?;
            }
            return Err(CheckpointError::Backend(format!(
                "failed to create checkpoint branch: {}",
                branch.stderr.trim()
            )));
        }

        if had_changes {
            self.git(&["stash", "pop"])?;
        }

        Ok(checkpoint_id)
    }

    /// Restore refuses on a dirty tree rather than stashing and recreating
    /// the caller's branch under it; uncommitted collaborator work must be
    /// settled first.
    fn restore(&self, checkpoint_id: &str, _path: &Path) -> Result<(), CheckpointError> {
        if !self.exists(checkpoint_id) {
            return Err(CheckpointError::NotFound(checkpoint_id.to_string()));
        }
        if self.is_dirty()? {
            return Err(CheckpointError::DirtyTree);
        }

        let current = self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let current_branch = current.stdout.trim().to_string();

        let checkout = self.git(&["checkout", checkpoint_id])?;
        if !checkout.success() {
            return Err(CheckpointError::Backend(format!(
                "checkout failed: {}",
                checkout.stderr.trim()
            )));
        }

        // Recreate the caller's branch name at the checkpoint commit.
        if current_branch != checkpoint_id && !current_branch.starts_with(BRANCH_PREFIX) {
            self.git(&["branch", "-D", &current_branch])?;
            let recreate = self.git(&["checkout", "-b", &current_branch])?;
            if !recreate.success() {
                return Err(CheckpointError::Backend(format!(
                    "failed to recreate branch {current_branch}: {}",
                    recreate.stderr.trim()
                )));
            }
        }

        Ok(())
    }

    fn list(&self, _path: &Path) -> Vec<Checkpoint> {
        let Ok(out) = self.git(&[
            "branch",
            "--list",
            &format!("{BRANCH_PREFIX}/*"),
            "--format=%(refname:short)|%(creatordate:iso-strict)",
        ]) else {
            return Vec::new();
        };

        let mut checkpoints: Vec<Checkpoint> = out
            .stdout
            .lines()
            .filter_map(|line| {
                let (branch, date) = line.split_once('|')?;
                Some(Checkpoint {
                    id: branch.to_string(),
                    name: branch.strip_prefix(&format!("{BRANCH_PREFIX}/"))?.to_string(),
                    created_at: date.to_string(),
                    source_path: self.repo_path.display().to_string(),
                    locator: branch.to_string(),
                    backend: BackendKind::VcsBranch,
                })
            })
            .collect();
        checkpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        checkpoints
    }

    fn delete(&self, checkpoint_id: &str) -> Result<(), CheckpointError> {
        let out = self.git(&["branch", "-D", checkpoint_id])?;
        if !out.success() && !out.stderr.contains("not found") {
            return Err(CheckpointError::Backend(format!(
                "failed to delete branch: {}",
                out.stderr.trim()
            )));
        }
        Ok(())
    }

    fn exists(&self, checkpoint_id: &str) -> bool {
        self.git(&["rev-parse", "--verify", checkpoint_id])
            .map(|out| out.success())
            .unwrap_or(false)
    }
}

// === None ===

/// Explicit no-op backend. `restore` always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneBackend;

impl CheckpointBackend for NoneBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::None
    }

    fn create(&self, label: &str, _path: &Path) -> Result<String, CheckpointError> {
        Ok(format!("none_{label}_{}", stamp()))
    }

    fn restore(&self, _checkpoint_id: &str, _path: &Path) -> Result<(), CheckpointError> {
        Err(CheckpointError::Unsupported)
    }

    fn list(&self, _path: &Path) -> Vec<Checkpoint> {
        Vec::new()
    }

    fn delete(&self, _checkpoint_id: &str) -> Result<(), CheckpointError> {
        Ok(())
    }

    fn exists(&self, _checkpoint_id: &str) -> bool {
        false
    }
}

// === Detection ===

/// Pick the best backend kind for a directory: snapshot when it is a btrfs
/// subvolume, else vcs when it is inside a git repo, else none.
pub fn detect_backend(path: &Path) -> BackendKind {
    let path_str = path.display().to_string();

    if let Ok(out) = run_argv(
        &["btrfs", "subvolume", "show", &path_str],
        Path::new("."),
        BTRFS_TIMEOUT,
        None,
    ) {
        if out.success() {
            return BackendKind::Snapshot;
        }
    }

    if let Ok(out) = run_argv(
        &["git", "-C", &path_str, "rev-parse", "--git-dir"],
        Path::new("."),
        GIT_TIMEOUT,
        None,
    ) {
        if out.success() {
            return BackendKind::VcsBranch;
        }
    }

    BackendKind::None
}

/// Build a backend of the given kind for `path`.
pub fn backend_for(kind: BackendKind, path: &Path) -> Box<dyn CheckpointBackend> {
    match kind {
        BackendKind::Snapshot => Box::new(BtrfsBackend::new()),
        BackendKind::VcsBranch => Box::new(GitBackend::new(path)),
        BackendKind::None => Box::new(NoneBackend),
    }
}

/// Detect and build in one step.
pub fn auto_backend(path: &Path) -> Box<dyn CheckpointBackend> {
    backend_for(detect_backend(path), path)
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
