//! Transactional apply / validate / revert
//!
//! A file moves through `Clean -> Saved -> Validated(ok | failed)` and, on
//! failure, `-> Reverted`. The first save of a file in a run copies the
//! pristine content to `<file>.bak`; that backup is not overwritten again
//! during the run, so every revert restores the pre-run content rather than
//! an intermediate attempt. A `.bak` left by an earlier run is replaced on
//! first save and never restored. Backups stay on disk after the run for
//! manual recovery.

mod checker;

pub use checker::{CheckOutcome, NodeChecker, SyntaxChecker, ValidationMode};

use anyhow::{Context, Result};
use dashmap::DashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// File mutator rooted at a workspace directory.
///
/// Clones share the set of files backed up in this run.
#[derive(Debug, Clone)]
pub struct Mutator {
    root: PathBuf,
    backed_up: Arc<DashSet<PathBuf>>,
}

impl Mutator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            backed_up: Arc::new(DashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn full_path(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// `<file>.bak` next to the live file
    pub fn backup_path(&self, relative: &Path) -> PathBuf {
        let mut name: OsString = self.full_path(relative).into_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Whether this run has backed the file up
    pub fn has_backup(&self, relative: &Path) -> bool {
        self.backed_up.contains(relative) && self.backup_path(relative).exists()
    }

    pub fn read(&self, relative: &Path) -> Result<String> {
        let path = self.full_path(relative);
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Back up the on-disk content (first save in this run only), then
    /// overwrite the file
    pub fn save(&self, relative: &Path, new_content: &str) -> Result<()> {
        let path = self.full_path(relative);

        if !self.has_backup(relative) {
            let backup = self.backup_path(relative);
            fs::copy(&path, &backup)
                .with_context(|| format!("Failed to back up {}", path.display()))?;
            self.backed_up.insert(relative.to_path_buf());
            debug!("Backup created at {}", backup.display());
        }

        fs::write(&path, new_content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Evolution saved to {}", relative.display());
        Ok(())
    }

    /// Restore this run's backup over the live file. Returns false if the
    /// file was never backed up.
    pub fn revert(&self, relative: &Path) -> Result<bool> {
        if !self.has_backup(relative) {
            return Ok(false);
        }

        let backup = self.backup_path(relative);
        let path = self.full_path(relative);
        fs::copy(&backup, &path)
            .with_context(|| format!("Failed to restore {}", path.display()))?;
        info!("Reverted {} to stable backup", relative.display());
        Ok(true)
    }
}

/// Where a file is in its mutation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Clean,
    Saved,
    Validated { success: bool },
    Reverted,
}

/// One file's save -> validate -> (revert | commit) sequence
pub struct FileTransaction {
    mutator: Mutator,
    checker: Arc<dyn SyntaxChecker>,
    path: PathBuf,
    state: TxState,
    current_content: Option<String>,
    last_error: Option<String>,
}

impl FileTransaction {
    pub fn new(mutator: Mutator, checker: Arc<dyn SyntaxChecker>, path: impl Into<PathBuf>) -> Self {
        Self {
            mutator,
            checker,
            path: path.into(),
            state: TxState::Clean,
            current_content: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn backup_exists(&self) -> bool {
        self.mutator.has_backup(&self.path)
    }

    pub fn current_content(&self) -> Option<&str> {
        self.current_content.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn save(&mut self, content: String) -> Result<()> {
        self.mutator.save(&self.path, &content)?;
        self.current_content = Some(content);
        self.state = TxState::Saved;
        Ok(())
    }

    /// Run the syntax check on the blocking pool
    pub async fn validate(&mut self) -> CheckOutcome {
        let checker = Arc::clone(&self.checker);
        let root = self.mutator.root().to_path_buf();
        let relative = self.path.clone();

        let outcome = tokio::task::spawn_blocking(move || checker.check(&root, &relative))
            .await
            .unwrap_or_else(|e| CheckOutcome::failed(format!("validation task failed: {}", e)));

        self.last_error = outcome.diagnostic().map(str::to_string);
        self.state = TxState::Validated {
            success: outcome.is_ok(),
        };
        outcome
    }

    /// Restore the pre-run content and return it
    pub fn revert(&mut self) -> Result<String> {
        self.mutator.revert(&self.path)?;
        let restored = self.mutator.read(&self.path)?;
        self.current_content = Some(restored.clone());
        self.state = TxState::Reverted;
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct AlwaysOk;

    impl SyntaxChecker for AlwaysOk {
        fn check(&self, _root: &Path, _relative: &Path) -> CheckOutcome {
            CheckOutcome::Ok
        }
    }

    struct FailsOn(&'static str);

    impl SyntaxChecker for FailsOn {
        fn check(&self, root: &Path, relative: &Path) -> CheckOutcome {
            let content = fs::read_to_string(root.join(relative)).unwrap_or_default();
            if content.contains(self.0) {
                CheckOutcome::failed(format!("{}:1\nSyntaxError: bad", relative.display()))
            } else {
                CheckOutcome::Ok
            }
        }
    }

    #[test]
    fn test_backup_path_appends_suffix() {
        let mutator = Mutator::new("/work");
        assert_eq!(
            mutator.backup_path(Path::new("src/app.js")),
            PathBuf::from("/work/src/app.js.bak")
        );
    }

    #[test]
    fn test_backup_is_created_once() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "original").unwrap();
        let mutator = Mutator::new(dir.path());
        let rel = Path::new("a.js");

        mutator.save(rel, "first attempt").unwrap();
        mutator.save(rel, "second attempt").unwrap();

        let backup = fs::read_to_string(mutator.backup_path(rel)).unwrap();
        assert_eq!(backup, "original");
        assert_eq!(mutator.read(rel).unwrap(), "second attempt");

        assert!(mutator.revert(rel).unwrap());
        assert_eq!(mutator.read(rel).unwrap(), "original");
    }

    #[test]
    fn test_revert_without_backup_is_noop() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "untouched").unwrap();
        let mutator = Mutator::new(dir.path());

        assert!(!mutator.revert(Path::new("a.js")).unwrap());
        assert_eq!(mutator.read(Path::new("a.js")).unwrap(), "untouched");
    }

    #[test]
    fn test_stale_backup_is_replaced_not_restored() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "committed last run").unwrap();
        fs::write(dir.path().join("a.js.bak"), "from an older run").unwrap();
        let mutator = Mutator::new(dir.path());
        let rel = Path::new("a.js");

        assert!(!mutator.has_backup(rel));
        assert!(!mutator.revert(rel).unwrap());
        assert_eq!(mutator.read(rel).unwrap(), "committed last run");

        mutator.save(rel, "attempt").unwrap();
        assert_eq!(fs::read_to_string(mutator.backup_path(rel)).unwrap(), "committed last run");
        assert!(mutator.revert(rel).unwrap());
        assert_eq!(mutator.read(rel).unwrap(), "committed last run");
    }

    #[test]
    fn test_clones_share_backup_state() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "original").unwrap();
        let mutator = Mutator::new(dir.path());
        let other = mutator.clone();

        mutator.save(Path::new("a.js"), "first").unwrap();
        other.save(Path::new("a.js"), "second").unwrap();
        assert_eq!(fs::read_to_string(other.backup_path(Path::new("a.js"))).unwrap(), "original");
    }

    #[test]
    fn test_save_missing_file_fails() {
        let dir = tempdir().unwrap();
        let mutator = Mutator::new(dir.path());
        assert!(mutator.save(Path::new("missing.js"), "x").is_err());
    }

    #[tokio::test]
    async fn test_transaction_success_path() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "let a = 1;").unwrap();
        let mut tx = FileTransaction::new(Mutator::new(dir.path()), Arc::new(AlwaysOk), "a.js");
        assert_eq!(tx.state(), TxState::Clean);
        assert!(!tx.backup_exists());

        tx.save("const a = 1;".to_string()).unwrap();
        assert_eq!(tx.state(), TxState::Saved);
        assert!(tx.backup_exists());

        let outcome = tx.validate().await;
        assert!(outcome.is_ok());
        assert_eq!(tx.state(), TxState::Validated { success: true });
        assert_eq!(tx.current_content(), Some("const a = 1;"));
        assert!(tx.last_error().is_none());
    }

    #[tokio::test]
    async fn test_transaction_failure_reverts_to_original() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "let a = 1;").unwrap();
        let mut tx = FileTransaction::new(
            Mutator::new(dir.path()),
            Arc::new(FailsOn("BROKEN")),
            "a.js",
        );

        tx.save("BROKEN".to_string()).unwrap();
        let outcome = tx.validate().await;
        assert!(!outcome.is_ok());
        assert_eq!(tx.state(), TxState::Validated { success: false });
        assert!(tx.last_error().unwrap().contains("SyntaxError"));

        let restored = tx.revert().unwrap();
        assert_eq!(restored, "let a = 1;");
        assert_eq!(tx.state(), TxState::Reverted);
    }
}
