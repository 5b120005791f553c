//! The draft overlay store.
//!
//! Uncommitted per-file YAML text lives outside the shadow clone, keyed by
//! (repo folder, branch, application, file) and laid out as
//! `drafts_dir/{repoFolder}/{branch}/{appsRoot}/{app}/{file}`. A draft file
//! exists exactly while the user's edit diverges from the repository
//! content; the engine deletes it on convergence, commit, or file deletion.

use std::path::PathBuf;

use crate::error::SyncError;

/// Filesystem store for draft overlay text.
#[derive(Clone, Debug)]
pub struct DraftStore {
    root: PathBuf,
    apps_root: String,
}

impl DraftStore {
    /// Create a store rooted at `root`, using `apps_root` as the in-repo
    /// apps folder name (mirrored inside each branch directory).
    #[must_use]
    pub const fn new(root: PathBuf, apps_root: String) -> Self {
        Self { root, apps_root }
    }

    fn branch_dir(&self, repo_folder: &str, branch: &str) -> PathBuf {
        self.root.join(repo_folder).join(branch)
    }

    fn file_path(
        &self,
        repo_folder: &str,
        branch: &str,
        application: &str,
        file_name: &str,
    ) -> PathBuf {
        self.branch_dir(repo_folder, branch)
            .join(&self.apps_root)
            .join(application)
            .join(file_name)
    }

    /// Make sure the overlay root for `repo_folder` exists.
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if the directory cannot be created.
    pub fn ensure_root(&self, repo_folder: &str) -> Result<(), SyncError> {
        std::fs::create_dir_all(self.root.join(repo_folder))?;
        Ok(())
    }

    /// Read one draft, `None` if absent.
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] on read failures other than not-found.
    pub fn read(
        &self,
        repo_folder: &str,
        branch: &str,
        application: &str,
        file_name: &str,
    ) -> Result<Option<String>, SyncError> {
        match std::fs::read_to_string(self.file_path(repo_folder, branch, application, file_name)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write (or overwrite) one draft.
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if directories cannot be created or the
    /// write fails.
    pub fn write(
        &self,
        repo_folder: &str,
        branch: &str,
        application: &str,
        file_name: &str,
        content: &str,
    ) -> Result<(), SyncError> {
        let path = self.file_path(repo_folder, branch, application, file_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        tracing::debug!(path = %path.display(), "draft written");
        Ok(())
    }

    /// Delete one draft. No-op if absent.
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] only if the file exists but cannot be removed.
    pub fn delete(
        &self,
        repo_folder: &str,
        branch: &str,
        application: &str,
        file_name: &str,
    ) -> Result<(), SyncError> {
        let path = self.file_path(repo_folder, branch, application, file_name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "draft deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// List every draft for one branch as `(application, file, content)`,
    /// sorted by (application, file). An absent branch directory is empty.
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] on directory or file read failures.
    pub fn list(
        &self,
        repo_folder: &str,
        branch: &str,
    ) -> Result<Vec<(String, String, String)>, SyncError> {
        let apps_dir = self.branch_dir(repo_folder, branch).join(&self.apps_root);
        let mut out = Vec::new();
        let apps = match std::fs::read_dir(&apps_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for app in apps {
            let app = app?;
            if !app.file_type()?.is_dir() {
                continue;
            }
            let app_name = app.file_name().to_string_lossy().into_owned();
            for file in std::fs::read_dir(app.path())? {
                let file = file?;
                if !file.file_type()?.is_file() {
                    continue;
                }
                let file_name = file.file_name().to_string_lossy().into_owned();
                let content = std::fs::read_to_string(file.path())?;
                out.push((app_name.clone(), file_name, content));
            }
        }
        out.sort();
        Ok(out)
    }

    /// Remove the whole overlay directory of one branch. No-op if absent.
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if removal fails for another reason.
    pub fn remove_branch(&self, repo_folder: &str, branch: &str) -> Result<(), SyncError> {
        let dir = self.branch_dir(repo_folder, branch);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::debug!(dir = %dir.display(), "draft branch folder removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
