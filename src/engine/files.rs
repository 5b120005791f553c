//! File-level operations: tree walks, content reads, drafts, deletion.
//!
//! The repository layout is fixed: application folders one level under the
//! configured apps root, YAML files one level under each application. Tree
//! walks stay O(entries) by comparing OIDs; blob content is read only when a
//! single file's text is actually wanted.

use confit_git::{EntryMode, GitOid, GitRepo};

use super::SyncEngine;
use super::diff::{Snapshot, classify};
use crate::error::SyncError;
use crate::model::{ConfigFile, FileListing, Session};

impl SyncEngine {
    /// Walk `commit`'s tree into a snapshot of YAML files under the apps root.
    pub(crate) fn snapshot(
        &self,
        repo: &dyn GitRepo,
        commit: GitOid,
    ) -> Result<Snapshot, SyncError> {
        let mut snap = Snapshot::new();
        for app in repo.list_dir(commit, &self.config.apps_root)? {
            if app.mode != EntryMode::Tree {
                continue;
            }
            let dir = format!("{}/{}", self.config.apps_root, app.name);
            for entry in repo.list_dir(commit, &dir)? {
                let is_blob = matches!(entry.mode, EntryMode::Blob | EntryMode::BlobExecutable);
                if is_blob && is_yaml(&entry.name) {
                    snap.insert((app.name.clone(), entry.name), entry.oid);
                }
            }
        }
        Ok(snap)
    }

    /// List the current branch's files merged with the draft overlay.
    ///
    /// Repository files come from a tree walk without content reads; drafts
    /// are merged in by (application, file) key and always count as
    /// modified. When the session is off the base branch, the listing also
    /// reports whether either branch has versions the other lacks — the
    /// "anything to propose / anything to pull" flags, computed from OIDs
    /// without materializing a merge.
    ///
    /// # Errors
    /// Fails `NotFound` when the branch has no commit.
    pub fn get_files(&self, session: &Session) -> Result<FileListing, SyncError> {
        let repo = self.open(session)?;
        let branch = &session.branch;
        let tip = self
            .branch_tip(repo.as_ref(), branch)?
            .ok_or_else(|| SyncError::not_found(format!("branch `{branch}`")))?;

        let snap = self.snapshot(repo.as_ref(), tip)?;
        let mut applications: Vec<String> = repo
            .list_dir(tip, &self.config.apps_root)?
            .into_iter()
            .filter(|e| e.mode == EntryMode::Tree)
            .map(|e| e.name)
            .collect();
        applications.sort_unstable();

        let mut files: std::collections::BTreeMap<(String, String), ConfigFile> = snap
            .iter()
            .map(|((app, name), oid)| {
                let file = ConfigFile {
                    application: app.clone(),
                    file_name: name.clone(),
                    oid: Some(*oid),
                    ..ConfigFile::default()
                };
                ((app.clone(), name.clone()), file)
            })
            .collect();

        for (app, name, content) in self.drafts.list(&session.repo_folder, branch.as_str())? {
            let entry = files
                .entry((app.clone(), name.clone()))
                .or_insert_with(|| ConfigFile {
                    application: app,
                    file_name: name,
                    ..ConfigFile::default()
                });
            entry.size = content.len() as u64;
            entry.draft_content = Some(content);
            entry.modified = true;
        }

        let mut can_pull_request = false;
        let mut can_sync_master = false;
        if branch.as_str() != self.base.as_str()
            && let Some(base_tip) = self.branch_tip(repo.as_ref(), &self.base)?
        {
            let base_snap = self.snapshot(repo.as_ref(), base_tip)?;
            let delta = classify(&snap, &base_snap);
            can_pull_request = !delta.only_in_left.is_empty() || !delta.differing.is_empty();
            can_sync_master = !delta.only_in_right.is_empty() || !delta.differing.is_empty();
        }

        Ok(FileListing {
            files: files.into_values().collect(),
            applications,
            can_pull_request,
            can_sync_master,
        })
    }

    /// Read one file: repository content at the branch tip plus any draft.
    ///
    /// Self-healing rule: a draft identical to the repository content is
    /// retired on the spot, together with its base-SHA bookmark.
    ///
    /// # Errors
    /// Fails `NotFound` only when neither the repository nor the overlay has
    /// the file.
    pub fn get_file_content(
        &self,
        session: &Session,
        application: &str,
        file_name: &str,
    ) -> Result<ConfigFile, SyncError> {
        let repo = self.open(session)?;
        let mut meta = self.load_metadata(session)?;
        let branch = &session.branch;
        let path = self.paths().repo_path(application, file_name);

        let entry = match self.branch_tip(repo.as_ref(), branch)? {
            Some(tip) => repo.find_file(tip, &path)?,
            None => None,
        };
        let (oid, original) = match entry {
            Some(entry) => {
                let text = String::from_utf8_lossy(&repo.read_blob(entry.oid)?).into_owned();
                (Some(entry.oid), Some(text))
            }
            None => (None, None),
        };

        let mut draft = self
            .drafts
            .read(&session.repo_folder, branch.as_str(), application, file_name)?;
        if draft.is_some() && draft == original {
            tracing::debug!(path = %path, "draft equals repository content, retiring overlay");
            self.drafts
                .delete(&session.repo_folder, branch.as_str(), application, file_name)?;
            self.meta
                .save_commit_base(&mut meta, branch.as_str(), &path, None)?;
            draft = None;
        }

        if draft.is_none() && original.is_none() {
            return Err(SyncError::not_found(format!("file `{path}` on `{branch}`")));
        }

        let modified = draft.is_some();
        let size = draft.as_ref().or(original.as_ref()).map_or(0, |c| c.len() as u64);
        Ok(ConfigFile {
            application: application.to_owned(),
            file_name: file_name.to_owned(),
            oid,
            draft_content: draft,
            original_content: original,
            modified,
            size,
        })
    }

    /// Persist (or retire) a draft for one file.
    ///
    /// An unmodified file clears the overlay and its base-SHA bookmark. A
    /// modified file writes the overlay and, the first time it diverges,
    /// records the repository OID it diverged *from* — the baseline the
    /// commit protocol's conflict check compares against.
    ///
    /// # Errors
    /// Propagates overlay and metadata I/O failures.
    pub fn save_draft(&self, session: &Session, file: &ConfigFile) -> Result<(), SyncError> {
        let mut meta = self.load_metadata(session)?;
        let branch = session.branch.as_str();
        let path = self.paths().repo_path(&file.application, &file.file_name);

        if !file.diverged() {
            self.drafts
                .delete(&session.repo_folder, branch, &file.application, &file.file_name)?;
            self.meta.save_commit_base(&mut meta, branch, &path, None)?;
            return Ok(());
        }

        let draft = file.draft_content.as_deref().unwrap_or("");
        self.drafts
            .write(&session.repo_folder, branch, &file.application, &file.file_name, draft)?;
        if meta.base_sha(branch, &path).is_none()
            && let Some(oid) = file.oid
        {
            self.meta.save_commit_base(&mut meta, branch, &path, Some(oid))?;
        }
        Ok(())
    }

    /// Delete a file from the branch, the overlay, and the bookkeeping.
    ///
    /// When the file exists in the repository, the branch is re-fetched and
    /// existence re-checked at the pulled commit before committing the
    /// removal, so racing with another user's deletion stays a no-op. The
    /// overlay and base-SHA entry are removed unconditionally. Returns
    /// whether the fetch pulled a change.
    ///
    /// # Errors
    /// Propagates fetch and push-transaction failures (the transaction rolls
    /// back first).
    pub fn delete_file(
        &self,
        session: &Session,
        application: &str,
        file_name: &str,
    ) -> Result<bool, SyncError> {
        let repo = self.open(session)?;
        let mut meta = self.load_metadata(session)?;
        let branch = session.branch.clone();
        let path = self.paths().repo_path(application, file_name);

        let mut pulled_change = false;
        if let Some(tip) = self.branch_tip(repo.as_ref(), &branch)?
            && repo.find_file(tip, &path)?.is_some()
        {
            let fetched =
                self.fetch_branch_inner(repo.as_ref(), &mut meta, &session.auth, &branch)?;
            pulled_change = fetched.changed;
            let pulled = fetched.pulled_commit.unwrap_or(tip);
            if repo.find_file(pulled, &path)?.is_some() {
                let author = self.commit_author(session);
                let message = format!("Delete {path}");
                self.do_push(
                    repo.as_ref(),
                    &session.auth,
                    &branch,
                    pulled,
                    false,
                    &mut |repo| {
                        repo.unstage(&path)?;
                        Ok(repo.commit_staged(&branch, &message, &author)?)
                    },
                )?;
                tracing::info!(path = %path, branch = %branch, "file deleted");
            } else {
                tracing::debug!(path = %path, "file already deleted upstream");
            }
        }

        self.drafts
            .delete(&session.repo_folder, branch.as_str(), application, file_name)?;
        self.meta
            .save_commit_base(&mut meta, branch.as_str(), &path, None)?;
        Ok(pulled_change)
    }
}

fn is_yaml(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
