//! The commit protocol: optimistic concurrency check and the transactional
//! push primitive.
//!
//! A commit never competes with other writers through locks. It fetches the
//! branch, compares each file's recorded base OID against the freshly pulled
//! upstream OID, and only touches the repository once every file passes (or
//! the caller forces). The push itself is a transaction: reset the index to
//! the known-good commit, run the commit action, push — and on any failure
//! restore the local ref and index to exactly their pre-transaction state
//! before surfacing the error. Draft overlays and base-SHA bookkeeping
//! survive a failed attempt untouched; the user's work is never lost.

use confit_git::{BranchName, GitOid, GitRepo, RemoteAuth};

use super::SyncEngine;
use super::diff::Snapshot;
use crate::error::SyncError;
use crate::model::{ConfigFile, ConflictFile, Session};

// ---------------------------------------------------------------------------
// Optimistic check (pure)
// ---------------------------------------------------------------------------

/// Verdict of the optimistic concurrency check for one file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionCheck {
    /// The upstream version is the one the draft was derived from (or the
    /// file does not exist upstream); committing cannot overwrite anyone.
    Clean,
    /// Upstream moved underneath the draft; committing would overwrite it.
    Conflicted,
}

/// Compare the recorded base OID against the current upstream OID.
///
/// Conflicted iff upstream has a version the draft was not derived from:
/// either no baseline was recorded but the file now exists upstream, or a
/// baseline was recorded and upstream differs from it. A file absent
/// upstream is always clean — there is nothing to overwrite.
#[must_use]
pub fn optimistic_check(recorded: Option<GitOid>, upstream: Option<GitOid>) -> VersionCheck {
    match (recorded, upstream) {
        (_, None) => VersionCheck::Clean,
        (None, Some(_)) => VersionCheck::Conflicted,
        (Some(recorded), Some(upstream)) => {
            if recorded == upstream {
                VersionCheck::Clean
            } else {
                VersionCheck::Conflicted
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Commit / push
// ---------------------------------------------------------------------------

impl SyncEngine {
    /// Commit a set of files to the session's branch and push.
    ///
    /// The protocol, in order: fetch the branch to learn the authoritative
    /// upstream commit; snapshot its tree (skipped under `force_push`); run
    /// the optimistic check per file, reading upstream content only for
    /// files that fail it; then either surface every conflict at once — with
    /// no repository mutation — or execute the push transaction. On success
    /// each file's overlay and base-SHA entry are retired and the returned
    /// records carry the new blob OIDs, unmodified, with the committed text
    /// as both draft and original.
    ///
    /// # Errors
    /// Fails `Conflict` with the full per-file payload when any file fails
    /// the check (`force_push` never does); propagates fetch and
    /// push-transaction failures, the latter after rollback.
    pub fn commit_files(
        &self,
        session: &Session,
        files: Vec<ConfigFile>,
        message: &str,
        force_push: bool,
    ) -> Result<Vec<ConfigFile>, SyncError> {
        let repo = self.open(session)?;
        let mut meta = self.load_metadata(session)?;
        let branch = session.branch.clone();

        let fetched = self.fetch_branch_inner(repo.as_ref(), &mut meta, &session.auth, &branch)?;
        let pulled = match fetched.pulled_commit {
            Some(oid) => oid,
            None => self
                .branch_tip(repo.as_ref(), &branch)?
                .ok_or_else(|| SyncError::not_found(format!("branch `{branch}`")))?,
        };

        let upstream = if force_push {
            Snapshot::new()
        } else {
            self.snapshot(repo.as_ref(), pulled)?
        };

        // (repo path, caller's record, draft text) for every file that
        // passes the check.
        let mut staged: Vec<(String, ConfigFile, String)> = Vec::new();
        let mut conflicts: Vec<ConflictFile> = Vec::new();
        for file in files {
            let path = self.paths().repo_path(&file.application, &file.file_name);
            let draft = match file.draft_content.clone() {
                Some(text) => text,
                None => {
                    let overlay = self.drafts.read(
                        &session.repo_folder,
                        branch.as_str(),
                        &file.application,
                        &file.file_name,
                    )?;
                    match overlay {
                        Some(text) => text,
                        // Nothing to commit for this file.
                        None => continue,
                    }
                }
            };

            if !force_push {
                let recorded = match meta.base_sha(branch.as_str(), &path) {
                    Some(oid) => Some(oid),
                    None => {
                        // Fall back to the file's last-known OID and make the
                        // fallback the recorded baseline, so a retry after a
                        // conflict compares against the same state.
                        if let Some(oid) = file.oid {
                            meta.set_base_sha(branch.as_str(), &path, Some(oid));
                        }
                        file.oid
                    }
                };
                let key = (file.application.clone(), file.file_name.clone());
                let upstream_oid = upstream.get(&key).copied();
                if optimistic_check(recorded, upstream_oid) == VersionCheck::Conflicted
                    && let Some(oid) = upstream_oid
                {
                    let content = String::from_utf8_lossy(&repo.read_blob(oid)?).into_owned();
                    conflicts.push(ConflictFile {
                        application: file.application.clone(),
                        file_name: file.file_name.clone(),
                        draft_content: draft,
                        upstream_content: Some(content),
                        upstream_oid: Some(oid),
                    });
                    continue;
                }
            }
            staged.push((path, file, draft));
        }

        if !conflicts.is_empty() {
            // Persist the (possibly re-recorded) baselines so a retry or a
            // later force push starts from a stable view. Nothing in the
            // repository has been touched.
            self.meta.save(&meta)?;
            tracing::info!(branch = %branch, count = conflicts.len(), "commit rejected with conflicts");
            return Err(SyncError::Conflict { files: conflicts });
        }

        let author = self.commit_author(session);
        let bodies: Vec<(String, String)> = staged
            .iter()
            .map(|(path, _, draft)| (path.clone(), draft.clone()))
            .collect();
        let mut new_oids: Vec<GitOid> = Vec::with_capacity(bodies.len());
        self.do_push(
            repo.as_ref(),
            &session.auth,
            &branch,
            pulled,
            force_push,
            &mut |repo| {
                new_oids.clear();
                for (path, body) in &bodies {
                    new_oids.push(repo.stage_blob(path, body.as_bytes())?);
                }
                Ok(repo.commit_staged(&branch, message, &author)?)
            },
        )?;

        let mut committed = Vec::with_capacity(staged.len());
        for (i, (path, mut file, draft)) in staged.into_iter().enumerate() {
            self.drafts.delete(
                &session.repo_folder,
                branch.as_str(),
                &file.application,
                &file.file_name,
            )?;
            meta.set_base_sha(branch.as_str(), &path, None);
            file.oid = new_oids.get(i).copied();
            file.size = draft.len() as u64;
            file.original_content = Some(draft.clone());
            file.draft_content = Some(draft);
            file.modified = false;
            committed.push(file);
        }
        self.meta.save(&meta)?;
        Ok(committed)
    }

    /// Finish conflict resolution: commit the resolutions that still diverge
    /// and quietly retire the ones that match the repository.
    ///
    /// The diverging partition is committed with the optimistic check
    /// bypassed — the user has already seen both sides and chosen, so
    /// re-running the check would only reject the same information again.
    /// The returned list covers both partitions.
    ///
    /// # Errors
    /// Propagates draft and commit failures; never fails `Conflict`.
    pub fn resolve_conflicts(
        &self,
        session: &Session,
        files: Vec<ConfigFile>,
        message: &str,
    ) -> Result<Vec<ConfigFile>, SyncError> {
        let mut resolved = Vec::new();
        let mut diverging = Vec::new();
        for mut file in files {
            if file.diverged() {
                diverging.push(file);
            } else {
                self.save_draft(session, &file)?;
                file.modified = false;
                resolved.push(file);
            }
        }
        if !diverging.is_empty() {
            resolved.extend(self.commit_files(session, diverging, message, true)?);
        }
        Ok(resolved)
    }

    /// The transactional push primitive.
    ///
    /// Resets the index to `last_known` (the index of a checkout-free clone
    /// is derived state and cannot be trusted to match), runs `action` to
    /// produce a commit, and pushes it. On failure of either step the local
    /// branch ref and index are restored to `last_known` before the error is
    /// returned. On success both the remote-tracking and local refs are
    /// advanced explicitly — pushing does not move them by itself — and the
    /// index is rebuilt at the new commit.
    pub(crate) fn do_push(
        &self,
        repo: &dyn GitRepo,
        auth: &RemoteAuth,
        branch: &BranchName,
        last_known: GitOid,
        force: bool,
        action: &mut dyn FnMut(&dyn GitRepo) -> Result<GitOid, SyncError>,
    ) -> Result<GitOid, SyncError> {
        repo.rebuild_index(last_known)?;
        tracing::debug!(branch = %branch, base = %last_known, "push transaction started");

        let attempted = action(repo).and_then(|commit| {
            repo.push_branch(branch, auth, force)?;
            Ok(commit)
        });

        match attempted {
            Ok(commit) => {
                repo.write_ref(&branch.remote_ref(), commit)?;
                repo.write_ref(&branch.local_ref(), commit)?;
                repo.rebuild_index(commit)?;
                tracing::info!(branch = %branch, commit = %commit, "push transaction committed");
                Ok(commit)
            }
            Err(err) => {
                if let Err(rollback_err) = rollback(repo, branch, last_known) {
                    tracing::error!(
                        branch = %branch,
                        error = %rollback_err,
                        "rollback after failed push itself failed",
                    );
                }
                Err(err)
            }
        }
    }
}

fn rollback(repo: &dyn GitRepo, branch: &BranchName, last_known: GitOid) -> Result<(), SyncError> {
    repo.write_ref(&branch.local_ref(), last_known)?;
    repo.rebuild_index(last_known)?;
    tracing::warn!(branch = %branch, restored = %last_known, "push transaction rolled back");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
