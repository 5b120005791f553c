//! Remote synchronization: single-branch fetch, all-branches refresh, and
//! pruning of branches deleted upstream.
//!
//! Two failure classes degrade instead of erroring. A remote branch that no
//! longer exists makes a single-branch fetch a `changed = false` no-op —
//! upstream deletion must never break local operation. A transfer that hits
//! the configured timeout also reports `changed = false`, but marks the
//! clone stale so the next repository access discards and re-clones it.

use confit_git::{BranchName, BranchScope, GitError, GitOid, GitRepo, RemoteAuth};

use super::SyncEngine;
use crate::error::SyncError;
use crate::model::{FetchOutcome, RefreshOutcome, RepoMetadata, Session};

/// Outcome of an all-branches transfer, before per-branch interpretation.
pub(crate) struct AllFetch {
    /// Locally known branches that disappeared from the remote and were
    /// pruned (refs, drafts, base-SHA entries).
    pub pruned: Vec<String>,
    /// The transfer hit the deadline; nothing was updated.
    pub timed_out: bool,
}

impl SyncEngine {
    /// Fetch `branch` and report whether its remote-tracking position moved.
    ///
    /// With `single_branch_only` the transfer covers just that branch;
    /// otherwise all remote branches are fetched and branches deleted
    /// upstream are pruned along the way.
    ///
    /// # Errors
    /// Fails `NotFound` if an all-branches fetch discovers that `branch`
    /// itself was deleted remotely; propagates transport failures other than
    /// ref-gone and timeout.
    pub fn fetch_branch(
        &self,
        session: &Session,
        branch: &str,
        single_branch_only: bool,
    ) -> Result<FetchOutcome, SyncError> {
        let branch = Self::parse_branch(branch)?;
        let repo = self.open(session)?;
        let mut meta = self.load_metadata(session)?;

        if single_branch_only {
            return self.fetch_branch_inner(repo.as_ref(), &mut meta, &session.auth, &branch);
        }

        let prev = repo.resolve_ref(&branch.remote_ref())?;
        let all = self.fetch_all_inner(repo.as_ref(), &mut meta, &session.auth, &session.repo_folder)?;
        if all.timed_out {
            return Ok(FetchOutcome {
                pulled_commit: prev,
                changed: false,
            });
        }
        if all.pruned.iter().any(|n| n == branch.as_str()) {
            self.meta.save(&meta)?;
            return Err(SyncError::not_found(format!("branch `{branch}`")));
        }
        if !all.pruned.is_empty() {
            self.meta.save(&meta)?;
        }

        let now = repo.resolve_ref(&branch.remote_ref())?;
        let changed = now != prev;
        if changed && let Some(oid) = now {
            sync_branch(repo.as_ref(), &branch, oid)?;
        }
        Ok(FetchOutcome {
            pulled_commit: now,
            changed,
        })
    }

    /// Lightweight "anything new?" poll for the session's branch and the base
    /// branch, without moving `HEAD`.
    ///
    /// One all-branches fetch covers both questions and picks up prunes.
    ///
    /// # Errors
    /// Fails `NotFound` when the session's current branch was deleted
    /// remotely (after pruning it locally).
    pub fn refresh(&self, session: &Session) -> Result<RefreshOutcome, SyncError> {
        let repo = self.open(session)?;
        let mut meta = self.load_metadata(session)?;
        let branch = &session.branch;

        let prev_branch = repo.resolve_ref(&branch.remote_ref())?;
        let prev_base = repo.resolve_ref(&self.base.remote_ref())?;

        let all = self.fetch_all_inner(repo.as_ref(), &mut meta, &session.auth, &session.repo_folder)?;
        if all.timed_out {
            return Ok(RefreshOutcome {
                pulled_commit: prev_branch,
                branch_changed: false,
                base_changed: false,
            });
        }
        if all.pruned.iter().any(|n| n == branch.as_str()) {
            self.meta.save(&meta)?;
            return Err(SyncError::not_found(format!("branch `{branch}`")));
        }
        if !all.pruned.is_empty() {
            self.meta.save(&meta)?;
        }

        let now_branch = repo.resolve_ref(&branch.remote_ref())?;
        let now_base = repo.resolve_ref(&self.base.remote_ref())?;

        let branch_changed = now_branch != prev_branch;
        if branch_changed && let Some(oid) = now_branch {
            sync_branch(repo.as_ref(), branch, oid)?;
        }
        let base_changed = now_base != prev_base;
        if base_changed
            && branch.as_str() != self.base.as_str()
            && let Some(oid) = now_base
        {
            sync_branch(repo.as_ref(), &self.base, oid)?;
        }

        Ok(RefreshOutcome {
            pulled_commit: now_branch,
            branch_changed,
            base_changed,
        })
    }

    /// Single-branch fetch against an already open repository.
    ///
    /// Used directly by operations that have their own repo/metadata in hand
    /// (commit, delete, checkout, access).
    pub(crate) fn fetch_branch_inner(
        &self,
        repo: &dyn GitRepo,
        meta: &mut RepoMetadata,
        auth: &RemoteAuth,
        branch: &BranchName,
    ) -> Result<FetchOutcome, SyncError> {
        let prev = repo.resolve_ref(&branch.remote_ref())?;
        match repo.fetch_branch(branch, auth, &self.fetch_limits()) {
            Ok(()) => {}
            Err(GitError::RemoteRefMissing { .. }) => {
                tracing::debug!(branch = %branch, "remote branch gone, fetch is a no-op");
                return Ok(FetchOutcome {
                    pulled_commit: prev,
                    changed: false,
                });
            }
            Err(GitError::Timeout { seconds }) => {
                tracing::warn!(branch = %branch, seconds, "fetch timed out, marking clone stale");
                meta.stale = true;
                self.meta.save(meta)?;
                return Ok(FetchOutcome {
                    pulled_commit: prev,
                    changed: false,
                });
            }
            Err(e) => return Err(e.into()),
        }

        let now = repo.resolve_ref(&branch.remote_ref())?;
        let changed = now != prev;
        if changed && let Some(oid) = now {
            tracing::info!(branch = %branch, commit = %oid, "fetched new upstream state");
            sync_branch(repo, branch, oid)?;
        }
        Ok(FetchOutcome {
            pulled_commit: now,
            changed,
        })
    }

    /// All-branches transfer plus pruning of branches deleted upstream.
    ///
    /// Pruning removes both refs, the branch's draft overlay folder, and its
    /// base-SHA entries (in `meta`, in memory; callers persist).
    pub(crate) fn fetch_all_inner(
        &self,
        repo: &dyn GitRepo,
        meta: &mut RepoMetadata,
        auth: &RemoteAuth,
        repo_folder: &str,
    ) -> Result<AllFetch, SyncError> {
        let advertised = match repo.fetch_all(auth, &self.fetch_limits()) {
            Ok(names) => names,
            Err(GitError::Timeout { seconds }) => {
                tracing::warn!(seconds, "fetch timed out, marking clone stale");
                meta.stale = true;
                self.meta.save(meta)?;
                return Ok(AllFetch {
                    pruned: Vec::new(),
                    timed_out: true,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut pruned = Vec::new();
        for name in repo.list_branches(BranchScope::RemoteTracking)? {
            if name == "HEAD" || advertised.iter().any(|a| a == &name) {
                continue;
            }
            let Ok(branch) = BranchName::new(&name) else {
                continue;
            };
            repo.delete_ref(&branch.remote_ref())?;
            repo.delete_ref(&branch.local_ref())?;
            self.drafts.remove_branch(repo_folder, &name)?;
            meta.clear_branch(&name);
            tracing::info!(branch = %name, "pruned branch deleted on remote");
            pruned.push(name);
        }
        Ok(AllFetch {
            pruned,
            timed_out: false,
        })
    }

}

/// Keep the local ref in step with a freshly fetched remote-tracking
/// position, rebuilding the index when the branch is checked out.
fn sync_branch(repo: &dyn GitRepo, branch: &BranchName, oid: GitOid) -> Result<(), SyncError> {
    repo.write_ref(&branch.local_ref(), oid)?;
    if repo.head_branch()?.as_deref() == Some(branch.as_str()) {
        repo.rebuild_index(oid)?;
    }
    Ok(())
}
