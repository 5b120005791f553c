//! Branch listing, switching, and all-or-nothing creation.

use std::collections::BTreeSet;

use confit_git::{BranchName, BranchScope};

use super::SyncEngine;
use crate::error::SyncError;
use crate::model::{CheckoutMode, Session};

impl SyncEngine {
    /// Selectable branch names: the union of local and remote-tracking
    /// branches, sorted and deduplicated, minus the synthetic `HEAD` pointer
    /// and every locked branch.
    ///
    /// # Errors
    /// Propagates repository read failures.
    pub fn list_branches(&self, session: &Session) -> Result<Vec<String>, SyncError> {
        let repo = self.open(session)?;
        let mut names: BTreeSet<String> = BTreeSet::new();
        names.extend(repo.list_branches(BranchScope::Local)?);
        names.extend(repo.list_branches(BranchScope::RemoteTracking)?);
        names.remove("HEAD");
        Ok(names
            .into_iter()
            .filter(|name| !self.config.is_locked(name))
            .collect())
    }

    /// Switch the session to an existing branch, or create a new one from
    /// the base branch and push it.
    ///
    /// Creation is all-or-nothing: the new branch appears locally only if
    /// its marker commit was accepted by the remote; on any failure the ref
    /// is removed and `HEAD` restored, as if the call never happened.
    ///
    /// # Errors
    /// Fails `Forbidden` for locked branch names, `BranchExists` when
    /// creating a name the remote or the clone already has, `NotFound` when
    /// switching to a branch that exists nowhere; propagates push failures.
    pub fn checkout_branch(
        &self,
        session: &mut Session,
        mode: CheckoutMode,
        name: &str,
    ) -> Result<(), SyncError> {
        let branch = Self::parse_branch(name)?;
        if self.config.is_locked(branch.as_str()) {
            return Err(SyncError::Forbidden {
                message: format!("branch `{branch}` is locked"),
            });
        }
        match mode {
            CheckoutMode::Switch => self.switch_branch(session, branch),
            CheckoutMode::Create => self.create_branch(session, branch),
        }
    }

    fn switch_branch(&self, session: &mut Session, branch: BranchName) -> Result<(), SyncError> {
        let repo = self.open(session)?;
        let mut meta = self.load_metadata(session)?;

        let fetched = self.fetch_branch_inner(repo.as_ref(), &mut meta, &session.auth, &branch)?;
        let tip = match fetched.pulled_commit {
            Some(tip) => Some(tip),
            None => self.branch_tip(repo.as_ref(), &branch)?,
        }
        .ok_or_else(|| SyncError::not_found(format!("branch `{branch}`")))?;

        repo.write_ref(&branch.local_ref(), tip)?;
        repo.set_head(&branch)?;
        repo.rebuild_index(tip)?;

        meta.branch = branch.as_str().to_owned();
        self.meta.save(&meta)?;
        self.sessions.update_branch(&session.token, &branch);
        session.branch = branch;
        tracing::info!(branch = %session.branch, "switched branch");
        Ok(())
    }

    fn create_branch(&self, session: &mut Session, branch: BranchName) -> Result<(), SyncError> {
        let repo = self.open(session)?;
        let mut meta = self.load_metadata(session)?;

        let advertised = repo.ls_remote(&session.auth)?;
        if advertised.iter().any(|(name, _)| *name == branch.local_ref())
            || repo.resolve_ref(&branch.local_ref())?.is_some()
        {
            return Err(SyncError::BranchExists {
                name: branch.as_str().to_owned(),
            });
        }

        let base_tip = self
            .branch_tip(repo.as_ref(), &self.base)?
            .ok_or_else(|| SyncError::not_found(format!("branch `{}`", self.base)))?;
        let previous_head = repo.head_branch()?;

        repo.write_ref(&branch.local_ref(), base_tip)?;
        repo.set_head(&branch)?;

        let author = self.commit_author(session);
        let message = format!("Create branch {branch}");
        // The index mirrors the base tip when the action runs, so this is an
        // empty marker commit: same tree, new commit on the new branch.
        let pushed = self.do_push(
            repo.as_ref(),
            &session.auth,
            &branch,
            base_tip,
            false,
            &mut |repo| Ok(repo.commit_staged(&branch, &message, &author)?),
        );

        if let Err(err) = pushed {
            repo.delete_ref(&branch.local_ref())?;
            if let Some(prev) = previous_head
                && let Ok(prev) = BranchName::new(&prev)
            {
                repo.set_head(&prev)?;
                if let Some(tip) = repo.resolve_ref(&prev.local_ref())? {
                    repo.rebuild_index(tip)?;
                }
            }
            tracing::warn!(branch = %branch, "branch creation rolled back");
            return Err(err);
        }

        repo.write_config(&format!("branch.{branch}.remote"), "origin")?;
        repo.write_config(&format!("branch.{branch}.merge"), &branch.local_ref())?;

        meta.branch = branch.as_str().to_owned();
        self.meta.save(&meta)?;
        self.sessions.update_branch(&session.token, &branch);
        session.branch = branch;
        tracing::info!(branch = %session.branch, "branch created and pushed");
        Ok(())
    }
}
