//! Repository access: clone-or-reuse, session issuance and validation, and
//! the username type-ahead cache.

use std::collections::BTreeMap;
use std::path::Path;

use confit_git::{BranchName, FetchLimits, GitRepo, RemoteAuth};

use super::SyncEngine;
use crate::error::SyncError;
use crate::model::{Credentials, Principal, RepoMetadata, SCHEMA_VERSION, Session};
use crate::paths::PathFinder;

impl SyncEngine {
    /// Open a repository for a user and issue a session.
    ///
    /// An existing clone is reused when its metadata record is present,
    /// parseable, carries the current schema version, and is not marked
    /// stale; anything else discards the clone and starts over. A fresh
    /// clone is shallow (depth 1), checkout-free, and fetched for the base
    /// branch only; a reused clone is brought up to date with a fetch
    /// instead, and the session resumes the branch recorded in its metadata.
    /// Either way the password is sealed into the metadata record, the draft
    /// overlay root is ensured, and the username lands in the type-ahead
    /// cache (best effort). A failure during cloning leaves no partial clone
    /// behind.
    ///
    /// # Errors
    /// Fails `Unauthorized`/`Forbidden`/`NotFound` per the transport
    /// translation for bad credentials or a missing repository; propagates
    /// I/O and sealing failures.
    pub fn access_repo(&self, credentials: &Credentials) -> Result<Session, SyncError> {
        let repo_name = PathFinder::repo_name(&credentials.repo_url);
        let repo_folder =
            PathFinder::repo_folder(&credentials.username, &repo_name, self.base.as_str());
        let dir = self.paths().repo_dir(&repo_folder);
        let auth = RemoteAuth {
            username: Some(credentials.username.clone()),
            password: Some(credentials.password.clone()),
        };

        let existing = if dir.exists() {
            match self.meta.load(&repo_folder) {
                Some(meta) if !meta.stale => Some(meta),
                Some(_) => {
                    tracing::info!(repo_folder = %repo_folder, "clone marked stale, discarding");
                    self.discard_clone(&dir, &repo_folder)?;
                    None
                }
                None => {
                    tracing::warn!(repo_folder = %repo_folder, "clone has no usable metadata, discarding");
                    self.discard_clone(&dir, &repo_folder)?;
                    None
                }
            }
        } else {
            None
        };

        let (branch, mut meta) = match existing {
            Some(mut meta) => {
                let repo = self.open_dir(&dir)?;
                let branch =
                    BranchName::new(&meta.branch).unwrap_or_else(|_| self.base.clone());
                self.fetch_branch_inner(repo.as_ref(), &mut meta, &auth, &self.base)?;
                if branch != self.base {
                    self.fetch_branch_inner(repo.as_ref(), &mut meta, &auth, &branch)?;
                }
                tracing::info!(repo_folder = %repo_folder, branch = %branch, "reusing existing clone");
                (branch, meta)
            }
            None => {
                if let Some(parent) = dir.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let limits = FetchLimits {
                    depth: Some(1),
                    timeout: Some(self.config.fetch_timeout()),
                };
                let repo = match self.backend.clone_repo(
                    &credentials.repo_url,
                    &dir,
                    &self.base,
                    &auth,
                    &limits,
                ) {
                    Ok(repo) => repo,
                    Err(e) => {
                        let _ = std::fs::remove_dir_all(&dir);
                        return Err(e.into());
                    }
                };
                if let Err(e) = self.finish_clone(repo.as_ref()) {
                    let _ = std::fs::remove_dir_all(&dir);
                    return Err(e);
                }
                tracing::info!(url = %credentials.repo_url, repo_folder = %repo_folder, "repository cloned");
                let meta = RepoMetadata {
                    version: SCHEMA_VERSION,
                    repo_folder: repo_folder.clone(),
                    username: credentials.username.clone(),
                    repo_url: credentials.repo_url.clone(),
                    repo_name: repo_name.clone(),
                    branch: self.base.as_str().to_owned(),
                    sealed_password: String::new(),
                    commit_base_sha: BTreeMap::new(),
                    stale: false,
                };
                (self.base.clone(), meta)
            }
        };

        meta.sealed_password = self.sealer.seal(&credentials.password)?;
        meta.branch = branch.as_str().to_owned();
        meta.stale = false;
        self.meta.save(&meta)?;
        self.drafts.ensure_root(&repo_folder)?;
        // The cache is a convenience; never let it fail the login.
        if let Err(e) = self.sessions.register_user(&credentials.username) {
            tracing::warn!(error = %e, "failed to update username cache");
        }

        let session = Session {
            token: String::new(),
            username: credentials.username.clone(),
            repo_url: credentials.repo_url.clone(),
            repo_name,
            repo_folder,
            branch,
            auth,
        };
        Ok(self.sessions.issue(session))
    }

    /// Validate a session token and return the caller's principal view.
    ///
    /// # Errors
    /// Fails `Unauthorized` ("session expired") for unknown or idle-expired
    /// tokens, `NotFound` if the clone's metadata has gone missing.
    pub fn check_session(&self, token: &str) -> Result<Principal, SyncError> {
        let session = self.sessions.check(token)?;
        let metadata = self.load_metadata(&session)?;
        Ok(Principal { session, metadata })
    }

    /// Drop a session immediately.
    pub fn logout(&self, token: &str) {
        self.sessions.evict(token);
    }

    /// Case-insensitive prefix matches from the username type-ahead cache.
    ///
    /// # Errors
    /// Propagates cache read failures.
    pub fn users_matching(&self, prefix: &str) -> Result<Vec<String>, SyncError> {
        self.sessions.users_matching(prefix)
    }

    fn discard_clone(&self, dir: &Path, repo_folder: &str) -> Result<(), SyncError> {
        std::fs::remove_dir_all(dir)?;
        self.meta.delete(repo_folder)?;
        Ok(())
    }

    /// A fresh shadow clone arrives with refs seeded but an empty index;
    /// mirror the base branch tip into it.
    fn finish_clone(&self, repo: &dyn GitRepo) -> Result<(), SyncError> {
        let tip = repo
            .resolve_ref(&self.base.local_ref())?
            .ok_or_else(|| SyncError::not_found(format!("branch `{}` after clone", self.base)))?;
        repo.rebuild_index(tip)?;
        Ok(())
    }
}
