//! The sync engine.
//!
//! Orchestrates clone-or-reuse, fetch/refresh, ref bookkeeping, the
//! commit/push transaction with optimistic-concurrency conflict detection
//! and rollback, and branch create/diff/merge — all against shadow clones
//! that never materialize a working tree.
//!
//! One session drives one local clone at a time; the engine takes no locks.
//! Correctness against *other* users editing the same remote comes entirely
//! from the OID-based optimistic check in the commit protocol, not from
//! mutual exclusion. Every mutating sequence follows fetch → compare →
//! reset-to-known-state → mutate → verify-or-rollback, so an interrupted
//! attempt never leaves refs out of sync with the index.
//!
//! # Module layout
//!
//! - [`access`] — repository access, session checks, the user cache.
//! - [`fetch`] — single-branch fetch, all-branches refresh with pruning.
//! - [`branches`] — branch listing and switch/create.
//! - [`files`] — tree walks, file content, drafts, file deletion.
//! - [`commit`] — the optimistic commit protocol and the push transaction.
//! - [`diff`] — branch diff classification and the two-parent fast merge.

mod access;
mod branches;
mod commit;
mod diff;
mod fetch;
mod files;

pub use commit::{VersionCheck, optimistic_check};
pub use diff::{Snapshot, SnapshotDelta, classify};

use std::path::Path;

use confit_git::{BranchName, CommitAuthor, FetchLimits, Git2Backend, GitBackend, GitRepo};

use crate::config::EngineConfig;
use crate::drafts::DraftStore;
use crate::error::SyncError;
use crate::metadata::MetadataStore;
use crate::model::{RepoMetadata, Session};
use crate::paths::PathFinder;
use crate::secrets::Sealer;
use crate::session::SessionStore;

/// The Git-backed configuration synchronization engine.
///
/// Construct once per process with [`SyncEngine::new`] and share by
/// reference; all state lives in the stores, not in the engine itself.
pub struct SyncEngine {
    pub(crate) config: EngineConfig,
    pub(crate) backend: Box<dyn GitBackend>,
    pub(crate) base: BranchName,
    pub(crate) sealer: Sealer,
    pub(crate) meta: MetadataStore,
    pub(crate) drafts: DraftStore,
    pub(crate) sessions: SessionStore,
}

impl SyncEngine {
    /// Create an engine over the production libgit2 backend.
    ///
    /// # Errors
    /// Returns an error if the configured base branch is not a valid branch
    /// name.
    pub fn new(config: EngineConfig) -> Result<Self, SyncError> {
        Self::with_backend(config, Box::new(Git2Backend))
    }

    /// Create an engine over an arbitrary [`GitBackend`].
    ///
    /// Tests use this to wrap the real backend in counting or
    /// fault-injecting decorators.
    ///
    /// # Errors
    /// Returns an error if the configured base branch is not a valid branch
    /// name.
    pub fn with_backend(
        config: EngineConfig,
        backend: Box<dyn GitBackend>,
    ) -> Result<Self, SyncError> {
        let base = BranchName::new(&config.base_branch).map_err(|e| SyncError::Config(
            crate::config::ConfigError {
                path: None,
                message: format!("base_branch: {e}"),
            },
        ))?;
        let sealer = Sealer::new(&config.secrets);
        let meta = MetadataStore::new(config.meta_dir.clone());
        let drafts = DraftStore::new(config.drafts_dir.clone(), config.apps_root.clone());
        let sessions = SessionStore::new(
            config.meta_dir.join("users.json"),
            config.session_timeout(),
        );
        Ok(Self {
            config,
            backend,
            base,
            sealer,
            meta,
            drafts,
            sessions,
        })
    }

    /// The engine's configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The configured base branch.
    #[must_use]
    pub const fn base_branch(&self) -> &BranchName {
        &self.base
    }

    // -----------------------------------------------------------------------
    // Shared internals
    // -----------------------------------------------------------------------

    pub(crate) const fn paths(&self) -> PathFinder<'_> {
        PathFinder::new(&self.config)
    }

    /// Parse a caller-supplied branch name; a name git would reject reads as
    /// a branch that cannot exist.
    pub(crate) fn parse_branch(name: &str) -> Result<BranchName, SyncError> {
        BranchName::new(name)
            .map_err(|e| SyncError::not_found(format!("branch `{name}`: {}", e.reason)))
    }

    /// Open the session's shadow clone.
    pub(crate) fn open(&self, session: &Session) -> Result<Box<dyn GitRepo>, SyncError> {
        let dir = self.paths().repo_dir(&session.repo_folder);
        self.open_dir(&dir)
    }

    pub(crate) fn open_dir(&self, dir: &Path) -> Result<Box<dyn GitRepo>, SyncError> {
        Ok(self.backend.open_repo(dir)?)
    }

    /// Load the session's metadata record, failing if it has gone missing.
    pub(crate) fn load_metadata(&self, session: &Session) -> Result<RepoMetadata, SyncError> {
        self.meta
            .load(&session.repo_folder)
            .ok_or_else(|| SyncError::not_found(format!("metadata for {}", session.repo_folder)))
    }

    /// Transfer limits for fetch/push: no depth cap, configured timeout.
    pub(crate) const fn fetch_limits(&self) -> FetchLimits {
        FetchLimits {
            depth: None,
            timeout: Some(self.config.fetch_timeout()),
        }
    }

    /// The identity recorded on commits made for `session`.
    pub(crate) fn commit_author(&self, session: &Session) -> CommitAuthor {
        let name = if session.username.is_empty() {
            self.config.author.name.clone()
        } else {
            session.username.clone()
        };
        CommitAuthor {
            name,
            email: self.config.author.email.clone(),
        }
    }

    /// Resolve a branch to a commit: local ref first, remote-tracking second.
    pub(crate) fn branch_tip(
        &self,
        repo: &dyn GitRepo,
        branch: &BranchName,
    ) -> Result<Option<confit_git::GitOid>, SyncError> {
        if let Some(oid) = repo.resolve_ref(&branch.local_ref())? {
            return Ok(Some(oid));
        }
        Ok(repo.resolve_ref(&branch.remote_ref())?)
    }
}
