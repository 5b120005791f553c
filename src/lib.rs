//! confit — a Git-backed configuration store.
//!
//! Browser-edited YAML configuration lives in a remote git repository; this
//! crate keeps a local checkout-free *shadow clone* per user, overlays
//! uncommitted drafts on top of it, and commits through an optimistic,
//! transactional push protocol that detects concurrent edits by blob OID
//! rather than by locking.
//!
//! The embedding layer talks to one type, [`SyncEngine`]: open a repository
//! with [`SyncEngine::access_repo`], then drive files, drafts, commits, and
//! branches through the session it returns. Git itself is reached through
//! the `confit-git` adapter crate, whose [`GitRepo`](confit_git::GitRepo)
//! trait is the only seam between the engine and libgit2.

pub mod config;
pub mod drafts;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod model;
pub mod paths;
pub mod secrets;
pub mod session;
pub mod telemetry;

pub use config::EngineConfig;
pub use engine::SyncEngine;
pub use error::SyncError;
pub use model::{
    BranchDiff, CheckoutMode, ConfigFile, ConflictFile, Credentials, FetchOutcome, FileListing,
    Principal, RefreshOutcome, RepoMetadata, Session,
};

// Branch and object identifiers appear throughout the public API; spare
// embedders a direct dependency on the adapter crate.
pub use confit_git::{BranchName, GitOid};
