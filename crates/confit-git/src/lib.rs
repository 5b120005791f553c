//! Git abstraction layer for confit.
//!
//! This crate defines the [`GitRepo`] and [`GitBackend`] traits — the
//! interface through which the confit sync engine interacts with git. The
//! engine never imports git2 (or any other git library) directly; instead it
//! depends on `confit-git` and programs against the traits.
//!
//! # Crate layout
//!
//! - [`repo`] — the [`GitRepo`] and [`GitBackend`] trait definitions.
//! - [`types`] — value types used in trait signatures ([`GitOid`],
//!   [`BranchName`], [`TreeEntry`], [`RemoteAuth`], etc.).
//! - [`error`] — the [`GitError`] enum returned by all trait methods.

pub mod error;
pub mod repo;
pub mod types;

// libgit2-backed implementation modules
mod git2_repo;
mod refs_impl;
mod objects_impl;
mod index_impl;
mod commits_impl;
mod remote_impl;
mod config_impl;

pub use git2_repo::{Git2Backend, Git2Repo};

// Re-export the traits and commonly used types at the crate root for
// ergonomic imports: `use confit_git::{GitRepo, GitOid, GitError};`
pub use error::GitError;
pub use repo::{GitBackend, GitRepo};
pub use types::{
    BranchName, BranchNameError, BranchScope, CommitAuthor, CommitInfo, EntryMode, FetchLimits,
    GitOid, OidParseError, RemoteAuth, TreeEntry,
};
