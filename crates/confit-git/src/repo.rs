//! The [`GitRepo`] and [`GitBackend`] traits — the abstraction boundary
//! between the sync engine and git.
//!
//! The engine interacts with git exclusively through these traits. Both are
//! object-safe so callers can hold `Box<dyn GitRepo>` / `Box<dyn GitBackend>`
//! and tests can wrap the real backend in counting or fault-injecting
//! decorators.
//!
//! A repository managed through this trait is a *shadow clone*: it has a
//! workdir but nothing is ever checked out into it. All reads go through
//! commit trees, all writes go through the index. The only mutable state is
//! refs, config, the odb, and the index.

use std::path::Path;

use crate::error::GitError;
use crate::types::{
    BranchName, BranchScope, CommitAuthor, CommitInfo, FetchLimits, GitOid, RemoteAuth, TreeEntry,
};

/// The git abstraction trait used by the sync engine.
///
/// Backed by libgit2 in production ([`Git2Repo`](crate::Git2Repo)); tests may
/// substitute doubles.
///
/// # Object safety
///
/// This trait is object-safe: no generic methods, no `Self` in return position
/// outside of `Result`. Callers may use `&dyn GitRepo` or `Box<dyn GitRepo>`.
pub trait GitRepo {
    // -----------------------------------------------------------------------
    // Refs
    //
    // Replaces: git rev-parse, git update-ref, git update-ref -d,
    //           git symbolic-ref, git branch --list
    // -----------------------------------------------------------------------

    /// Resolve a full ref name (`refs/heads/x`, `refs/remotes/origin/x`,
    /// `HEAD`) to a commit OID, returning `None` if it does not exist.
    ///
    /// Replaces: `git rev-parse <ref>`.
    fn resolve_ref(&self, name: &str) -> Result<Option<GitOid>, GitError>;

    /// Create or overwrite a ref unconditionally.
    ///
    /// Replaces: `git update-ref <name> <oid>`.
    fn write_ref(&self, name: &str, oid: GitOid) -> Result<(), GitError>;

    /// Delete a ref. No-op if the ref does not exist.
    ///
    /// Replaces: `git update-ref -d <name>`.
    fn delete_ref(&self, name: &str) -> Result<(), GitError>;

    /// Point the symbolic `HEAD` at a branch. The branch may be unborn.
    ///
    /// Replaces: `git symbolic-ref HEAD refs/heads/<branch>`.
    fn set_head(&self, branch: &BranchName) -> Result<(), GitError>;

    /// The branch `HEAD` currently points at, or `None` if detached.
    ///
    /// Replaces: `git symbolic-ref --short HEAD`.
    fn head_branch(&self) -> Result<Option<String>, GitError>;

    /// List branch names in the given scope, sorted.
    ///
    /// Remote-tracking names are reported with the `origin/` prefix stripped,
    /// so both scopes speak plain branch names.
    ///
    /// Replaces: `git branch --list` / `git branch --list -r`.
    fn list_branches(&self, scope: BranchScope) -> Result<Vec<String>, GitError>;

    // -----------------------------------------------------------------------
    // Object read
    //
    // Replaces: git cat-file blob, git cat-file commit, git ls-tree
    // -----------------------------------------------------------------------

    /// Read the contents of a blob object.
    ///
    /// Replaces: `git cat-file blob <oid>`.
    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError>;

    /// Read a commit object's tree, parents, message, and identities.
    ///
    /// Replaces: `git cat-file commit <oid>`.
    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError>;

    /// List the entries of the tree at `dir` inside `commit`'s root tree.
    ///
    /// `dir` is a slash-separated path; the empty string lists the root tree.
    /// A missing directory (or a path that is not a tree) yields an empty
    /// vector, not an error: callers walk speculative layouts.
    ///
    /// Replaces: `git ls-tree <commit> <dir>`.
    fn list_dir(&self, commit: GitOid, dir: &str) -> Result<Vec<TreeEntry>, GitError>;

    /// Look up a single path inside `commit`'s tree.
    ///
    /// Returns `None` if the path does not exist.
    ///
    /// Replaces: `git ls-tree <commit> -- <path>`.
    fn find_file(&self, commit: GitOid, path: &str) -> Result<Option<TreeEntry>, GitError>;

    // -----------------------------------------------------------------------
    // Index
    //
    // Replaces: git read-tree, git update-index, git rm --cached
    // -----------------------------------------------------------------------

    /// Reset the index to exactly the tree of `commit` and delete anything
    /// that leaked into the workdir.
    ///
    /// This is the invariant-restoring operation for a shadow clone: after it
    /// returns, the index mirrors the commit tree and the workdir contains
    /// only `.git`.
    ///
    /// Replaces: `git read-tree <commit>` plus a workdir sweep.
    fn rebuild_index(&self, commit: GitOid) -> Result<(), GitError>;

    /// Write `data` to the odb as a blob and stage it at `path`.
    ///
    /// Returns the blob OID.
    ///
    /// Replaces: `git hash-object -w` + `git update-index --add --cacheinfo`.
    fn stage_blob(&self, path: &str, data: &[u8]) -> Result<GitOid, GitError>;

    /// Remove `path` from the index. No-op if the path is not staged.
    ///
    /// Replaces: `git rm --cached <path>`.
    fn unstage(&self, path: &str) -> Result<(), GitError>;

    // -----------------------------------------------------------------------
    // Commits
    //
    // Replaces: git write-tree + git commit-tree + git update-ref
    // -----------------------------------------------------------------------

    /// Commit the current index onto `branch`.
    ///
    /// The new commit's parent is the branch's current tip (none for an
    /// unborn branch); `refs/heads/<branch>` is advanced to the new commit.
    /// Returns the commit OID.
    fn commit_staged(
        &self,
        branch: &BranchName,
        message: &str,
        author: &CommitAuthor,
    ) -> Result<GitOid, GitError>;

    /// Commit the current index onto `branch` as a two-parent merge commit.
    ///
    /// Parents are `[branch tip, second_parent]` in that order;
    /// `refs/heads/<branch>` is advanced to the new commit. Returns the
    /// commit OID.
    fn merge_commit(
        &self,
        branch: &BranchName,
        message: &str,
        author: &CommitAuthor,
        second_parent: GitOid,
    ) -> Result<GitOid, GitError>;

    // -----------------------------------------------------------------------
    // Remote
    //
    // Replaces: git ls-remote, git fetch, git push
    // -----------------------------------------------------------------------

    /// List every ref the remote advertises, as `(ref_name, oid)` pairs.
    ///
    /// Ref names are full (`refs/heads/x`, `HEAD`, `refs/tags/v1`).
    ///
    /// Replaces: `git ls-remote origin`.
    fn ls_remote(&self, auth: &RemoteAuth) -> Result<Vec<(String, GitOid)>, GitError>;

    /// Fetch a single branch from `origin`, updating its remote-tracking ref.
    ///
    /// Returns [`GitError::RemoteRefMissing`] if the remote no longer
    /// advertises the branch; the remote-tracking ref is left untouched in
    /// that case.
    ///
    /// Replaces: `git fetch origin <branch>`.
    fn fetch_branch(
        &self,
        branch: &BranchName,
        auth: &RemoteAuth,
        limits: &FetchLimits,
    ) -> Result<(), GitError>;

    /// Fetch all branches from `origin`, updating every remote-tracking ref.
    ///
    /// Returns the branch names the remote advertised during this transfer.
    /// Remote-tracking refs for branches deleted upstream are *not* pruned;
    /// the caller diffs the advertised list against
    /// [`list_branches`](Self::list_branches) to find them.
    ///
    /// Replaces: `git fetch origin` + `git ls-remote --heads origin`.
    fn fetch_all(&self, auth: &RemoteAuth, limits: &FetchLimits) -> Result<Vec<String>, GitError>;

    /// Push `refs/heads/<branch>` to the same ref on `origin`.
    ///
    /// Returns [`GitError::PushRejected`] if the remote refuses the update.
    ///
    /// Replaces: `git push origin <branch>` (`--force` when `force`).
    fn push_branch(
        &self,
        branch: &BranchName,
        auth: &RemoteAuth,
        force: bool,
    ) -> Result<(), GitError>;

    // -----------------------------------------------------------------------
    // Config
    //
    // Replaces: git config --get, git config --local
    // -----------------------------------------------------------------------

    /// Read a config key from the repository's local configuration.
    ///
    /// Returns `None` if the key is not set.
    fn read_config(&self, key: &str) -> Result<Option<String>, GitError>;

    /// Set a config key in the repository's local configuration.
    fn write_config(&self, key: &str, value: &str) -> Result<(), GitError>;
}

impl std::fmt::Debug for dyn GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GitRepo")
    }
}

/// Creates and opens repositories.
///
/// Split from [`GitRepo`] so the engine can be handed a backend that
/// manufactures repositories on demand (and so tests can count or fail
/// clone attempts).
pub trait GitBackend {
    /// Create a shadow clone of `url` at `dir`, fetching only `branch`.
    ///
    /// Equivalent to `git clone --no-checkout --depth <limits.depth>` for a
    /// single branch: the odb is populated, `refs/remotes/origin/<branch>`
    /// and `refs/heads/<branch>` point at its tip, `HEAD` is symbolic to the
    /// branch, and the workdir stays empty.
    ///
    /// On failure the partially created directory is left behind; callers
    /// remove it.
    fn clone_repo(
        &self,
        url: &str,
        dir: &Path,
        branch: &BranchName,
        auth: &RemoteAuth,
        limits: &FetchLimits,
    ) -> Result<Box<dyn GitRepo>, GitError>;

    /// Open an existing repository at `dir`.
    fn open_repo(&self, dir: &Path) -> Result<Box<dyn GitRepo>, GitError>;
}
