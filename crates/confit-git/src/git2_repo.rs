//! The libgit2-backed implementation of [`GitRepo`].

use std::path::{Path, PathBuf};

use crate::error::GitError;
use crate::repo::{GitBackend, GitRepo};
use crate::types::{
    BranchName, BranchScope, CommitAuthor, CommitInfo, FetchLimits, GitOid, RemoteAuth, TreeEntry,
};

/// A [`GitRepo`] implementation backed by [git2](https://github.com/rust-lang/git2-rs).
///
/// Construct via [`Git2Repo::open`] or [`Git2Backend::clone_repo`].
pub struct Git2Repo {
    pub(crate) repo: git2::Repository,
    pub(crate) workdir: PathBuf,
}

impl Git2Repo {
    /// Open a non-bare git repository at exactly `path`.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::open(path).map_err(|e| GitError::Backend {
            message: format!("open {}: {}", path.display(), e.message()),
        })?;
        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| GitError::Backend {
                message: format!("repository at {} has no workdir", path.display()),
            })?;
        Ok(Self { repo, workdir })
    }
}

// ---------------------------------------------------------------------------
// OID conversion helpers, shared by the *_impl modules
// ---------------------------------------------------------------------------

/// Convert a `GitOid` (raw 20 bytes) to a `git2::Oid`.
pub(crate) fn to_git2_oid(oid: GitOid) -> git2::Oid {
    git2::Oid::from_bytes(oid.as_bytes()).expect("a GitOid is always 20 valid bytes")
}

/// Convert a `git2::Oid` to a `GitOid`.
pub(crate) fn from_git2_oid(oid: git2::Oid) -> GitOid {
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(oid.as_bytes());
    GitOid::from_bytes(bytes)
}

/// Map an unclassified libgit2 error to [`GitError::Backend`].
pub(crate) fn backend_err(e: &git2::Error) -> GitError {
    GitError::Backend {
        message: e.message().to_owned(),
    }
}

impl GitRepo for Git2Repo {
    // === Refs ===
    fn resolve_ref(&self, name: &str) -> Result<Option<GitOid>, GitError> {
        crate::refs_impl::resolve_ref(self, name)
    }

    fn write_ref(&self, name: &str, oid: GitOid) -> Result<(), GitError> {
        crate::refs_impl::write_ref(self, name, oid)
    }

    fn delete_ref(&self, name: &str) -> Result<(), GitError> {
        crate::refs_impl::delete_ref(self, name)
    }

    fn set_head(&self, branch: &BranchName) -> Result<(), GitError> {
        crate::refs_impl::set_head(self, branch)
    }

    fn head_branch(&self) -> Result<Option<String>, GitError> {
        crate::refs_impl::head_branch(self)
    }

    fn list_branches(&self, scope: BranchScope) -> Result<Vec<String>, GitError> {
        crate::refs_impl::list_branches(self, scope)
    }

    // === Object read ===
    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError> {
        crate::objects_impl::read_blob(self, oid)
    }

    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError> {
        crate::objects_impl::read_commit(self, oid)
    }

    fn list_dir(&self, commit: GitOid, dir: &str) -> Result<Vec<TreeEntry>, GitError> {
        crate::objects_impl::list_dir(self, commit, dir)
    }

    fn find_file(&self, commit: GitOid, path: &str) -> Result<Option<TreeEntry>, GitError> {
        crate::objects_impl::find_file(self, commit, path)
    }

    // === Index ===
    fn rebuild_index(&self, commit: GitOid) -> Result<(), GitError> {
        crate::index_impl::rebuild_index(self, commit)
    }

    fn stage_blob(&self, path: &str, data: &[u8]) -> Result<GitOid, GitError> {
        crate::index_impl::stage_blob(self, path, data)
    }

    fn unstage(&self, path: &str) -> Result<(), GitError> {
        crate::index_impl::unstage(self, path)
    }

    // === Commits ===
    fn commit_staged(
        &self,
        branch: &BranchName,
        message: &str,
        author: &CommitAuthor,
    ) -> Result<GitOid, GitError> {
        crate::commits_impl::commit_staged(self, branch, message, author)
    }

    fn merge_commit(
        &self,
        branch: &BranchName,
        message: &str,
        author: &CommitAuthor,
        second_parent: GitOid,
    ) -> Result<GitOid, GitError> {
        crate::commits_impl::merge_commit(self, branch, message, author, second_parent)
    }

    // === Remote ===
    fn ls_remote(&self, auth: &RemoteAuth) -> Result<Vec<(String, GitOid)>, GitError> {
        crate::remote_impl::ls_remote(self, auth)
    }

    fn fetch_branch(
        &self,
        branch: &BranchName,
        auth: &RemoteAuth,
        limits: &FetchLimits,
    ) -> Result<(), GitError> {
        crate::remote_impl::fetch_branch(self, branch, auth, limits)
    }

    fn fetch_all(&self, auth: &RemoteAuth, limits: &FetchLimits) -> Result<Vec<String>, GitError> {
        crate::remote_impl::fetch_all(self, auth, limits)
    }

    fn push_branch(
        &self,
        branch: &BranchName,
        auth: &RemoteAuth,
        force: bool,
    ) -> Result<(), GitError> {
        crate::remote_impl::push_branch(self, branch, auth, force)
    }

    // === Config ===
    fn read_config(&self, key: &str) -> Result<Option<String>, GitError> {
        crate::config_impl::read_config(self, key)
    }

    fn write_config(&self, key: &str, value: &str) -> Result<(), GitError> {
        crate::config_impl::write_config(self, key, value)
    }
}

/// The production [`GitBackend`]: libgit2-backed shadow clones.
#[derive(Clone, Copy, Debug, Default)]
pub struct Git2Backend;

impl GitBackend for Git2Backend {
    fn clone_repo(
        &self,
        url: &str,
        dir: &Path,
        branch: &BranchName,
        auth: &RemoteAuth,
        limits: &FetchLimits,
    ) -> Result<Box<dyn GitRepo>, GitError> {
        let repo = crate::remote_impl::clone_shadow(url, dir, branch, auth, limits)?;
        Ok(Box::new(repo))
    }

    fn open_repo(&self, dir: &Path) -> Result<Box<dyn GitRepo>, GitError> {
        Ok(Box::new(Git2Repo::open(dir)?))
    }
}
