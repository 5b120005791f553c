//! libgit2-backed object reads: blobs, commits, tree walks.
//!
//! All reads address commit trees directly. Nothing here touches the
//! workdir or the index.

use std::path::Path;

use crate::error::GitError;
use crate::git2_repo::{Git2Repo, backend_err, from_git2_oid, to_git2_oid};
use crate::types::{CommitInfo, EntryMode, GitOid, TreeEntry};

/// Look up a commit, mapping a missing object to [`GitError::NotFound`].
pub(crate) fn find_commit(repo: &Git2Repo, oid: GitOid) -> Result<git2::Commit<'_>, GitError> {
    match repo.repo.find_commit(to_git2_oid(oid)) {
        Ok(commit) => Ok(commit),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Err(GitError::NotFound {
            message: format!("commit {oid}"),
        }),
        Err(e) => Err(backend_err(&e)),
    }
}

pub fn read_blob(repo: &Git2Repo, oid: GitOid) -> Result<Vec<u8>, GitError> {
    match repo.repo.find_blob(to_git2_oid(oid)) {
        Ok(blob) => Ok(blob.content().to_vec()),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Err(GitError::NotFound {
            message: format!("blob {oid}"),
        }),
        Err(e) => Err(backend_err(&e)),
    }
}

pub fn read_commit(repo: &Git2Repo, oid: GitOid) -> Result<CommitInfo, GitError> {
    let commit = find_commit(repo, oid)?;
    Ok(CommitInfo {
        tree_oid: from_git2_oid(commit.tree_id()),
        parents: commit.parent_ids().map(from_git2_oid).collect(),
        message: commit.message().unwrap_or_default().to_owned(),
        author: identity(&commit.author()),
        committer: identity(&commit.committer()),
    })
}

fn identity(sig: &git2::Signature<'_>) -> String {
    format!(
        "{} <{}>",
        sig.name().unwrap_or_default(),
        sig.email().unwrap_or_default()
    )
}

pub fn list_dir(repo: &Git2Repo, commit: GitOid, dir: &str) -> Result<Vec<TreeEntry>, GitError> {
    let commit = find_commit(repo, commit)?;
    let root = commit.tree().map_err(|e| backend_err(&e))?;
    let tree = if dir.is_empty() {
        root
    } else {
        match root.get_path(Path::new(dir)) {
            Ok(entry) => {
                if entry.kind() != Some(git2::ObjectType::Tree) {
                    return Ok(Vec::new());
                }
                repo.repo.find_tree(entry.id()).map_err(|e| backend_err(&e))?
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(backend_err(&e)),
        }
    };

    let mut out = Vec::with_capacity(tree.len());
    for entry in &tree {
        let Some(name) = entry.name() else {
            continue;
        };
        let Some(mode) = entry_mode(entry.filemode()) else {
            continue;
        };
        out.push(TreeEntry {
            name: name.to_owned(),
            mode,
            oid: from_git2_oid(entry.id()),
        });
    }
    Ok(out)
}

pub fn find_file(
    repo: &Git2Repo,
    commit: GitOid,
    path: &str,
) -> Result<Option<TreeEntry>, GitError> {
    let commit = find_commit(repo, commit)?;
    let root = commit.tree().map_err(|e| backend_err(&e))?;
    match root.get_path(Path::new(path)) {
        Ok(entry) => {
            let Some(mode) = entry_mode(entry.filemode()) else {
                return Ok(None);
            };
            Ok(Some(TreeEntry {
                name: entry.name().unwrap_or_default().to_owned(),
                mode,
                oid: from_git2_oid(entry.id()),
            }))
        }
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(backend_err(&e)),
    }
}

fn entry_mode(filemode: i32) -> Option<EntryMode> {
    match filemode {
        0o040_000 => Some(EntryMode::Tree),
        0o100_644 | 0o100_664 => Some(EntryMode::Blob),
        0o100_755 => Some(EntryMode::BlobExecutable),
        0o120_000 => Some(EntryMode::Link),
        0o160_000 => Some(EntryMode::Commit),
        _ => None,
    }
}
