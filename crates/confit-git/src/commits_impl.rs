//! libgit2-backed commit creation onto branch refs.

use crate::error::GitError;
use crate::git2_repo::{Git2Repo, backend_err, from_git2_oid};
use crate::objects_impl::find_commit;
use crate::refs_impl::resolve_ref;
use crate::types::{BranchName, CommitAuthor, GitOid};

fn signature(author: &CommitAuthor) -> Result<git2::Signature<'static>, GitError> {
    git2::Signature::now(&author.name, &author.email).map_err(|e| backend_err(&e))
}

/// Write the current index out as a tree object.
fn write_index_tree(repo: &Git2Repo) -> Result<git2::Oid, GitError> {
    let mut index = repo.repo.index().map_err(|e| backend_err(&e))?;
    index.write_tree().map_err(|e| backend_err(&e))
}

pub fn commit_staged(
    repo: &Git2Repo,
    branch: &BranchName,
    message: &str,
    author: &CommitAuthor,
) -> Result<GitOid, GitError> {
    let tree_oid = write_index_tree(repo)?;
    let tree = repo.repo.find_tree(tree_oid).map_err(|e| backend_err(&e))?;
    let sig = signature(author)?;
    let ref_name = branch.local_ref();

    // Parent is the branch tip; a root commit for an unborn branch.
    let parent = resolve_ref(repo, &ref_name)?;
    let parent_commit = match parent {
        Some(oid) => Some(find_commit(repo, oid)?),
        None => None,
    };
    let parents: Vec<&git2::Commit<'_>> = parent_commit.iter().collect();

    let oid = repo
        .repo
        .commit(Some(&ref_name), &sig, &sig, message, &tree, &parents)
        .map_err(|e| backend_err(&e))?;
    Ok(from_git2_oid(oid))
}

pub fn merge_commit(
    repo: &Git2Repo,
    branch: &BranchName,
    message: &str,
    author: &CommitAuthor,
    second_parent: GitOid,
) -> Result<GitOid, GitError> {
    let tree_oid = write_index_tree(repo)?;
    let tree = repo.repo.find_tree(tree_oid).map_err(|e| backend_err(&e))?;
    let sig = signature(author)?;
    let ref_name = branch.local_ref();

    let head_oid = resolve_ref(repo, &ref_name)?.ok_or_else(|| GitError::NotFound {
        message: format!("branch {branch} has no commit to merge onto"),
    })?;
    let first = find_commit(repo, head_oid)?;
    let second = find_commit(repo, second_parent)?;

    let oid = repo
        .repo
        .commit(Some(&ref_name), &sig, &sig, message, &tree, &[&first, &second])
        .map_err(|e| backend_err(&e))?;
    Ok(from_git2_oid(oid))
}
