//! libgit2-backed ref and branch operations.

use crate::error::GitError;
use crate::git2_repo::{Git2Repo, backend_err, from_git2_oid, to_git2_oid};
use crate::types::{BranchName, BranchScope, GitOid};

pub fn resolve_ref(repo: &Git2Repo, name: &str) -> Result<Option<GitOid>, GitError> {
    match repo.repo.refname_to_id(name) {
        Ok(oid) => Ok(Some(from_git2_oid(oid))),
        Err(e)
            if e.code() == git2::ErrorCode::NotFound
                || e.code() == git2::ErrorCode::UnbornBranch =>
        {
            Ok(None)
        }
        Err(e) => Err(backend_err(&e)),
    }
}

pub fn write_ref(repo: &Git2Repo, name: &str, oid: GitOid) -> Result<(), GitError> {
    repo.repo
        .reference(name, to_git2_oid(oid), true, "confit")
        .map_err(|e| backend_err(&e))?;
    Ok(())
}

pub fn delete_ref(repo: &Git2Repo, name: &str) -> Result<(), GitError> {
    match repo.repo.find_reference(name) {
        Ok(mut reference) => reference.delete().map_err(|e| backend_err(&e)),
        // No-op if the ref does not exist (per trait contract).
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(()),
        Err(e) => Err(backend_err(&e)),
    }
}

pub fn set_head(repo: &Git2Repo, branch: &BranchName) -> Result<(), GitError> {
    // Symbolic write rather than Repository::set_head so the target branch
    // may be unborn.
    repo.repo
        .reference_symbolic("HEAD", &branch.local_ref(), true, "confit")
        .map_err(|e| backend_err(&e))?;
    Ok(())
}

pub fn head_branch(repo: &Git2Repo) -> Result<Option<String>, GitError> {
    let head = match repo.repo.find_reference("HEAD") {
        Ok(reference) => reference,
        Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(backend_err(&e)),
    };
    Ok(head
        .symbolic_target()
        .and_then(|target| target.strip_prefix("refs/heads/"))
        .map(str::to_owned))
}

pub fn list_branches(repo: &Git2Repo, scope: BranchScope) -> Result<Vec<String>, GitError> {
    let branch_type = match scope {
        BranchScope::Local => git2::BranchType::Local,
        BranchScope::RemoteTracking => git2::BranchType::Remote,
    };
    let mut out = Vec::new();
    for item in repo.repo.branches(Some(branch_type)).map_err(|e| backend_err(&e))? {
        let (branch, _) = item.map_err(|e| backend_err(&e))?;
        let Some(name) = branch.name().map_err(|e| backend_err(&e))? else {
            // Skip names that are not valid UTF-8.
            continue;
        };
        let short = match scope {
            BranchScope::Local => name,
            BranchScope::RemoteTracking => {
                // Only origin is ever configured; skip anything else.
                let Some(short) = name.strip_prefix("origin/") else {
                    continue;
                };
                short
            }
        };
        if short == "HEAD" {
            continue;
        }
        out.push(short.to_owned());
    }
    out.sort();
    Ok(out)
}
