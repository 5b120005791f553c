//! libgit2-backed index operations for the shadow clone.
//!
//! The index is the only staging surface. [`rebuild_index`] restores the
//! resting state (index == commit tree, workdir empty); [`stage_blob`] and
//! [`unstage`] mutate it between rebuild and commit.

use std::path::Path;

use crate::error::GitError;
use crate::git2_repo::{Git2Repo, backend_err, from_git2_oid};
use crate::objects_impl::find_commit;
use crate::types::GitOid;

pub fn rebuild_index(repo: &Git2Repo, commit: GitOid) -> Result<(), GitError> {
    let commit = find_commit(repo, commit)?;
    let tree = commit.tree().map_err(|e| backend_err(&e))?;
    sweep_workdir(&repo.workdir)?;
    let mut index = repo.repo.index().map_err(|e| backend_err(&e))?;
    index.read_tree(&tree).map_err(|e| backend_err(&e))?;
    index.write().map_err(|e| backend_err(&e))?;
    Ok(())
}

/// Remove everything from the workdir except `.git`.
///
/// Nothing is ever checked out, so any file found here leaked from an
/// interrupted operation or an outside actor.
fn sweep_workdir(workdir: &Path) -> Result<(), GitError> {
    for entry in std::fs::read_dir(workdir)? {
        let entry = entry?;
        if entry.file_name() == ".git" {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

pub fn stage_blob(repo: &Git2Repo, path: &str, data: &[u8]) -> Result<GitOid, GitError> {
    let blob = repo.repo.blob(data).map_err(|e| backend_err(&e))?;
    let entry = git2::IndexEntry {
        ctime: git2::IndexTime::new(0, 0),
        mtime: git2::IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode: 0o100_644,
        uid: 0,
        gid: 0,
        file_size: u32::try_from(data.len()).unwrap_or(u32::MAX),
        id: blob,
        flags: 0,
        flags_extended: 0,
        path: path.as_bytes().to_vec(),
    };
    let mut index = repo.repo.index().map_err(|e| backend_err(&e))?;
    index.add(&entry).map_err(|e| backend_err(&e))?;
    index.write().map_err(|e| backend_err(&e))?;
    Ok(from_git2_oid(blob))
}

pub fn unstage(repo: &Git2Repo, path: &str) -> Result<(), GitError> {
    let mut index = repo.repo.index().map_err(|e| backend_err(&e))?;
    match index.remove_path(Path::new(path)) {
        Ok(()) => {
            index.write().map_err(|e| backend_err(&e))?;
            Ok(())
        }
        // No-op if the path is not staged (per trait contract).
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(()),
        Err(e) => Err(backend_err(&e)),
    }
}
