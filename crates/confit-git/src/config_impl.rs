//! libgit2-backed local config access.

use crate::error::GitError;
use crate::git2_repo::{Git2Repo, backend_err};

pub fn read_config(repo: &Git2Repo, key: &str) -> Result<Option<String>, GitError> {
    let mut config = repo.repo.config().map_err(|e| backend_err(&e))?;
    // Reads require a snapshot; live Config objects only support writes.
    let snapshot = config.snapshot().map_err(|e| backend_err(&e))?;
    match snapshot.get_string(key) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(backend_err(&e)),
    }
}

pub fn write_config(repo: &Git2Repo, key: &str, value: &str) -> Result<(), GitError> {
    let mut config = repo.repo.config().map_err(|e| backend_err(&e))?;
    config.set_str(key, value).map_err(|e| backend_err(&e))?;
    Ok(())
}
