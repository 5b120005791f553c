//! Persistence of [`RepoMetadata`] records.
//!
//! One JSON file per repository clone, written atomically (temp file plus
//! rename) so a crash mid-write never leaves a half-record behind. The
//! base-SHA map is the optimistic-concurrency bookkeeping; every mutation of
//! it goes through [`MetadataStore::save_commit_base`], which also persists,
//! so the in-memory view and the on-disk view cannot silently diverge.

use std::path::{Path, PathBuf};

use confit_git::GitOid;

use crate::error::SyncError;
use crate::model::{RepoMetadata, SCHEMA_VERSION};

/// Loads and stores `{repoFolder}.meta` records under one directory.
#[derive(Clone, Debug)]
pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, repo_folder: &str) -> PathBuf {
        self.dir.join(format!("{repo_folder}.meta"))
    }

    /// Load the record for `repo_folder`, validating it.
    ///
    /// Returns `None` when the file is missing, unparseable, or carries the
    /// wrong schema version — all three mean "the clone this record
    /// describes cannot be trusted" and the caller discards and re-clones.
    #[must_use]
    pub fn load(&self, repo_folder: &str) -> Option<RepoMetadata> {
        let path = self.path(repo_folder);
        let contents = std::fs::read_to_string(&path).ok()?;
        let meta: RepoMetadata = match serde_json::from_str(&contents) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unparseable metadata record");
                return None;
            }
        };
        if meta.version != SCHEMA_VERSION {
            tracing::warn!(
                path = %path.display(),
                found = meta.version,
                expected = SCHEMA_VERSION,
                "metadata schema version mismatch"
            );
            return None;
        }
        Some(meta)
    }

    /// Persist `meta` atomically.
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if the directory cannot be created or the
    /// write/rename fails.
    pub fn save(&self, meta: &RepoMetadata) -> Result<(), SyncError> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(meta).map_err(|e| SyncError::Io(e.into()))?;
        write_atomic(&self.dir, &self.path(&meta.repo_folder), json.as_bytes())?;
        Ok(())
    }

    /// Delete the record for `repo_folder`. No-op if absent.
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] only if the file exists but cannot be removed.
    pub fn delete(&self, repo_folder: &str) -> Result<(), SyncError> {
        match std::fs::remove_file(self.path(repo_folder)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Set or clear one base-SHA entry and persist the record.
    ///
    /// `None` removes the entry (and prunes an emptied branch map). This is
    /// the single mutation point for the base-SHA bookkeeping.
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if persisting fails; the in-memory mutation
    /// has already happened in that case.
    pub fn save_commit_base(
        &self,
        meta: &mut RepoMetadata,
        branch: &str,
        repo_path: &str,
        oid: Option<GitOid>,
    ) -> Result<(), SyncError> {
        meta.set_base_sha(branch, repo_path, oid);
        self.save(meta)
    }
}

/// Write `data` to `path` via a temp file in `dir` and an atomic rename.
fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> Result<(), SyncError> {
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    std::fs::write(tmp.path(), data)?;
    tmp.persist(path).map_err(|e| SyncError::Io(e.error))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
