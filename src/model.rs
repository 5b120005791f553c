//! Session, metadata, and file records for the sync engine.
//!
//! Everything here is either transient (built per request and handed to the
//! caller) or persisted as a single JSON document per repository clone
//! ([`RepoMetadata`]). No type in this module performs I/O.

use std::collections::BTreeMap;
use std::fmt;

use confit_git::{BranchName, GitOid, RemoteAuth};
use serde::{Deserialize, Serialize};

/// Schema version of the persisted [`RepoMetadata`] record.
///
/// A metadata file carrying any other version is treated as invalid and the
/// local clone it describes is discarded and re-cloned.
pub const SCHEMA_VERSION: u32 = 2;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// What a user presents on first repository access.
#[derive(Clone)]
pub struct Credentials {
    /// Login name, also used as the commit author name.
    pub username: String,
    /// Password or personal access token for the remote.
    pub password: String,
    /// URL of the remote repository.
    pub repo_url: String,
}

// Never print the password.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("repo_url", &self.repo_url)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An authenticated session against one repository clone.
///
/// Created by `access_repo`; immutable afterwards except for `branch`, which
/// changes on branch switch/create. The cleartext remote credentials live
/// only here, in memory — at rest the password is sealed inside
/// [`RepoMetadata`].
#[derive(Clone, Debug)]
pub struct Session {
    /// Opaque session token, issued by the session store.
    pub token: String,
    /// Login name.
    pub username: String,
    /// URL of the remote repository.
    pub repo_url: String,
    /// Repository name derived from the URL path (e.g. `org/cfg`).
    pub repo_name: String,
    /// Storage key for the clone, drafts, and metadata of this session.
    pub repo_folder: String,
    /// The branch this session currently operates on.
    pub branch: BranchName,
    /// Credentials offered to the remote on fetch/push.
    pub auth: RemoteAuth,
}

// ---------------------------------------------------------------------------
// RepoMetadata
// ---------------------------------------------------------------------------

/// The one persisted record per repository clone (`{repoFolder}.meta`).
///
/// `commit_base_sha` maps branch → in-repo file path → the blob OID the file
/// had when its draft was last derived from the repository. That OID — not
/// any timestamp — is the optimistic-concurrency baseline the commit
/// protocol compares against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMetadata {
    /// Schema version; must equal [`SCHEMA_VERSION`].
    pub version: u32,
    /// Storage key this record belongs to.
    pub repo_folder: String,
    /// Login name.
    pub username: String,
    /// URL of the remote repository.
    pub repo_url: String,
    /// Repository name derived from the URL path.
    pub repo_name: String,
    /// The branch the session was last operating on.
    pub branch: String,
    /// AES-GCM-sealed password, hex-encoded. Cleartext never touches disk.
    pub sealed_password: String,
    /// Per-branch map from in-repo file path to base OID (hex).
    #[serde(default)]
    pub commit_base_sha: BTreeMap<String, BTreeMap<String, String>>,
    /// Set when a fetch timed out; the next `access_repo` discards the clone.
    #[serde(default)]
    pub stale: bool,
}

impl RepoMetadata {
    /// Look up the recorded base OID for `path` on `branch`.
    ///
    /// An unparseable stored value is treated as absent.
    #[must_use]
    pub fn base_sha(&self, branch: &str, path: &str) -> Option<GitOid> {
        self.commit_base_sha
            .get(branch)?
            .get(path)
            .and_then(|hex| hex.parse().ok())
    }

    /// Set or clear the base OID for `path` on `branch` in memory.
    ///
    /// Callers go through the metadata store's `save_commit_base`, which also
    /// persists; this is the in-memory half.
    pub fn set_base_sha(&mut self, branch: &str, path: &str, oid: Option<GitOid>) {
        match oid {
            Some(oid) => {
                self.commit_base_sha
                    .entry(branch.to_owned())
                    .or_default()
                    .insert(path.to_owned(), oid.to_string());
            }
            None => {
                if let Some(map) = self.commit_base_sha.get_mut(branch) {
                    map.remove(path);
                    if map.is_empty() {
                        self.commit_base_sha.remove(branch);
                    }
                }
            }
        }
    }

    /// Drop every base-SHA entry recorded for `branch`.
    pub fn clear_branch(&mut self, branch: &str) {
        self.commit_base_sha.remove(branch);
    }
}

// ---------------------------------------------------------------------------
// ConfigFile / ConflictFile
// ---------------------------------------------------------------------------

/// One configuration file, assembled per request from the repository tree
/// and the draft overlay. Never persisted as a unit.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ConfigFile {
    /// Application folder the file lives under.
    pub application: String,
    /// File name within the application folder.
    pub file_name: String,
    /// Blob OID as last read from the repository, if the file exists there.
    pub oid: Option<GitOid>,
    /// Uncommitted edit, if any.
    pub draft_content: Option<String>,
    /// Last-synced repository content, if read.
    pub original_content: Option<String>,
    /// Whether the draft diverges from the repository content.
    pub modified: bool,
    /// Size in bytes of whichever content is present.
    pub size: u64,
}

impl ConfigFile {
    /// The (application, file) key used to join repository and draft views.
    #[must_use]
    pub fn key(&self) -> (String, String) {
        (self.application.clone(), self.file_name.clone())
    }

    /// Whether the draft diverges from the original, computed from content.
    #[must_use]
    pub fn diverged(&self) -> bool {
        match &self.draft_content {
            None => false,
            Some(draft) => self.original_content.as_ref() != Some(draft),
        }
    }
}

/// A file that failed the optimistic check: the user's draft next to the
/// repository content that moved underneath it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictFile {
    /// Application folder.
    pub application: String,
    /// File name.
    pub file_name: String,
    /// The user's draft at the time of the failed commit.
    pub draft_content: String,
    /// Current upstream content, absent if the file was deleted upstream.
    pub upstream_content: Option<String>,
    /// Current upstream blob OID, absent if the file was deleted upstream.
    pub upstream_oid: Option<GitOid>,
}

// ---------------------------------------------------------------------------
// Operation results
// ---------------------------------------------------------------------------

/// Result of a single-branch fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchOutcome {
    /// The remote-tracking position after the fetch (pre-fetch value when the
    /// remote branch is gone or the transfer timed out).
    pub pulled_commit: Option<GitOid>,
    /// Whether the remote-tracking ref moved.
    pub changed: bool,
}

/// Result of a `refresh` poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// The current branch's remote-tracking position after the fetch.
    pub pulled_commit: Option<GitOid>,
    /// Whether the session's current branch moved.
    pub branch_changed: bool,
    /// Whether the base branch moved.
    pub base_changed: bool,
}

/// Result of `get_files`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct FileListing {
    /// Repository files merged with draft overlays, sorted by (app, file).
    pub files: Vec<ConfigFile>,
    /// Sorted application folder names under the apps root.
    pub applications: Vec<String>,
    /// The current branch has files/versions the base branch lacks.
    pub can_pull_request: bool,
    /// The base branch has files/versions the current branch lacks.
    pub can_sync_master: bool,
}

/// Result of `branch_diff`: what merging `src` into `target` would need.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BranchDiff {
    /// Files to create or update in the target (content from `src`).
    pub to_save: Vec<ConfigFile>,
    /// Files deleted in `src` that still exist in the target.
    pub to_delete: Vec<ConfigFile>,
    /// Files changed on both sides; must be resolved before merging.
    pub conflict_files: Vec<ConflictFile>,
}

impl BranchDiff {
    /// True when there is nothing to propose.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_save.is_empty() && self.to_delete.is_empty() && self.conflict_files.is_empty()
    }
}

/// How `checkout_branch` should treat the named branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckoutMode {
    /// Re-sync and point `HEAD` at an existing branch.
    Switch,
    /// Create the branch from the base branch and push it.
    Create,
}

/// A validated session together with its current metadata view.
#[derive(Clone, Debug)]
pub struct Principal {
    /// The session record.
    pub session: Session,
    /// The persisted metadata for the session's clone.
    pub metadata: RepoMetadata,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(fill: u8) -> GitOid {
        GitOid::from_bytes([fill; 20])
    }

    fn meta() -> RepoMetadata {
        RepoMetadata {
            version: SCHEMA_VERSION,
            repo_folder: "f".to_owned(),
            username: "alice".to_owned(),
            repo_url: "http://host/org/cfg.git".to_owned(),
            repo_name: "org/cfg".to_owned(),
            branch: "master".to_owned(),
            sealed_password: String::new(),
            commit_base_sha: BTreeMap::new(),
            stale: false,
        }
    }

    #[test]
    fn base_sha_roundtrip() {
        let mut m = meta();
        m.set_base_sha("master", "apps/shop/config.yaml", Some(oid(1)));
        assert_eq!(m.base_sha("master", "apps/shop/config.yaml"), Some(oid(1)));
        assert_eq!(m.base_sha("master", "apps/shop/other.yaml"), None);
        assert_eq!(m.base_sha("dev", "apps/shop/config.yaml"), None);
    }

    #[test]
    fn base_sha_clear_prunes_empty_branch_map() {
        let mut m = meta();
        m.set_base_sha("master", "a", Some(oid(1)));
        m.set_base_sha("master", "a", None);
        assert!(m.commit_base_sha.is_empty());
        // Clearing an absent entry is a no-op.
        m.set_base_sha("master", "a", None);
    }

    #[test]
    fn clear_branch_drops_all_entries() {
        let mut m = meta();
        m.set_base_sha("dev", "a", Some(oid(1)));
        m.set_base_sha("dev", "b", Some(oid(2)));
        m.set_base_sha("master", "a", Some(oid(3)));
        m.clear_branch("dev");
        assert_eq!(m.base_sha("dev", "a"), None);
        assert_eq!(m.base_sha("master", "a"), Some(oid(3)));
    }

    #[test]
    fn base_sha_ignores_unparseable_value() {
        let mut m = meta();
        m.commit_base_sha
            .entry("master".to_owned())
            .or_default()
            .insert("a".to_owned(), "not-hex".to_owned());
        assert_eq!(m.base_sha("master", "a"), None);
    }

    #[test]
    fn metadata_json_roundtrip() {
        let mut m = meta();
        m.set_base_sha("master", "apps/shop/config.yaml", Some(oid(7)));
        let json = serde_json::to_string(&m).unwrap();
        let back: RepoMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn metadata_missing_optional_fields_default() {
        let json = r#"{
            "version": 2,
            "repo_folder": "f",
            "username": "alice",
            "repo_url": "u",
            "repo_name": "n",
            "branch": "master",
            "sealed_password": ""
        }"#;
        let m: RepoMetadata = serde_json::from_str(json).unwrap();
        assert!(m.commit_base_sha.is_empty());
        assert!(!m.stale);
    }

    #[test]
    fn config_file_diverged() {
        let mut f = ConfigFile {
            application: "shop".to_owned(),
            file_name: "config.yaml".to_owned(),
            ..ConfigFile::default()
        };
        assert!(!f.diverged());

        f.draft_content = Some("a: 1\n".to_owned());
        assert!(f.diverged());

        f.original_content = Some("a: 1\n".to_owned());
        assert!(!f.diverged());

        f.draft_content = Some("a: 2\n".to_owned());
        assert!(f.diverged());
    }

    #[test]
    fn branch_diff_empty() {
        assert!(BranchDiff::default().is_empty());
        let d = BranchDiff {
            to_save: vec![ConfigFile::default()],
            ..BranchDiff::default()
        };
        assert!(!d.is_empty());
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let c = Credentials {
            username: "alice".to_owned(),
            password: "hunter2".to_owned(),
            repo_url: "u".to_owned(),
        };
        let dbg = format!("{c:?}");
        assert!(dbg.contains("alice"));
        assert!(!dbg.contains("hunter2"));
    }
}
