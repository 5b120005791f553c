//! Path derivation for clones, drafts, and metadata.
//!
//! [`PathFinder`] is a pure mapping from (user, repo, branch, file) to the
//! on-disk locations the engine uses and to the canonical in-repo file path
//! used as the object-store key. No state, no I/O.

use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::config::EngineConfig;

/// File extension of the persisted metadata records.
const META_EXT: &str = "meta";

/// Name of the username type-ahead cache file.
const USERS_FILE: &str = "users.json";

/// Pure path derivation over an [`EngineConfig`].
#[derive(Clone, Copy, Debug)]
pub struct PathFinder<'a> {
    config: &'a EngineConfig,
}

impl<'a> PathFinder<'a> {
    /// Create a `PathFinder` over `config`.
    #[must_use]
    pub const fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Derive the stable storage key for (username, repo, branch).
    ///
    /// Lowercase hex SHA-256 of `username!repoName!branch`, truncated to 32
    /// characters. Everything the engine persists is keyed by this value.
    #[must_use]
    pub fn repo_folder(username: &str, repo_name: &str, branch: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(username.as_bytes());
        hasher.update(b"!");
        hasher.update(repo_name.as_bytes());
        hasher.update(b"!");
        hasher.update(branch.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(32);
        for byte in digest.iter().take(16) {
            hex.push_str(&format!("{byte:02x}"));
        }
        hex
    }

    /// Derive the repository name from its URL's path segments.
    ///
    /// `https://host/org/cfg.git` → `org/cfg`. Local and scp-style locations
    /// fall back to the last path component. The `.git` suffix is stripped
    /// either way.
    #[must_use]
    pub fn repo_name(url: &str) -> String {
        let name = url::Url::parse(url).map_or_else(
            |_| {
                url.trim_end_matches('/')
                    .rsplit(['/', ':'])
                    .next()
                    .unwrap_or(url)
                    .to_owned()
            },
            |parsed| parsed.path().trim_matches('/').to_owned(),
        );
        let name = name.strip_suffix(".git").unwrap_or(&name);
        if name.is_empty() {
            url.to_owned()
        } else {
            name.to_owned()
        }
    }

    /// Directory of the shadow clone for `repo_folder`.
    #[must_use]
    pub fn repo_dir(&self, repo_folder: &str) -> PathBuf {
        self.config.repos_dir.join(repo_folder)
    }

    /// Draft overlay root for `repo_folder` (all branches).
    #[must_use]
    pub fn draft_root(&self, repo_folder: &str) -> PathBuf {
        self.config.drafts_dir.join(repo_folder)
    }

    /// Draft overlay directory for one branch of `repo_folder`.
    #[must_use]
    pub fn draft_branch_dir(&self, repo_folder: &str, branch: &str) -> PathBuf {
        self.draft_root(repo_folder).join(branch)
    }

    /// Draft overlay file for (branch, application, file).
    #[must_use]
    pub fn draft_file(
        &self,
        repo_folder: &str,
        branch: &str,
        application: &str,
        file_name: &str,
    ) -> PathBuf {
        self.draft_branch_dir(repo_folder, branch)
            .join(&self.config.apps_root)
            .join(application)
            .join(file_name)
    }

    /// Metadata record path for `repo_folder`.
    #[must_use]
    pub fn meta_file(&self, repo_folder: &str) -> PathBuf {
        self.config
            .meta_dir
            .join(format!("{repo_folder}.{META_EXT}"))
    }

    /// Path of the username type-ahead cache.
    #[must_use]
    pub fn users_file(&self) -> PathBuf {
        self.config.meta_dir.join(USERS_FILE)
    }

    /// Canonical in-repo path of a file: `{apps_root}/{application}/{file}`.
    ///
    /// This slash-separated string is the key for tree lookups, staging, and
    /// the base-SHA map.
    #[must_use]
    pub fn repo_path(&self, application: &str, file_name: &str) -> String {
        format!("{}/{application}/{file_name}", self.config.apps_root)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
