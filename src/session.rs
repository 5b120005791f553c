//! Session tokens and the username type-ahead cache.
//!
//! Tokens are 32 random bytes, hex-encoded, issued on repository access and
//! carried by every subsequent call. The store tracks last-activity time per
//! token; a lookup after the configured idle window fails with "session
//! expired" and evicts the token, and any successful lookup refreshes the
//! clock. Sessions live in memory only — a restart logs everyone out.
//!
//! The type-ahead cache is a sorted, deduplicated JSON list of usernames
//! stored beside the metadata records; failures updating it are logged by
//! the caller, never fatal.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::RngCore;

use crate::error::SyncError;
use crate::model::Session;
use crate::secrets::hex_encode;

/// Length of a session token in raw bytes (hex doubles it).
const TOKEN_LEN: usize = 32;

struct Entry {
    session: Session,
    last_seen: Instant,
}

/// In-memory session registry plus the on-disk username cache.
pub struct SessionStore {
    users_file: PathBuf,
    timeout: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl SessionStore {
    /// Create a store with the given idle `timeout`, keeping the username
    /// cache at `users_file`.
    #[must_use]
    pub fn new(users_file: PathBuf, timeout: Duration) -> Self {
        Self {
            users_file,
            timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh token for `session` and register it.
    ///
    /// Returns the session with its `token` field filled in.
    #[must_use]
    pub fn issue(&self, mut session: Session) -> Session {
        let mut bytes = [0u8; TOKEN_LEN];
        rand::rng().fill_bytes(&mut bytes);
        session.token = hex_encode(&bytes);
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(
            session.token.clone(),
            Entry {
                session: session.clone(),
                last_seen: Instant::now(),
            },
        );
        tracing::info!(username = %session.username, "session issued");
        session
    }

    /// Look up `token`, enforcing the idle timeout.
    ///
    /// Success refreshes the activity clock; an idle-expired token is
    /// evicted before the error is returned.
    ///
    /// # Errors
    /// Returns [`SyncError::Unauthorized`] with "session expired" for
    /// unknown or expired tokens.
    pub fn check(&self, token: &str) -> Result<Session, SyncError> {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let expired = match entries.get_mut(token) {
            None => true,
            Some(entry) if entry.last_seen.elapsed() > self.timeout => {
                tracing::info!(username = %entry.session.username, "session expired, evicting");
                true
            }
            Some(entry) => {
                entry.last_seen = Instant::now();
                return Ok(entry.session.clone());
            }
        };
        if expired {
            entries.remove(token);
        }
        Err(SyncError::Unauthorized {
            message: "session expired".to_owned(),
        })
    }

    /// Record a branch change on the stored session for `token`.
    ///
    /// No-op for unknown tokens; the caller's own copy is authoritative.
    pub fn update_branch(&self, token: &str, branch: &confit_git::BranchName) {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(token) {
            entry.session.branch = branch.clone();
        }
    }

    /// Drop `token` immediately (logout).
    pub fn evict(&self, token: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.remove(token);
    }

    // -----------------------------------------------------------------------
    // Username type-ahead cache
    // -----------------------------------------------------------------------

    /// Add `username` to the cache (deduplicated, sorted).
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if the cache cannot be read or written.
    pub fn register_user(&self, username: &str) -> Result<(), SyncError> {
        let mut users = self.read_users()?;
        if users.iter().any(|u| u == username) {
            return Ok(());
        }
        users.push(username.to_owned());
        users.sort();
        if let Some(parent) = self.users_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&users).map_err(std::io::Error::from)?;
        let tmp = tempfile::NamedTempFile::new_in(
            self.users_file.parent().unwrap_or_else(|| std::path::Path::new(".")),
        )?;
        std::fs::write(tmp.path(), json)?;
        tmp.persist(&self.users_file).map_err(|e| SyncError::Io(e.error))?;
        Ok(())
    }

    /// Case-insensitive prefix matches from the cache, sorted.
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if the cache cannot be read.
    pub fn users_matching(&self, prefix: &str) -> Result<Vec<String>, SyncError> {
        let prefix = prefix.to_lowercase();
        Ok(self
            .read_users()?
            .into_iter()
            .filter(|u| u.to_lowercase().starts_with(&prefix))
            .collect())
    }

    fn read_users(&self) -> Result<Vec<String>, SyncError> {
        match std::fs::read_to_string(&self.users_file) {
            Ok(json) => serde_json::from_str(&json).map_err(|e| SyncError::Io(e.into())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use confit_git::{BranchName, RemoteAuth};
    use tempfile::tempdir;

    fn session(username: &str) -> Session {
        Session {
            token: String::new(),
            username: username.to_owned(),
            repo_url: "u".to_owned(),
            repo_name: "n".to_owned(),
            repo_folder: "f".to_owned(),
            branch: BranchName::new("master").unwrap(),
            auth: RemoteAuth::default(),
        }
    }

    fn store(timeout: Duration) -> (tempfile::TempDir, SessionStore) {
        let dir = tempdir().unwrap();
        let users = dir.path().join("users.json");
        (dir, SessionStore::new(users, timeout))
    }

    #[test]
    fn issue_and_check() {
        let (_dir, store) = store(Duration::from_secs(60));
        let s = store.issue(session("alice"));
        assert_eq!(s.token.len(), 64);
        let checked = store.check(&s.token).unwrap();
        assert_eq!(checked.username, "alice");
    }

    #[test]
    fn unknown_token_is_unauthorized() {
        let (_dir, store) = store(Duration::from_secs(60));
        let err = store.check("nope").unwrap_err();
        assert!(matches!(
            err,
            SyncError::Unauthorized { message } if message == "session expired"
        ));
    }

    #[test]
    fn idle_session_expires_and_is_evicted() {
        let (_dir, store) = store(Duration::ZERO);
        let s = store.issue(session("alice"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.check(&s.token).is_err());
        // Still gone on retry.
        assert!(store.check(&s.token).is_err());
    }

    #[test]
    fn tokens_are_unique() {
        let (_dir, store) = store(Duration::from_secs(60));
        let a = store.issue(session("alice"));
        let b = store.issue(session("alice"));
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn update_branch_changes_stored_session() {
        let (_dir, store) = store(Duration::from_secs(60));
        let s = store.issue(session("alice"));
        store.update_branch(&s.token, &BranchName::new("dev").unwrap());
        assert_eq!(store.check(&s.token).unwrap().branch.as_str(), "dev");
    }

    #[test]
    fn evict_logs_out() {
        let (_dir, store) = store(Duration::from_secs(60));
        let s = store.issue(session("alice"));
        store.evict(&s.token);
        assert!(store.check(&s.token).is_err());
    }

    #[test]
    fn user_cache_dedups_and_sorts() {
        let (_dir, store) = store(Duration::from_secs(60));
        store.register_user("charlie").unwrap();
        store.register_user("alice").unwrap();
        store.register_user("alice").unwrap();
        store.register_user("bob").unwrap();
        assert_eq!(store.users_matching("").unwrap(), vec!["alice", "bob", "charlie"]);
    }

    #[test]
    fn user_matching_is_prefix_and_case_insensitive() {
        let (_dir, store) = store(Duration::from_secs(60));
        store.register_user("Alice").unwrap();
        store.register_user("albert").unwrap();
        store.register_user("bob").unwrap();
        assert_eq!(store.users_matching("al").unwrap(), vec!["Alice", "albert"]);
        assert_eq!(store.users_matching("AL").unwrap(), vec!["Alice", "albert"]);
        assert!(store.users_matching("z").unwrap().is_empty());
    }
}
