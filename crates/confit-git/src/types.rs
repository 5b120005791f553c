//! Core types for the confit git abstraction layer.
//!
//! These types form the vocabulary shared between the [`GitRepo`](crate::GitRepo) trait and
//! the sync engine. They intentionally contain no libgit2 types — the backend
//! is an implementation detail.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// GitOid
// ---------------------------------------------------------------------------

/// A git object identifier (SHA-1, 20 bytes).
///
/// Stored as raw bytes for efficient comparison, hashing, and Copy semantics.
/// Displays as 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GitOid([u8; 20]);

impl GitOid {
    /// The zero OID (`0000...0000`), used as a sentinel for "ref does not exist."
    pub const ZERO: Self = Self([0; 20]);

    /// Create a `GitOid` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Return the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Return `true` if this is the zero OID.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitOid({self})")
    }
}

impl FromStr for GitOid {
    type Err = OidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 40 {
            return Err(OidParseError {
                value: s.to_owned(),
                reason: format!("expected 40 hex characters, got {}", s.len()),
            });
        }
        let mut bytes = [0u8; 20];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = hex_digit(chunk[0]).ok_or_else(|| OidParseError {
                value: s.to_owned(),
                reason: format!("invalid hex digit '{}'", chunk[0] as char),
            })?;
            let lo = hex_digit(chunk[1]).ok_or_else(|| OidParseError {
                value: s.to_owned(),
                reason: format!("invalid hex digit '{}'", chunk[1] as char),
            })?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

/// Error from parsing a hex string into a [`GitOid`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OidParseError {
    /// The raw value that failed.
    pub value: String,
    /// Why it failed.
    pub reason: String,
}

impl fmt::Display for OidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid OID {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for OidParseError {}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        // Accept uppercase for leniency during parsing
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// BranchName
// ---------------------------------------------------------------------------

/// A validated git branch name (the short name, without any `refs/` prefix).
///
/// The sync engine addresses everything by branch, never by raw ref, so this
/// type carries the two ref spellings a branch has in a shadow clone:
/// [`local_ref`](Self::local_ref) and [`remote_ref`](Self::remote_ref).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BranchName(String);

/// Characters git forbids anywhere in a ref name component.
const FORBIDDEN_CHARS: &[char] = &[' ', '~', '^', ':', '?', '*', '[', '\\'];

impl BranchName {
    /// Create a new `BranchName`, validating that git would accept it.
    ///
    /// # Errors
    /// Returns an error if the name is empty, is the reserved word `HEAD`,
    /// or violates the ref-format rules (`..`, `@{`, leading `-`/`.`/`/`,
    /// trailing `/`/`.`/`.lock`, forbidden characters).
    pub fn new(name: &str) -> Result<Self, BranchNameError> {
        Self::validate(name)?;
        Ok(Self(name.to_owned()))
    }

    /// Return the branch name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The local ref for this branch: `refs/heads/<name>`.
    #[must_use]
    pub fn local_ref(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    /// The remote-tracking ref for this branch: `refs/remotes/origin/<name>`.
    #[must_use]
    pub fn remote_ref(&self) -> String {
        format!("refs/remotes/origin/{}", self.0)
    }

    fn validate(name: &str) -> Result<(), BranchNameError> {
        let reject = |reason: &str| {
            Err(BranchNameError {
                value: name.to_owned(),
                reason: reason.to_owned(),
            })
        };
        if name.is_empty() {
            return reject("branch name must not be empty");
        }
        if name == "HEAD" {
            return reject("HEAD is not a branch name");
        }
        if name.starts_with('-') || name.starts_with('.') || name.starts_with('/') {
            return reject("branch name must not start with '-', '.', or '/'");
        }
        if name.ends_with('/') || name.ends_with('.') || name.ends_with(".lock") {
            return reject("branch name must not end with '/', '.', or '.lock'");
        }
        if name.contains("..") || name.contains("//") || name.contains("@{") {
            return reject("branch name must not contain '..', '//', or '@{'");
        }
        if name.contains(FORBIDDEN_CHARS) || name.chars().any(char::is_control) {
            return reject("branch name contains a character git forbids");
        }
        Ok(())
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BranchName {
    type Err = BranchNameError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Error from validating a [`BranchName`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchNameError {
    /// The invalid value.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

impl fmt::Display for BranchNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid branch name {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for BranchNameError {}

// ---------------------------------------------------------------------------
// Branch listing scope
// ---------------------------------------------------------------------------

/// Which ref namespace to enumerate when listing branches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BranchScope {
    /// Local branches (`refs/heads/*`).
    Local,
    /// Remote-tracking branches for `origin` (`refs/remotes/origin/*`),
    /// reported with the `origin/` prefix stripped.
    RemoteTracking,
}

// ---------------------------------------------------------------------------
// Tree types
// ---------------------------------------------------------------------------

/// The file mode of a tree entry (analogous to `git ls-tree` mode column).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// Regular file (`100644`).
    Blob,
    /// Executable file (`100755`).
    BlobExecutable,
    /// Subdirectory (`040000`).
    Tree,
    /// Symbolic link (`120000`).
    Link,
    /// Gitlink / submodule (`160000`).
    Commit,
}

/// A single entry in a git tree object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    /// File or directory name (just the basename, not a full path).
    pub name: String,
    /// The entry mode.
    pub mode: EntryMode,
    /// The OID of the blob, tree, or commit this entry points to.
    pub oid: GitOid,
}

// ---------------------------------------------------------------------------
// Commit types
// ---------------------------------------------------------------------------

/// Information about a commit object.
///
/// Returned by [`GitRepo::read_commit`](crate::GitRepo::read_commit).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    /// OID of the tree this commit points to.
    pub tree_oid: GitOid,
    /// OIDs of parent commits (empty for root commits).
    pub parents: Vec<GitOid>,
    /// The commit message.
    pub message: String,
    /// Author identity string (e.g., `"alice <alice>"`).
    pub author: String,
    /// Committer identity string.
    pub committer: String,
}

/// The identity recorded on commits the engine creates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitAuthor {
    /// Author name.
    pub name: String,
    /// Author email.
    pub email: String,
}

// ---------------------------------------------------------------------------
// Remote types
// ---------------------------------------------------------------------------

/// Credentials offered to the remote during fetch, ls-remote, and push.
///
/// When both fields are set they are offered as userpass-plaintext (the HTTPS
/// token flow). SSH URLs fall back to the local agent regardless.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RemoteAuth {
    /// Username, if known.
    pub username: Option<String>,
    /// Password or personal access token, if known.
    pub password: Option<String>,
}

// Never print the password, even at trace level.
impl fmt::Debug for RemoteAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Limits applied to a single remote transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchLimits {
    /// Shallow-fetch depth. `None` fetches full history for the requested refs.
    pub depth: Option<u32>,
    /// Abort the transfer if it has not completed within this duration.
    pub timeout: Option<Duration>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- GitOid --

    #[test]
    fn oid_roundtrip_hex() {
        let hex = "0123456789abcdef0123456789abcdef01234567";
        let oid: GitOid = hex.parse().unwrap();
        assert_eq!(oid.to_string(), hex);
    }

    #[test]
    fn oid_zero() {
        assert!(GitOid::ZERO.is_zero());
        assert_eq!(
            GitOid::ZERO.to_string(),
            "0000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn oid_rejects_short() {
        assert!("abc".parse::<GitOid>().is_err());
    }

    #[test]
    fn oid_rejects_non_hex() {
        let bad = "g".repeat(40);
        assert!(bad.parse::<GitOid>().is_err());
    }

    #[test]
    fn oid_accepts_uppercase_but_displays_lowercase() {
        let oid: GitOid = "ABCDEF0123456789ABCDEF0123456789ABCDEF01".parse().unwrap();
        assert_eq!(oid.to_string(), "abcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn oid_from_bytes() {
        let bytes = [0xab; 20];
        let oid = GitOid::from_bytes(bytes);
        assert_eq!(oid.as_bytes(), &bytes);
        assert_eq!(oid.to_string(), "ab".repeat(20));
    }

    // -- BranchName --

    #[test]
    fn branch_simple() {
        assert!(BranchName::new("master").is_ok());
        assert!(BranchName::new("feature/login-page").is_ok());
        assert!(BranchName::new("release-1.2").is_ok());
    }

    #[test]
    fn branch_rejects_empty_and_head() {
        assert!(BranchName::new("").is_err());
        assert!(BranchName::new("HEAD").is_err());
    }

    #[test]
    fn branch_rejects_bad_edges() {
        assert!(BranchName::new("-x").is_err());
        assert!(BranchName::new(".hidden").is_err());
        assert!(BranchName::new("/abs").is_err());
        assert!(BranchName::new("x/").is_err());
        assert!(BranchName::new("x.").is_err());
        assert!(BranchName::new("x.lock").is_err());
    }

    #[test]
    fn branch_rejects_forbidden_sequences() {
        assert!(BranchName::new("a..b").is_err());
        assert!(BranchName::new("a//b").is_err());
        assert!(BranchName::new("a@{b").is_err());
        assert!(BranchName::new("a b").is_err());
        assert!(BranchName::new("a:b").is_err());
        assert!(BranchName::new("a^b").is_err());
    }

    #[test]
    fn branch_refs() {
        let b = BranchName::new("feature/x").unwrap();
        assert_eq!(b.local_ref(), "refs/heads/feature/x");
        assert_eq!(b.remote_ref(), "refs/remotes/origin/feature/x");
        assert_eq!(b.as_str(), "feature/x");
        assert_eq!(b.to_string(), "feature/x");
    }

    // -- RemoteAuth --

    #[test]
    fn remote_auth_debug_redacts_password() {
        let auth = RemoteAuth {
            username: Some("alice".to_owned()),
            password: Some("hunter2".to_owned()),
        };
        let dbg = format!("{auth:?}");
        assert!(dbg.contains("alice"));
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("redacted"));
    }
}
