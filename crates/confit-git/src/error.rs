//! Error types for git operations.
//!
//! [`GitError`] is the single error type returned by all [`GitRepo`](crate::GitRepo) trait
//! methods. Remote failures are pre-classified into transport-level variants
//! (`Unauthorized`, `Forbidden`, `RepoNotFound`, `Timeout`) so callers can
//! map them to user-facing outcomes without parsing libgit2 messages.

use thiserror::Error;

/// Errors returned by [`GitRepo`](crate::GitRepo) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// A requested local object, ref, or tree path was not found.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable description of what was missing.
        message: String,
    },

    /// A single-branch fetch asked for a branch the remote does not advertise.
    ///
    /// Distinct from [`RepoNotFound`](Self::RepoNotFound): the repository
    /// exists and answered, but the requested ref is gone.
    #[error("remote does not advertise `{ref_name}`")]
    RemoteRefMissing {
        /// The ref that was requested (e.g., `refs/heads/feature-x`).
        ref_name: String,
    },

    /// The remote rejected the offered credentials (HTTP 401 or exhausted
    /// authentication callbacks).
    #[error("authentication failed: {message}")]
    Unauthorized {
        /// Transport-level detail.
        message: String,
    },

    /// The remote recognized the credentials but refused access (HTTP 403).
    #[error("access forbidden: {message}")]
    Forbidden {
        /// Transport-level detail.
        message: String,
    },

    /// The remote repository does not exist or is not visible (HTTP 404).
    #[error("remote repository not found: {message}")]
    RepoNotFound {
        /// Transport-level detail.
        message: String,
    },

    /// A remote transfer exceeded its deadline and was aborted.
    #[error("remote transfer timed out after {seconds}s")]
    Timeout {
        /// The configured limit, in seconds.
        seconds: u64,
    },

    /// A push was rejected by the remote, either wholesale or via a per-ref
    /// status message (non-fast-forward, hooks, protected branch).
    #[error("push to `{remote}` rejected: {message}")]
    PushRejected {
        /// The remote name (e.g., `"origin"`).
        remote: String,
        /// Details about the rejection.
        message: String,
    },

    /// An OID string could not be parsed or was otherwise invalid.
    #[error("invalid OID `{value}`: {reason}")]
    InvalidOid {
        /// The raw value that failed validation.
        value: String,
        /// Why validation failed.
        reason: String,
    },

    /// An I/O error occurred (file system, workdir cleanup, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// libgit2 returned an unclassified error.
    ///
    /// This is the catch-all for errors that don't fit other variants. The
    /// `message` should include enough context to diagnose the failure.
    #[error("git backend error: {message}")]
    Backend {
        /// Freeform error description from the backend.
        message: String,
    },
}
