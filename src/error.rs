//! The engine error type.
//!
//! Defines [`SyncError`], the unified error type for all sync-engine
//! operations. Transport failures arrive pre-classified from the git adapter
//! and are translated here into the user-facing taxonomy: `NotFound`,
//! `Conflict` (with the structured conflict list), `Unauthorized`,
//! `Forbidden`, and a passthrough for everything else.

use std::fmt;

use confit_git::GitError;

use crate::config::ConfigError;
use crate::model::ConflictFile;

// ---------------------------------------------------------------------------
// SyncError
// ---------------------------------------------------------------------------

/// Unified error type for sync-engine operations.
#[derive(Debug)]
pub enum SyncError {
    /// A file, branch, or repository was not found.
    NotFound {
        /// What was missing.
        what: String,
    },

    /// The optimistic check failed for at least one file.
    ///
    /// Carries both sides of every conflicting file so the caller can offer
    /// side-by-side resolution. Raised only by the commit protocol; no
    /// repository mutation has occurred when this is returned.
    Conflict {
        /// The files that failed the check.
        files: Vec<ConflictFile>,
    },

    /// The remote rejected the credentials, or the session expired.
    Unauthorized {
        /// User-facing description.
        message: String,
    },

    /// The remote (or branch policy) refused the operation.
    Forbidden {
        /// User-facing description.
        message: String,
    },

    /// Branch creation was asked for a name the remote already has.
    BranchExists {
        /// The offending branch name.
        name: String,
    },

    /// Credential sealing or unsealing failed.
    Crypto {
        /// What went wrong.
        message: String,
    },

    /// A configuration file could not be loaded or parsed.
    Config(ConfigError),

    /// An unclassified git failure, passed through from the adapter.
    Git(GitError),

    /// An I/O error outside the git adapter (drafts, metadata).
    Io(std::io::Error),
}

impl SyncError {
    /// Shorthand for a [`SyncError::NotFound`].
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { what } => write!(f, "not found: {what}"),
            Self::Conflict { files } => {
                write!(f, "conflict: {} file(s) changed upstream:", files.len())?;
                for file in files {
                    write!(f, " {}/{}", file.application, file.file_name)?;
                }
                Ok(())
            }
            Self::Unauthorized { message } => write!(f, "unauthorized: {message}"),
            Self::Forbidden { message } => write!(f, "forbidden: {message}"),
            Self::BranchExists { name } => {
                write!(f, "branch '{name}' already exists on the remote")
            }
            Self::Crypto { message } => write!(f, "credential sealing failed: {message}"),
            Self::Config(e) => write!(f, "{e}"),
            Self::Git(e) => write!(f, "git operation failed: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Git(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions — transport-class translation happens here
// ---------------------------------------------------------------------------

impl From<GitError> for SyncError {
    fn from(e: GitError) -> Self {
        match e {
            GitError::Unauthorized { .. } => Self::Unauthorized {
                message: "invalid username or password".to_owned(),
            },
            GitError::Forbidden { .. } => Self::Forbidden {
                message: "git authorization forbidden".to_owned(),
            },
            GitError::RepoNotFound { .. } => Self::NotFound {
                what: "repository".to_owned(),
            },
            GitError::NotFound { message } => Self::NotFound { what: message },
            GitError::RemoteRefMissing { ref_name } => Self::NotFound {
                what: format!("remote branch {ref_name}"),
            },
            other => Self::Git(other),
        }
    }
}

impl From<ConfigError> for SyncError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_translates_to_fixed_message() {
        let e = SyncError::from(GitError::Unauthorized {
            message: "remote rejected credentials for https://host".to_owned(),
        });
        assert!(matches!(
            &e,
            SyncError::Unauthorized { message } if message == "invalid username or password"
        ));
    }

    #[test]
    fn forbidden_translates() {
        let e = SyncError::from(GitError::Forbidden {
            message: "403".to_owned(),
        });
        assert!(matches!(
            &e,
            SyncError::Forbidden { message } if message == "git authorization forbidden"
        ));
    }

    #[test]
    fn missing_repo_translates_to_not_found() {
        let e = SyncError::from(GitError::RepoNotFound {
            message: "404".to_owned(),
        });
        assert!(matches!(&e, SyncError::NotFound { what } if what == "repository"));
    }

    #[test]
    fn missing_remote_ref_translates_to_not_found() {
        let e = SyncError::from(GitError::RemoteRefMissing {
            ref_name: "refs/heads/gone".to_owned(),
        });
        assert!(matches!(&e, SyncError::NotFound { what } if what.contains("refs/heads/gone")));
    }

    #[test]
    fn unclassified_git_errors_pass_through() {
        let e = SyncError::from(GitError::Backend {
            message: "odb corrupt".to_owned(),
        });
        assert!(matches!(e, SyncError::Git(GitError::Backend { .. })));
        assert!(format!("{e}").contains("odb corrupt"));
    }

    #[test]
    fn conflict_display_names_each_file() {
        let e = SyncError::Conflict {
            files: vec![ConflictFile {
                application: "shop".to_owned(),
                file_name: "config.yaml".to_owned(),
                draft_content: "a: 1\n".to_owned(),
                upstream_content: Some("a: 2\n".to_owned()),
                upstream_oid: None,
            }],
        };
        let msg = format!("{e}");
        assert!(msg.contains("1 file(s)"));
        assert!(msg.contains("shop/config.yaml"));
    }

    #[test]
    fn source_chain_reaches_git_error() {
        use std::error::Error as _;
        let e = SyncError::from(GitError::Backend {
            message: "x".to_owned(),
        });
        assert!(e.source().is_some());
        assert!(SyncError::not_found("y").source().is_none());
    }
}
