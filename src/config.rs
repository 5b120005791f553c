//! Engine configuration (`confit.toml`).
//!
//! Defines the typed configuration for the sync engine: storage roots, the
//! in-repo apps folder, branch policy, timeouts, credential-sealing secrets,
//! and the commit-author fallback.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level engine configuration.
///
/// Parsed from `confit.toml`. Missing fields use sensible defaults.
/// Missing file → all defaults (no error).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Directory holding the shadow clones, one subfolder per repo folder.
    #[serde(default = "default_repos_dir")]
    pub repos_dir: PathBuf,

    /// Directory holding draft overlay files.
    #[serde(default = "default_drafts_dir")]
    pub drafts_dir: PathBuf,

    /// Directory holding `{repoFolder}.meta` records and the user cache.
    #[serde(default = "default_meta_dir")]
    pub meta_dir: PathBuf,

    /// In-repo folder under which application folders live (default: `"apps"`).
    #[serde(default = "default_apps_root")]
    pub apps_root: String,

    /// The base branch every clone starts from (default: `"master"`).
    #[serde(default = "default_base_branch")]
    pub base_branch: String,

    /// Branches that are never surfaced as selectable and never writable
    /// through branch switch/create.
    #[serde(default = "default_locked_branches")]
    pub locked_branches: Vec<String>,

    /// Wall-clock limit for a single remote transfer, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,

    /// Idle timeout after which a session token expires, in seconds.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_seconds: u64,

    /// Credential-sealing secrets.
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Commit-author fallback.
    #[serde(default)]
    pub author: AuthorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            repos_dir: default_repos_dir(),
            drafts_dir: default_drafts_dir(),
            meta_dir: default_meta_dir(),
            apps_root: default_apps_root(),
            base_branch: default_base_branch(),
            locked_branches: default_locked_branches(),
            fetch_timeout_seconds: default_fetch_timeout(),
            session_timeout_seconds: default_session_timeout(),
            secrets: SecretsConfig::default(),
            author: AuthorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// The fetch timeout as a [`Duration`].
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    /// The session idle timeout as a [`Duration`].
    #[must_use]
    pub const fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_seconds)
    }

    /// Whether `branch` is in the locked set.
    #[must_use]
    pub fn is_locked(&self, branch: &str) -> bool {
        self.locked_branches.iter().any(|b| b == branch)
    }
}

fn default_repos_dir() -> PathBuf {
    PathBuf::from("data/repos")
}

fn default_drafts_dir() -> PathBuf {
    PathBuf::from("data/drafts")
}

fn default_meta_dir() -> PathBuf {
    PathBuf::from("data/meta")
}

fn default_apps_root() -> String {
    "apps".to_owned()
}

fn default_base_branch() -> String {
    "master".to_owned()
}

fn default_locked_branches() -> Vec<String> {
    vec!["master".to_owned()]
}

const fn default_fetch_timeout() -> u64 {
    30
}

const fn default_session_timeout() -> u64 {
    1800
}

// ---------------------------------------------------------------------------
// SecretsConfig
// ---------------------------------------------------------------------------

/// Inputs to the credential-sealing key derivation.
///
/// Both values should be overridden in any real deployment; the defaults
/// exist so a fresh checkout works out of the box.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretsConfig {
    /// Sealing key material.
    #[serde(default = "default_encrypt_key")]
    pub encrypt_key: String,

    /// Sealing salt material.
    #[serde(default = "default_encrypt_salt")]
    pub encrypt_salt: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            encrypt_key: default_encrypt_key(),
            encrypt_salt: default_encrypt_salt(),
        }
    }
}

// Never print key material.
impl fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsConfig")
            .field("encrypt_key", &"<redacted>")
            .field("encrypt_salt", &"<redacted>")
            .finish()
    }
}

fn default_encrypt_key() -> String {
    "confit-default-key".to_owned()
}

fn default_encrypt_salt() -> String {
    "confit-default-salt".to_owned()
}

// ---------------------------------------------------------------------------
// AuthorConfig
// ---------------------------------------------------------------------------

/// Fallback identity for commits when the session cannot supply one.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorConfig {
    /// Author name used when the session has no username.
    #[serde(default = "default_author_name")]
    pub name: String,

    /// Author email; sessions carry no email, so this is always used.
    #[serde(default = "default_author_email")]
    pub email: String,
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            name: default_author_name(),
            email: default_author_email(),
        }
    }
}

fn default_author_name() -> String {
    "confit".to_owned()
}

fn default_author_email() -> String {
    "confit@localhost".to_owned()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading an engine configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - If the file exists but contains invalid TOML or unknown fields,
    ///   returns a [`ConfigError`] with line-level detail.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                // Calculate line number from byte offset.
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_all_fields() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.repos_dir, PathBuf::from("data/repos"));
        assert_eq!(cfg.drafts_dir, PathBuf::from("data/drafts"));
        assert_eq!(cfg.meta_dir, PathBuf::from("data/meta"));
        assert_eq!(cfg.apps_root, "apps");
        assert_eq!(cfg.base_branch, "master");
        assert_eq!(cfg.locked_branches, vec!["master"]);
        assert_eq!(cfg.fetch_timeout_seconds, 30);
        assert_eq!(cfg.session_timeout_seconds, 1800);
        assert_eq!(cfg.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.session_timeout(), Duration::from_secs(1800));
        assert!(cfg.is_locked("master"));
        assert!(!cfg.is_locked("feature-x"));
    }

    #[test]
    fn parse_empty_string() {
        let cfg = EngineConfig::parse("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
repos_dir = "/var/confit/repos"
drafts_dir = "/var/confit/drafts"
meta_dir = "/var/confit/meta"
apps_root = "services"
base_branch = "main"
locked_branches = ["main", "release"]
fetch_timeout_seconds = 10
session_timeout_seconds = 600

[secrets]
encrypt_key = "k"
encrypt_salt = "s"

[author]
name = "Config Bot"
email = "bot@example.com"
"#;
        let cfg = EngineConfig::parse(toml).unwrap();
        assert_eq!(cfg.repos_dir, PathBuf::from("/var/confit/repos"));
        assert_eq!(cfg.apps_root, "services");
        assert_eq!(cfg.base_branch, "main");
        assert!(cfg.is_locked("release"));
        assert!(!cfg.is_locked("master"));
        assert_eq!(cfg.fetch_timeout_seconds, 10);
        assert_eq!(cfg.secrets.encrypt_key, "k");
        assert_eq!(cfg.author.email, "bot@example.com");
    }

    #[test]
    fn parse_partial_config_uses_defaults() {
        let cfg = EngineConfig::parse("base_branch = \"trunk\"\n").unwrap();
        assert_eq!(cfg.base_branch, "trunk");
        // Everything else is default.
        assert_eq!(cfg.apps_root, "apps");
        assert_eq!(cfg.locked_branches, vec!["master"]);
        assert_eq!(cfg.session_timeout_seconds, 1800);
    }

    #[test]
    fn parse_rejects_unknown_top_level_field() {
        let err = EngineConfig::parse("unknown_field = true\n").unwrap_err();
        assert!(
            err.message.contains("unknown field"),
            "error should mention unknown field: {}",
            err.message
        );
    }

    #[test]
    fn parse_rejects_unknown_nested_field() {
        let toml = r#"
[author]
name = "x"
extra = "oops"
"#;
        let err = EngineConfig::parse(toml).unwrap_err();
        assert!(
            err.message.contains("unknown field"),
            "error should mention unknown field: {}",
            err.message
        );
    }

    #[test]
    fn parse_includes_line_number_on_error() {
        let toml = "apps_root = \"apps\"\nfetch_timeout_seconds = \"soon\"\n";
        let err = EngineConfig::parse(toml).unwrap_err();
        assert!(
            err.message.contains("line"),
            "error should include line number: {}",
            err.message
        );
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let cfg = EngineConfig::load(Path::new("/nonexistent/confit.toml")).unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn load_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confit.toml");
        std::fs::write(&path, "base_branch = \"main\"\n").unwrap();
        let cfg = EngineConfig::load(&path).unwrap();
        assert_eq!(cfg.base_branch, "main");
    }

    #[test]
    fn load_invalid_file_shows_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid [[[toml").unwrap();
        let err = EngineConfig::load(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
        assert!(!err.message.is_empty());
    }

    #[test]
    fn secrets_debug_redacts_material() {
        let cfg = EngineConfig::default();
        let dbg = format!("{:?}", cfg.secrets);
        assert!(!dbg.contains("confit-default-key"));
        assert!(dbg.contains("redacted"));
    }

    #[test]
    fn config_error_display_with_and_without_path() {
        let err = ConfigError {
            path: Some(PathBuf::from("/etc/confit.toml")),
            message: "bad field".to_owned(),
        };
        assert!(format!("{err}").contains("/etc/confit.toml"));

        let err = ConfigError {
            path: None,
            message: "parse error".to_owned(),
        };
        assert!(format!("{err}").contains("config error"));
    }
}
