//! Shared test helpers for the sync-engine integration tests.
//!
//! Every test gets its own temp directory holding a bare `origin.git`, a
//! plain seed clone used to script "someone else pushed" events with the git
//! CLI, and an engine whose data directories all live under the same temp
//! root. No network, no shared state between tests.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tempfile::TempDir;

use confit::config::EngineConfig;
use confit::engine::SyncEngine;
use confit::model::{Credentials, Session};
use confit_git::{
    BranchName, FetchLimits, Git2Backend, GitBackend, GitError, GitOid, GitRepo, RemoteAuth,
};

/// Run a git CLI command, panicking on failure.
pub fn git(cwd: &Path, args: &[&str]) -> String {
    let out = std::process::Command::new("git")
        .arg("-c")
        .arg("init.defaultBranch=master")
        .args(args)
        .current_dir(cwd)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_owned()
}

/// A bare origin, a seed clone, and an engine over them.
pub struct Harness {
    pub dir: TempDir,
    pub origin: PathBuf,
    pub seed: PathBuf,
    pub engine: SyncEngine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_backend(Box::new(Git2Backend))
    }

    pub fn with_backend(backend: Box<dyn GitBackend>) -> Self {
        Self::build(backend, |_| {})
    }

    /// Build a harness with a tweaked configuration.
    pub fn with_config(tweak: impl FnOnce(&mut EngineConfig)) -> Self {
        Self::build(Box::new(Git2Backend), tweak)
    }

    fn build(backend: Box<dyn GitBackend>, tweak: impl FnOnce(&mut EngineConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let (origin, seed) = seed_remote(dir.path());
        let mut config = test_config(dir.path());
        tweak(&mut config);
        let engine = SyncEngine::with_backend(config, backend).unwrap();
        Self {
            dir,
            origin,
            seed,
            engine,
        }
    }

    pub fn credentials(&self, username: &str) -> Credentials {
        Credentials {
            username: username.to_owned(),
            password: "token".to_owned(),
            repo_url: self.origin.to_str().unwrap().to_owned(),
        }
    }

    /// Access the repository as `alice`.
    pub fn login(&self) -> Session {
        self.engine.access_repo(&self.credentials("alice")).unwrap()
    }

    /// Push one more commit to a branch of the origin through the seed clone.
    pub fn advance_remote(&self, branch: &str, path: &str, content: &str) -> GitOid {
        git(&self.seed, &["checkout", branch]);
        let full = self.seed.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(&full, content).unwrap();
        git(&self.seed, &["add", "."]);
        git(&self.seed, &["commit", "-m", "remote edit"]);
        git(&self.seed, &["push", "origin", branch]);
        git(&self.seed, &["rev-parse", "HEAD"]).parse().unwrap()
    }

    /// Delete a file on a branch of the origin through the seed clone.
    pub fn remove_on_remote(&self, branch: &str, path: &str) {
        git(&self.seed, &["checkout", branch]);
        git(&self.seed, &["rm", path]);
        git(&self.seed, &["commit", "-m", "remote delete"]);
        git(&self.seed, &["push", "origin", branch]);
    }

    /// Create a branch on the origin from the current master tip.
    pub fn create_remote_branch(&self, name: &str) {
        git(&self.seed, &["checkout", "master"]);
        git(&self.seed, &["branch", "-f", name]);
        git(&self.seed, &["push", "origin", name]);
    }

    /// Delete a branch on the origin.
    pub fn delete_remote_branch(&self, name: &str) {
        git(&self.seed, &["push", "origin", "--delete", name]);
    }

    /// Tip of a branch as the origin sees it.
    pub fn remote_tip(&self, branch: &str) -> GitOid {
        git(
            &self.origin,
            &["rev-parse", &format!("refs/heads/{branch}")],
        )
        .parse()
        .unwrap()
    }

    /// Open the session's shadow clone directly for ref assertions.
    pub fn open_clone(&self, session: &Session) -> Box<dyn GitRepo> {
        let dir = self
            .engine
            .config()
            .repos_dir
            .join(&session.repo_folder);
        Git2Backend.open_repo(&dir).unwrap()
    }

    /// Resolve a local ref in the session's clone.
    pub fn local_ref(&self, session: &Session, branch: &str) -> Option<GitOid> {
        self.open_clone(session)
            .resolve_ref(&format!("refs/heads/{branch}"))
            .unwrap()
    }

    /// Resolve a remote-tracking ref in the session's clone.
    pub fn tracking_ref(&self, session: &Session, branch: &str) -> Option<GitOid> {
        self.open_clone(session)
            .resolve_ref(&format!("refs/remotes/origin/{branch}"))
            .unwrap()
    }

    /// Path of a draft overlay file for the session.
    pub fn draft_path(&self, session: &Session, branch: &str, app: &str, file: &str) -> PathBuf {
        self.engine
            .config()
            .drafts_dir
            .join(&session.repo_folder)
            .join(branch)
            .join("apps")
            .join(app)
            .join(file)
    }
}

/// Engine configuration rooted in a temp directory.
pub fn test_config(root: &Path) -> EngineConfig {
    EngineConfig {
        repos_dir: root.join("repos"),
        drafts_dir: root.join("drafts"),
        meta_dir: root.join("meta"),
        ..EngineConfig::default()
    }
}

/// Create a bare origin and a seed clone with one commit on master:
///
/// ```text
/// README.md
/// apps/billing/prod.yaml
/// apps/shop/config.yaml
/// ```
pub fn seed_remote(root: &Path) -> (PathBuf, PathBuf) {
    let origin = root.join("origin.git");
    let seed = root.join("seed");

    git(root, &["init", "--bare", origin.to_str().unwrap()]);
    git(
        root,
        &["clone", origin.to_str().unwrap(), seed.to_str().unwrap()],
    );
    git(&seed, &["config", "user.email", "seed@test.com"]);
    git(&seed, &["config", "user.name", "Seed"]);
    git(&seed, &["config", "commit.gpgsign", "false"]);

    std::fs::create_dir_all(seed.join("apps/shop")).unwrap();
    std::fs::create_dir_all(seed.join("apps/billing")).unwrap();
    std::fs::write(seed.join("README.md"), "# demo\n").unwrap();
    std::fs::write(seed.join("apps/shop/config.yaml"), "default:\n  size: 1\n").unwrap();
    std::fs::write(seed.join("apps/billing/prod.yaml"), "default:\n  fee: 2\n").unwrap();
    git(&seed, &["add", "."]);
    git(&seed, &["commit", "-m", "initial"]);
    git(&seed, &["push", "origin", "master"]);

    (origin, seed)
}

// ---------------------------------------------------------------------------
// Backend decorators
// ---------------------------------------------------------------------------

/// Counts clone invocations; everything else passes straight through.
pub struct CountingBackend {
    pub clones: Arc<AtomicUsize>,
}

impl CountingBackend {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let clones = Arc::new(AtomicUsize::new(0));
        (
            Self {
                clones: Arc::clone(&clones),
            },
            clones,
        )
    }
}

impl GitBackend for CountingBackend {
    fn clone_repo(
        &self,
        url: &str,
        dir: &Path,
        branch: &BranchName,
        auth: &RemoteAuth,
        limits: &FetchLimits,
    ) -> Result<Box<dyn GitRepo>, GitError> {
        self.clones.fetch_add(1, Ordering::SeqCst);
        Git2Backend.clone_repo(url, dir, branch, auth, limits)
    }

    fn open_repo(&self, dir: &Path) -> Result<Box<dyn GitRepo>, GitError> {
        Git2Backend.open_repo(dir)
    }
}

/// Fails every push while the flag is set; everything else is real.
pub struct FailPushBackend {
    pub fail: Arc<AtomicBool>,
}

impl FailPushBackend {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let fail = Arc::new(AtomicBool::new(false));
        (
            Self {
                fail: Arc::clone(&fail),
            },
            fail,
        )
    }
}

impl GitBackend for FailPushBackend {
    fn clone_repo(
        &self,
        url: &str,
        dir: &Path,
        branch: &BranchName,
        auth: &RemoteAuth,
        limits: &FetchLimits,
    ) -> Result<Box<dyn GitRepo>, GitError> {
        let inner = Git2Backend.clone_repo(url, dir, branch, auth, limits)?;
        Ok(Box::new(FailPushRepo {
            inner,
            fail: Arc::clone(&self.fail),
        }))
    }

    fn open_repo(&self, dir: &Path) -> Result<Box<dyn GitRepo>, GitError> {
        let inner = Git2Backend.open_repo(dir)?;
        Ok(Box::new(FailPushRepo {
            inner,
            fail: Arc::clone(&self.fail),
        }))
    }
}

pub struct FailPushRepo {
    inner: Box<dyn GitRepo>,
    fail: Arc<AtomicBool>,
}

impl GitRepo for FailPushRepo {
    fn resolve_ref(&self, name: &str) -> Result<Option<GitOid>, GitError> {
        self.inner.resolve_ref(name)
    }

    fn write_ref(&self, name: &str, oid: GitOid) -> Result<(), GitError> {
        self.inner.write_ref(name, oid)
    }

    fn delete_ref(&self, name: &str) -> Result<(), GitError> {
        self.inner.delete_ref(name)
    }

    fn set_head(&self, branch: &BranchName) -> Result<(), GitError> {
        self.inner.set_head(branch)
    }

    fn head_branch(&self) -> Result<Option<String>, GitError> {
        self.inner.head_branch()
    }

    fn list_branches(
        &self,
        scope: confit_git::BranchScope,
    ) -> Result<Vec<String>, GitError> {
        self.inner.list_branches(scope)
    }

    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError> {
        self.inner.read_blob(oid)
    }

    fn read_commit(&self, oid: GitOid) -> Result<confit_git::CommitInfo, GitError> {
        self.inner.read_commit(oid)
    }

    fn list_dir(&self, commit: GitOid, dir: &str) -> Result<Vec<confit_git::TreeEntry>, GitError> {
        self.inner.list_dir(commit, dir)
    }

    fn find_file(
        &self,
        commit: GitOid,
        path: &str,
    ) -> Result<Option<confit_git::TreeEntry>, GitError> {
        self.inner.find_file(commit, path)
    }

    fn rebuild_index(&self, commit: GitOid) -> Result<(), GitError> {
        self.inner.rebuild_index(commit)
    }

    fn stage_blob(&self, path: &str, data: &[u8]) -> Result<GitOid, GitError> {
        self.inner.stage_blob(path, data)
    }

    fn unstage(&self, path: &str) -> Result<(), GitError> {
        self.inner.unstage(path)
    }

    fn commit_staged(
        &self,
        branch: &BranchName,
        message: &str,
        author: &confit_git::CommitAuthor,
    ) -> Result<GitOid, GitError> {
        self.inner.commit_staged(branch, message, author)
    }

    fn merge_commit(
        &self,
        branch: &BranchName,
        message: &str,
        author: &confit_git::CommitAuthor,
        second_parent: GitOid,
    ) -> Result<GitOid, GitError> {
        self.inner.merge_commit(branch, message, author, second_parent)
    }

    fn ls_remote(&self, auth: &RemoteAuth) -> Result<Vec<(String, GitOid)>, GitError> {
        self.inner.ls_remote(auth)
    }

    fn fetch_branch(
        &self,
        branch: &BranchName,
        auth: &RemoteAuth,
        limits: &FetchLimits,
    ) -> Result<(), GitError> {
        self.inner.fetch_branch(branch, auth, limits)
    }

    fn fetch_all(&self, auth: &RemoteAuth, limits: &FetchLimits) -> Result<Vec<String>, GitError> {
        self.inner.fetch_all(auth, limits)
    }

    fn push_branch(
        &self,
        branch: &BranchName,
        auth: &RemoteAuth,
        force: bool,
    ) -> Result<(), GitError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GitError::PushRejected {
                remote: "origin".to_owned(),
                message: "injected failure".to_owned(),
            });
        }
        self.inner.push_branch(branch, auth, force)
    }

    fn read_config(&self, key: &str) -> Result<Option<String>, GitError> {
        self.inner.read_config(key)
    }

    fn write_config(&self, key: &str, value: &str) -> Result<(), GitError> {
        self.inner.write_config(key, value)
    }
}
