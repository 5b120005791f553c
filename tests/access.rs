//! Repository access: clone-or-reuse, metadata validation, sessions, and
//! the username cache.

mod common;

use common::{CountingBackend, Harness, git};
use confit::SyncError;

#[test]
fn first_access_clones_and_issues_session() {
    let h = Harness::new();
    let session = h.login();

    assert_eq!(session.username, "alice");
    assert_eq!(session.branch.as_str(), "master");
    assert_eq!(session.token.len(), 64);
    assert_eq!(session.repo_folder.len(), 32);

    // The shadow clone exists and both refs sit at the remote tip.
    let tip = h.remote_tip("master");
    assert_eq!(h.local_ref(&session, "master"), Some(tip));
    assert_eq!(h.tracking_ref(&session, "master"), Some(tip));

    // No working tree was materialized.
    let clone_dir = h.engine.config().repos_dir.join(&session.repo_folder);
    let entries: Vec<_> = std::fs::read_dir(&clone_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from(".git")]);
}

#[test]
fn second_access_reuses_clone() {
    let (backend, clones) = CountingBackend::new();
    let h = Harness::with_backend(Box::new(backend));

    let first = h.login();
    let before = h.local_ref(&first, "master");
    let second = h.login();

    assert_eq!(clones.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(first.repo_folder, second.repo_folder);
    assert_eq!(h.local_ref(&second, "master"), before);
}

#[test]
fn corrupt_metadata_forces_reclone() {
    let (backend, clones) = CountingBackend::new();
    let h = Harness::with_backend(Box::new(backend));

    let session = h.login();
    let meta_file = h
        .engine
        .config()
        .meta_dir
        .join(format!("{}.meta", session.repo_folder));
    std::fs::write(&meta_file, "not json").unwrap();

    let session = h.login();
    assert_eq!(clones.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(session.branch.as_str(), "master");
}

#[test]
fn stale_marker_forces_reclone() {
    let (backend, clones) = CountingBackend::new();
    let h = Harness::with_backend(Box::new(backend));

    let session = h.login();
    let meta_file = h
        .engine
        .config()
        .meta_dir
        .join(format!("{}.meta", session.repo_folder));
    let text = std::fs::read_to_string(&meta_file).unwrap();
    let mut meta: serde_json::Value = serde_json::from_str(&text).unwrap();
    meta["stale"] = serde_json::Value::Bool(true);
    std::fs::write(&meta_file, serde_json::to_string(&meta).unwrap()).unwrap();

    h.login();
    assert_eq!(clones.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[test]
fn failed_clone_leaves_nothing_behind() {
    let h = Harness::new();
    let mut creds = h.credentials("alice");
    creds.repo_url = h.dir.path().join("no-such-repo.git").display().to_string();

    assert!(h.engine.access_repo(&creds).is_err());

    let repos: Vec<_> = match std::fs::read_dir(&h.engine.config().repos_dir) {
        Ok(entries) => entries.collect(),
        Err(_) => Vec::new(),
    };
    assert!(repos.is_empty());
}

#[test]
fn metadata_never_stores_cleartext_password() {
    let h = Harness::new();
    let session = h.login();
    let meta_file = h
        .engine
        .config()
        .meta_dir
        .join(format!("{}.meta", session.repo_folder));
    let text = std::fs::read_to_string(meta_file).unwrap();
    assert!(!text.contains("token"), "password leaked into metadata");
    assert!(text.contains("sealed_password"));
}

#[test]
fn check_session_returns_principal() {
    let h = Harness::new();
    let session = h.login();

    let principal = h.engine.check_session(&session.token).unwrap();
    assert_eq!(principal.session.username, "alice");
    assert_eq!(principal.metadata.repo_folder, session.repo_folder);
    assert_eq!(principal.metadata.branch, "master");
}

#[test]
fn unknown_token_is_unauthorized() {
    let h = Harness::new();
    let err = h.engine.check_session("deadbeef").unwrap_err();
    assert!(matches!(err, SyncError::Unauthorized { .. }), "{err}");
}

#[test]
fn idle_session_expires() {
    let h = Harness::with_config(|c| c.session_timeout_seconds = 0);
    let session = h.login();

    std::thread::sleep(std::time::Duration::from_millis(20));
    let err = h.engine.check_session(&session.token).unwrap_err();
    assert!(matches!(err, SyncError::Unauthorized { .. }), "{err}");
}

#[test]
fn logout_evicts_immediately() {
    let h = Harness::new();
    let session = h.login();
    h.engine.logout(&session.token);
    assert!(h.engine.check_session(&session.token).is_err());
}

#[test]
fn username_cache_matches_prefixes() {
    let h = Harness::new();
    h.engine.access_repo(&h.credentials("alice")).unwrap();
    h.engine.access_repo(&h.credentials("albert")).unwrap();
    h.engine.access_repo(&h.credentials("bob")).unwrap();

    assert_eq!(h.engine.users_matching("al").unwrap(), vec!["albert", "alice"]);
    assert_eq!(h.engine.users_matching("AL").unwrap(), vec!["albert", "alice"]);
    assert_eq!(h.engine.users_matching("z").unwrap(), Vec::<String>::new());
}

#[test]
fn reuse_restores_recorded_branch() {
    let h = Harness::new();
    h.create_remote_branch("dev");

    let mut session = h.login();
    h.engine
        .checkout_branch(&mut session, confit::CheckoutMode::Switch, "dev")
        .unwrap();

    // A later access resumes dev, not the base branch.
    let session = h.login();
    assert_eq!(session.branch.as_str(), "dev");
    let clone = h.open_clone(&session);
    assert_eq!(clone.head_branch().unwrap().as_deref(), Some("dev"));
    drop(clone);

    // Sanity: the remote still has both branches.
    let heads = git(&h.origin, &["branch", "--list"]);
    assert!(heads.contains("dev") && heads.contains("master"));
}
