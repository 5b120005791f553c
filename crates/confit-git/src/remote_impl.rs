//! libgit2-backed remote operations: shadow clone, fetch, ls-remote, push.
//!
//! Every transfer authenticates through the same credential chain: offered
//! userpass (the HTTPS token flow) first, then the local ssh agent, then
//! libgit2's default. Fetches honor an optional wall-clock deadline enforced
//! from the transfer-progress callback; libgit2 surfaces the abort as an
//! error, which is mapped to [`GitError::Timeout`].

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::error::GitError;
use crate::git2_repo::{Git2Repo, backend_err, from_git2_oid};
use crate::types::{BranchName, FetchLimits, GitOid, RemoteAuth};

/// The only remote a shadow clone ever has.
pub(crate) const REMOTE_NAME: &str = "origin";

fn find_origin(repo: &Git2Repo) -> Result<git2::Remote<'_>, GitError> {
    repo.repo
        .find_remote(REMOTE_NAME)
        .map_err(|e| backend_err(&e))
}

fn remote_callbacks(
    auth: &RemoteAuth,
    deadline: Option<Instant>,
    timed_out: Rc<Cell<bool>>,
) -> git2::RemoteCallbacks<'static> {
    let mut callbacks = git2::RemoteCallbacks::new();
    let username = auth.username.clone();
    let password = auth.password.clone();
    callbacks.credentials(move |_url, username_from_url, allowed| {
        if allowed.is_user_pass_plaintext()
            && let (Some(user), Some(pass)) = (username.as_deref(), password.as_deref())
        {
            return git2::Cred::userpass_plaintext(user, pass);
        }
        if allowed.is_ssh_key()
            && let Some(user) = username_from_url
        {
            return git2::Cred::ssh_key_from_agent(user);
        }
        git2::Cred::default()
    });
    if let Some(deadline) = deadline {
        callbacks.transfer_progress(move |_progress| {
            if Instant::now() >= deadline {
                timed_out.set(true);
                return false;
            }
            true
        });
    }
    callbacks
}

/// Map a failed transfer to a [`GitError`].
///
/// `timed_out` wins over message inspection: when our progress callback
/// aborted the transfer, libgit2 reports a generic cancellation.
fn classify_remote_err(e: &git2::Error, timed_out: bool, timeout: Option<Duration>) -> GitError {
    if timed_out {
        return GitError::Timeout {
            seconds: timeout.map_or(0, |t| t.as_secs()),
        };
    }
    let message = e.message().to_owned();
    let lower = message.to_ascii_lowercase();
    if e.code() == git2::ErrorCode::Auth || lower.contains("401") || lower.contains("authenticat")
    {
        return GitError::Unauthorized { message };
    }
    if lower.contains("403") || lower.contains("forbidden") {
        return GitError::Forbidden { message };
    }
    if lower.contains("404")
        || lower.contains("not found")
        || lower.contains("could not find")
        || lower.contains("no such file")
    {
        return GitError::RepoNotFound { message };
    }
    GitError::Backend { message }
}

pub fn ls_remote(repo: &Git2Repo, auth: &RemoteAuth) -> Result<Vec<(String, GitOid)>, GitError> {
    let mut remote = find_origin(repo)?;
    let callbacks = remote_callbacks(auth, None, Rc::new(Cell::new(false)));
    let connection = remote
        .connect_auth(git2::Direction::Fetch, Some(callbacks), None)
        .map_err(|e| classify_remote_err(&e, false, None))?;
    let heads = connection
        .list()
        .map_err(|e| classify_remote_err(&e, false, None))?
        .iter()
        .map(|head| (head.name().to_owned(), from_git2_oid(head.oid())))
        .collect();
    Ok(heads)
}

fn run_fetch(
    repo: &Git2Repo,
    refspecs: &[String],
    auth: &RemoteAuth,
    limits: &FetchLimits,
) -> Result<(), GitError> {
    let specs: Vec<&str> = refspecs.iter().map(String::as_str).collect();
    let deadline = limits.timeout.map(|t| Instant::now() + t);

    let timed_out = Rc::new(Cell::new(false));
    let callbacks = remote_callbacks(auth, deadline, Rc::clone(&timed_out));
    let mut options = git2::FetchOptions::new();
    options.remote_callbacks(callbacks);
    if let Some(depth) = limits.depth {
        options.depth(i32::try_from(depth).unwrap_or(i32::MAX));
    }

    let mut remote = find_origin(repo)?;
    match remote.fetch(&specs, Some(&mut options), None) {
        Ok(()) => Ok(()),
        Err(e) if limits.depth.is_some() && !timed_out.get() && shallow_unsupported(&e) => {
            tracing::warn!(
                error = %e.message(),
                "transport rejected shallow fetch, retrying at full depth"
            );
            let timed_out = Rc::new(Cell::new(false));
            let callbacks = remote_callbacks(auth, deadline, Rc::clone(&timed_out));
            let mut options = git2::FetchOptions::new();
            options.remote_callbacks(callbacks);
            let mut remote = find_origin(repo)?;
            remote
                .fetch(&specs, Some(&mut options), None)
                .map_err(|e| classify_remote_err(&e, timed_out.get(), limits.timeout))
        }
        Err(e) => Err(classify_remote_err(&e, timed_out.get(), limits.timeout)),
    }
}

fn shallow_unsupported(e: &git2::Error) -> bool {
    e.message().to_ascii_lowercase().contains("shallow")
}

pub fn fetch_branch(
    repo: &Git2Repo,
    branch: &BranchName,
    auth: &RemoteAuth,
    limits: &FetchLimits,
) -> Result<(), GitError> {
    // The remote-side name of the branch is its local-ref spelling.
    let want = branch.local_ref();
    let advertised = ls_remote(repo, auth)?;
    if !advertised.iter().any(|(name, _)| name == &want) {
        return Err(GitError::RemoteRefMissing { ref_name: want });
    }
    let refspec = format!("+{want}:{}", branch.remote_ref());
    run_fetch(repo, &[refspec], auth, limits)
}

pub fn fetch_all(
    repo: &Git2Repo,
    auth: &RemoteAuth,
    limits: &FetchLimits,
) -> Result<Vec<String>, GitError> {
    let advertised = ls_remote(repo, auth)?
        .into_iter()
        .filter_map(|(name, _)| name.strip_prefix("refs/heads/").map(str::to_owned))
        .collect();
    run_fetch(
        repo,
        &["+refs/heads/*:refs/remotes/origin/*".to_owned()],
        auth,
        limits,
    )?;
    Ok(advertised)
}

pub fn push_branch(
    repo: &Git2Repo,
    branch: &BranchName,
    auth: &RemoteAuth,
    force: bool,
) -> Result<(), GitError> {
    let local = branch.local_ref();
    let refspec = if force {
        format!("+{local}:{local}")
    } else {
        format!("{local}:{local}")
    };
    tracing::debug!(branch = %branch, force, "pushing branch");

    let mut remote = find_origin(repo)?;
    // Per-ref rejection arrives via callback, not the push return value.
    let rejected: RefCell<Option<String>> = RefCell::new(None);
    {
        let mut callbacks = remote_callbacks(auth, None, Rc::new(Cell::new(false)));
        callbacks.push_update_reference(|_ref_name, status| {
            if let Some(msg) = status {
                *rejected.borrow_mut() = Some(msg.to_owned());
            }
            Ok(())
        });
        let mut options = git2::PushOptions::new();
        options.remote_callbacks(callbacks);

        if let Err(e) = remote.push(&[refspec.as_str()], Some(&mut options)) {
            let message = e.message().to_owned();
            if message.contains("non-fast-forward")
                || message.contains("fetch first")
                || message.contains("cannot lock ref")
                || message.contains("failed to update ref")
            {
                return Err(GitError::PushRejected {
                    remote: REMOTE_NAME.to_owned(),
                    message,
                });
            }
            return Err(classify_remote_err(&e, false, None));
        }
    }
    if let Some(message) = rejected.into_inner() {
        return Err(GitError::PushRejected {
            remote: REMOTE_NAME.to_owned(),
            message,
        });
    }
    Ok(())
}

/// Create a shadow clone: init, add origin, fetch one branch, seed refs.
///
/// Nothing is checked out. After this returns, `refs/remotes/origin/<branch>`
/// and `refs/heads/<branch>` both point at the remote tip and `HEAD` is
/// symbolic to the branch.
pub fn clone_shadow(
    url: &str,
    dir: &Path,
    branch: &BranchName,
    auth: &RemoteAuth,
    limits: &FetchLimits,
) -> Result<Git2Repo, GitError> {
    tracing::info!(url, dir = %dir.display(), branch = %branch, "creating shadow clone");
    let repo = git2::Repository::init(dir).map_err(|e| backend_err(&e))?;
    repo.remote(REMOTE_NAME, url).map_err(|e| backend_err(&e))?;
    let shadow = Git2Repo {
        repo,
        workdir: dir.to_path_buf(),
    };

    fetch_branch(&shadow, branch, auth, limits)?;

    let tip = crate::refs_impl::resolve_ref(&shadow, &branch.remote_ref())?.ok_or_else(|| {
        GitError::Backend {
            message: format!("fetch of {branch} did not create {}", branch.remote_ref()),
        }
    })?;
    crate::refs_impl::write_ref(&shadow, &branch.local_ref(), tip)?;
    crate::refs_impl::set_head(&shadow, branch)?;
    crate::config_impl::write_config(&shadow, &format!("branch.{branch}.remote"), REMOTE_NAME)?;
    crate::config_impl::write_config(&shadow, &format!("branch.{branch}.merge"), &branch.local_ref())?;
    Ok(shadow)
}
