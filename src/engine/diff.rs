//! Branch comparison and the two-parent fast merge.
//!
//! Everything here works on *snapshots*: per-commit maps from
//! (application, file) to blob OID, built by a tree walk that never reads
//! blob content. Classification is pure OID comparison; content is read only
//! for files that end up in the proposal (to-save and conflicts), never for
//! files that agree.
//!
//! Ancestry is walked through parent links with a visit bound, treating
//! missing commit objects as exhaustion rather than failure: shallow clones
//! make absent parents routine.

use std::collections::{BTreeSet, VecDeque};

use confit_git::{GitError, GitOid, GitRepo};

use super::SyncEngine;
use crate::error::SyncError;
use crate::model::{BranchDiff, ConfigFile, ConflictFile, Session};

/// Per-commit view of the YAML files under the apps root:
/// (application, file) → blob OID.
pub type Snapshot = std::collections::BTreeMap<(String, String), GitOid>;

/// How many commits an ancestry walk may visit before treating history as
/// exhausted. Generous for configuration repositories.
const ANCESTRY_WALK_LIMIT: usize = 1_000;

// ---------------------------------------------------------------------------
// Snapshot classification (pure)
// ---------------------------------------------------------------------------

/// Two-way comparison of snapshots by (application, file) key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotDelta {
    /// Keys present only in the left snapshot.
    pub only_in_left: Vec<(String, String)>,
    /// Keys present only in the right snapshot.
    pub only_in_right: Vec<(String, String)>,
    /// Keys present in both with differing blob OIDs.
    pub differing: Vec<(String, String)>,
}

impl SnapshotDelta {
    /// True when the snapshots describe the same set of file versions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.only_in_left.is_empty() && self.only_in_right.is_empty() && self.differing.is_empty()
    }
}

/// Classify two snapshots against each other by key, OIDs only.
#[must_use]
pub fn classify(left: &Snapshot, right: &Snapshot) -> SnapshotDelta {
    let mut delta = SnapshotDelta::default();
    for (key, left_oid) in left {
        match right.get(key) {
            None => delta.only_in_left.push(key.clone()),
            Some(right_oid) if right_oid != left_oid => delta.differing.push(key.clone()),
            Some(_) => {}
        }
    }
    for key in right.keys() {
        if !left.contains_key(key) {
            delta.only_in_right.push(key.clone());
        }
    }
    delta
}

// ---------------------------------------------------------------------------
// Branch diff / merge
// ---------------------------------------------------------------------------

impl SyncEngine {
    /// Compute what merging `src` into `target` would need.
    ///
    /// Returns an empty diff when `target` already contains `src`'s commit.
    /// Otherwise classifies both trees against their merge base; when shallow
    /// history hides the merge base, falls back to a two-way comparison that
    /// proposes no deletions. Never mutates anything.
    ///
    /// # Errors
    /// Fails `NotFound` when either branch has no local tip.
    pub fn branch_diff(
        &self,
        session: &Session,
        src: &str,
        target: &str,
    ) -> Result<BranchDiff, SyncError> {
        let src_branch = Self::parse_branch(src)?;
        let target_branch = Self::parse_branch(target)?;
        let repo = self.open(session)?;

        let src_tip = self
            .branch_tip(repo.as_ref(), &src_branch)?
            .ok_or_else(|| SyncError::not_found(format!("branch `{src_branch}`")))?;
        let target_tip = self
            .branch_tip(repo.as_ref(), &target_branch)?
            .ok_or_else(|| SyncError::not_found(format!("branch `{target_branch}`")))?;

        if contains_commit(repo.as_ref(), target_tip, src_tip)? {
            tracing::debug!(src = %src_branch, target = %target_branch, "target already contains src");
            return Ok(BranchDiff::default());
        }

        let src_snap = self.snapshot(repo.as_ref(), src_tip)?;
        let target_snap = self.snapshot(repo.as_ref(), target_tip)?;

        let diff = match merge_base(repo.as_ref(), src_tip, target_tip)? {
            Some(base) => {
                let base_snap = self.snapshot(repo.as_ref(), base)?;
                three_way(repo.as_ref(), &base_snap, &src_snap, &target_snap)?
            }
            // Shallow history hid the common ancestor; compare the two tips
            // directly and propose no deletions.
            None => two_way(repo.as_ref(), &src_snap, &target_snap)?,
        };
        tracing::info!(
            src = %src_branch,
            target = %target_branch,
            to_save = diff.to_save.len(),
            to_delete = diff.to_delete.len(),
            conflicts = diff.conflict_files.len(),
            "branch diff computed",
        );
        Ok(diff)
    }

    /// Merge `src` into `target` by committing a pre-resolved diff as a
    /// two-parent merge commit.
    ///
    /// This is a fast merge, not a content-level three-way merge: the caller
    /// must have resolved every conflict already ([`branch_diff`] reports
    /// them), and the call fails with `Conflict` if any remain in `diff`.
    ///
    /// [`branch_diff`]: Self::branch_diff
    ///
    /// # Errors
    /// Fails `Conflict` for an unresolved diff, `NotFound` for a missing
    /// branch, and propagates push-transaction failures after rollback.
    pub fn merge_branch(
        &self,
        session: &Session,
        src: &str,
        target: &str,
        diff: &BranchDiff,
    ) -> Result<(), SyncError> {
        if !diff.conflict_files.is_empty() {
            return Err(SyncError::Conflict {
                files: diff.conflict_files.clone(),
            });
        }

        let src_branch = Self::parse_branch(src)?;
        let target_branch = Self::parse_branch(target)?;
        let repo = self.open(session)?;

        let src_tip = self
            .branch_tip(repo.as_ref(), &src_branch)?
            .ok_or_else(|| SyncError::not_found(format!("branch `{src_branch}`")))?;
        let target_tip = self
            .branch_tip(repo.as_ref(), &target_branch)?
            .ok_or_else(|| SyncError::not_found(format!("branch `{target_branch}`")))?;

        let author = self.commit_author(session);
        let message = format!("Merge branch '{src_branch}' into {target_branch}");
        let mut staged: Vec<(String, Vec<u8>)> = Vec::with_capacity(diff.to_save.len());
        for file in &diff.to_save {
            let path = self.paths().repo_path(&file.application, &file.file_name);
            let body = match file.draft_content.as_ref().or(file.original_content.as_ref()) {
                Some(text) => text.clone().into_bytes(),
                None => match file.oid {
                    Some(oid) => repo.read_blob(oid)?,
                    None => {
                        return Err(SyncError::not_found(format!("content for `{path}`")));
                    }
                },
            };
            staged.push((path, body));
        }
        let removed: Vec<String> = diff
            .to_delete
            .iter()
            .map(|f| self.paths().repo_path(&f.application, &f.file_name))
            .collect();

        self.do_push(
            repo.as_ref(),
            &session.auth,
            &target_branch,
            target_tip,
            false,
            &mut |repo| {
                for (path, body) in &staged {
                    repo.stage_blob(path, body)?;
                }
                for path in &removed {
                    repo.unstage(path)?;
                }
                Ok(repo.merge_commit(&target_branch, &message, &author, src_tip)?)
            },
        )?;

        // The transaction left the index mirroring the target branch; put it
        // back on the session's checked-out branch if that differs.
        if let Some(head) = repo.head_branch()?
            && head != target_branch.as_str()
            && let Some(head_tip) = repo.resolve_ref(&format!("refs/heads/{head}"))?
        {
            repo.rebuild_index(head_tip)?;
        }
        tracing::info!(src = %src_branch, target = %target_branch, "branches merged");
        Ok(())
    }
}

fn three_way(
    repo: &dyn GitRepo,
    base: &Snapshot,
    src: &Snapshot,
    target: &Snapshot,
) -> Result<BranchDiff, SyncError> {
    let mut diff = BranchDiff::default();
    let keys: BTreeSet<&(String, String)> =
        base.keys().chain(src.keys()).chain(target.keys()).collect();
    for key in keys {
        let base_oid = base.get(key).copied();
        let src_oid = src.get(key).copied();
        let target_oid = target.get(key).copied();
        // Skip files src did not touch, and files both sides agree on.
        if src_oid == base_oid || src_oid == target_oid {
            continue;
        }
        let target_moved = target_oid != base_oid;
        match src_oid {
            None => {
                if let Some(oid) = target_oid {
                    diff.to_delete.push(ConfigFile {
                        application: key.0.clone(),
                        file_name: key.1.clone(),
                        oid: Some(oid),
                        ..ConfigFile::default()
                    });
                }
            }
            Some(oid) => {
                let content = read_text(repo, oid)?;
                if target_moved {
                    let (upstream_content, upstream_oid) = match target_oid {
                        Some(oid) => (Some(read_text(repo, oid)?), Some(oid)),
                        None => (None, None),
                    };
                    diff.conflict_files.push(ConflictFile {
                        application: key.0.clone(),
                        file_name: key.1.clone(),
                        draft_content: content,
                        upstream_content,
                        upstream_oid,
                    });
                } else {
                    diff.to_save.push(save_candidate(key, oid, content));
                }
            }
        }
    }
    Ok(diff)
}

fn two_way(repo: &dyn GitRepo, src: &Snapshot, target: &Snapshot) -> Result<BranchDiff, SyncError> {
    let mut diff = BranchDiff::default();
    for (key, src_oid) in src {
        match target.get(key) {
            None => {
                let content = read_text(repo, *src_oid)?;
                diff.to_save.push(save_candidate(key, *src_oid, content));
            }
            Some(target_oid) if target_oid != src_oid => {
                diff.conflict_files.push(ConflictFile {
                    application: key.0.clone(),
                    file_name: key.1.clone(),
                    draft_content: read_text(repo, *src_oid)?,
                    upstream_content: Some(read_text(repo, *target_oid)?),
                    upstream_oid: Some(*target_oid),
                });
            }
            Some(_) => {}
        }
    }
    Ok(diff)
}

fn save_candidate(key: &(String, String), oid: GitOid, content: String) -> ConfigFile {
    let size = content.len() as u64;
    ConfigFile {
        application: key.0.clone(),
        file_name: key.1.clone(),
        oid: Some(oid),
        draft_content: Some(content),
        original_content: None,
        modified: true,
        size,
    }
}

fn read_text(repo: &dyn GitRepo, oid: GitOid) -> Result<String, SyncError> {
    Ok(String::from_utf8_lossy(&repo.read_blob(oid)?).into_owned())
}

// ---------------------------------------------------------------------------
// Bounded ancestry walks
// ---------------------------------------------------------------------------

/// Every reachable ancestor of `tip` (inclusive), breadth-first, bounded by
/// [`ANCESTRY_WALK_LIMIT`]. Missing commit objects end that path of the walk.
fn ancestors(repo: &dyn GitRepo, tip: GitOid) -> Result<Vec<GitOid>, SyncError> {
    let mut seen: BTreeSet<GitOid> = BTreeSet::new();
    let mut queue: VecDeque<GitOid> = VecDeque::from([tip]);
    let mut out = Vec::new();
    while let Some(oid) = queue.pop_front() {
        if !seen.insert(oid) {
            continue;
        }
        if seen.len() > ANCESTRY_WALK_LIMIT {
            tracing::debug!(tip = %tip, "ancestry walk limit reached");
            break;
        }
        let info = match repo.read_commit(oid) {
            Ok(info) => info,
            Err(GitError::NotFound { .. }) => continue,
            Err(e) => return Err(e.into()),
        };
        out.push(oid);
        queue.extend(info.parents);
    }
    Ok(out)
}

/// Whether `needle` is reachable from `haystack` through parent links.
pub(crate) fn contains_commit(
    repo: &dyn GitRepo,
    haystack: GitOid,
    needle: GitOid,
) -> Result<bool, SyncError> {
    Ok(ancestors(repo, haystack)?.contains(&needle))
}

/// First commit (in breadth-first order from `a`) reachable from both tips.
pub(crate) fn merge_base(
    repo: &dyn GitRepo,
    a: GitOid,
    b: GitOid,
) -> Result<Option<GitOid>, SyncError> {
    let from_b: BTreeSet<GitOid> = ancestors(repo, b)?.into_iter().collect();
    for oid in ancestors(repo, a)? {
        if from_b.contains(&oid) {
            return Ok(Some(oid));
        }
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
