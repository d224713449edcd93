//! Plan executor: applies the reconciler's buckets, in order,
//! using the resolver's per-bucket decisions, and produces the new
//! *last-local* manifest. No action is retried; a failed row is dropped
//! from the emitted manifest so the next run re-detects the divergence.

use std::path::Path;

use crate::manifest::Manifest;
use crate::providers::ObjectStore;
use crate::reconcile::{Action, Direction, Reconciliation};

pub struct ExecutionReport {
    pub new_last_local: Manifest,
    /// One human-readable line per row that failed; the row itself is
    /// simply absent from `new_last_local`.
    pub errors: Vec<String>,
    pub uploaded: usize,
    pub downloaded: usize,
}

impl ExecutionReport {
    fn empty() -> Self {
        Self {
            new_last_local: Manifest::new(),
            errors: Vec::new(),
            uploaded: 0,
            downloaded: 0,
        }
    }
}

/// Set a local file's mtime to the remote's recorded value, so the
/// indexer's `(mtime, size)` fast path matches across machines after a
/// download.
fn set_mtime(path: &Path, mtime_secs: f64) {
    let mtime = filetime::FileTime::from_unix_time(
        mtime_secs as i64,
        ((mtime_secs.fract()) * 1e9) as u32,
    );
    let _ = filetime::set_file_mtime(path, mtime);
}

/// Execute a push plan: `conflict_decisions`, `rename_decisions`, and
/// `copy_decisions` are parallel to `plan.conflicts`, `plan.renames`, and
/// `plan.copies` respectively.
pub fn execute_push(
    store: &dyn ObjectStore,
    plan: &Reconciliation,
    conflict_decisions: &[bool],
    rename_decisions: &[bool],
    copy_decisions: &[bool],
) -> ExecutionReport {
    let mut out = ExecutionReport::empty();

    for action in &plan.unchanged {
        if let Action::UnchangedHere { entry } = action {
            out.new_last_local.push(entry.clone());
        }
    }

    for action in &plan.auto_transfer {
        if let Action::LocalNewerUpload { entry } = action {
            match store.upload_rel(&entry.path, &entry.path) {
                Ok(()) => {
                    out.uploaded += 1;
                    out.new_last_local.push(entry.clone());
                }
                Err(e) => out.errors.push(format!("upload {}: {e}", entry.path)),
            }
        }
    }

    for (action, &decision) in plan.conflicts.iter().zip(conflict_decisions) {
        if let Action::Conflict { current, remote, .. } = action {
            let (Some(current), Some(remote)) = (current, remote) else {
                continue;
            };
            if decision {
                match store.upload_rel(&current.path, &current.path) {
                    Ok(()) => {
                        out.uploaded += 1;
                        out.new_last_local.push(current.clone());
                    }
                    Err(e) => out.errors.push(format!("upload {}: {e}", current.path)),
                }
            } else {
                out.new_last_local.push(remote.clone());
            }
        }
    }

    for (action, &decision) in plan.renames.iter().zip(rename_decisions) {
        if let Action::RenameCandidate { from, to } = action {
            let result = if decision {
                store.remote_move(&from.path, &to.path)
            } else {
                store.upload_rel(&to.path, &to.path)
            };
            match result {
                Ok(()) => {
                    out.uploaded += 1;
                    out.new_last_local.push(to.clone());
                }
                Err(e) => out.errors.push(format!("rename {} -> {}: {e}", from.path, to.path)),
            }
        }
    }

    for (action, &decision) in plan.copies.iter().zip(copy_decisions) {
        if let Action::CopyCandidate { from, to } = action {
            let result = if decision {
                store.remote_copy(&from.path, &to.path)
            } else {
                store.upload_rel(&to.path, &to.path)
            };
            match result {
                Ok(()) => {
                    out.uploaded += 1;
                    out.new_last_local.push(to.clone());
                }
                Err(e) => out.errors.push(format!("copy {} -> {}: {e}", from.path, to.path)),
            }
        }
    }

    for action in &plan.pure_transfers {
        if let Action::PureUpload { entry } = action {
            match store.upload_rel(&entry.path, &entry.path) {
                Ok(()) => {
                    out.uploaded += 1;
                    out.new_last_local.push(entry.clone());
                }
                Err(e) => out.errors.push(format!("upload {}: {e}", entry.path)),
            }
        }
    }

    // Locally-deleted rows are informational only on push: the remote is
    // never auto-pruned, and the row is dropped from last-local so the next
    // run keeps reporting the divergence until the user acts on it.

    out
}

/// Execute a fetch plan against `dest_root`: `conflict_decisions` and
/// `deletion_decisions` are parallel to `plan.conflicts` /
/// `plan.locally_deleted`.
pub fn execute_fetch(
    store: &dyn ObjectStore,
    dest_root: &Path,
    plan: &Reconciliation,
    conflict_decisions: &[bool],
    rename_decisions: &[bool],
    copy_decisions: &[bool],
    deletion_decisions: &[bool],
) -> ExecutionReport {
    let mut out = ExecutionReport::empty();

    for action in &plan.unchanged {
        if let Action::UnchangedHere { entry } = action {
            let path = dest_root.join(entry.path.trim_start_matches('/'));
            set_mtime(&path, entry.mtime);
            out.new_last_local.push(entry.clone());
        }
    }

    for action in &plan.auto_transfer {
        if let Action::RemoteNewerDownload { entry } = action {
            match store.download_rel(&entry.path, &entry.path) {
                Ok(local_path) => {
                    set_mtime(&local_path, entry.mtime);
                    out.downloaded += 1;
                    out.new_last_local.push(entry.clone());
                }
                Err(e) => out.errors.push(format!("download {}: {e}", entry.path)),
            }
        }
    }

    for (action, &decision) in plan.conflicts.iter().zip(conflict_decisions) {
        if let Action::Conflict { current, remote, .. } = action {
            let (Some(current), Some(remote)) = (current, remote) else {
                continue;
            };
            if decision {
                match store.download_rel(&remote.path, &remote.path) {
                    Ok(local_path) => {
                        set_mtime(&local_path, remote.mtime);
                        out.downloaded += 1;
                        out.new_last_local.push(remote.clone());
                    }
                    Err(e) => out.errors.push(format!("download {}: {e}", remote.path)),
                }
            } else {
                out.new_last_local.push(current.clone());
            }
        }
    }

    for (action, &decision) in plan.renames.iter().zip(rename_decisions) {
        // On fetch, `from` is a current-local path and `to` is the new
        // remote-only path: a local move/copy instead of a remote one.
        if let Action::RenameCandidate { from, to } = action {
            let src = dest_root.join(from.path.trim_start_matches('/'));
            let dst = dest_root.join(to.path.trim_start_matches('/'));
            let result = if decision {
                local_move(&src, &dst)
            } else {
                store.download_rel(&to.path, &to.path).map(|_| ())
            };
            match result {
                Ok(()) => {
                    out.downloaded += 1;
                    set_mtime(&dst, to.mtime);
                    out.new_last_local.push(to.clone());
                }
                Err(e) => out.errors.push(format!("local move {} -> {}: {e}", from.path, to.path)),
            }
        }
    }

    for (action, &decision) in plan.copies.iter().zip(copy_decisions) {
        if let Action::CopyCandidate { from, to } = action {
            let src = dest_root.join(from.path.trim_start_matches('/'));
            let dst = dest_root.join(to.path.trim_start_matches('/'));
            let result = if decision {
                local_copy(&src, &dst)
            } else {
                store.download_rel(&to.path, &to.path).map(|_| ())
            };
            match result {
                Ok(()) => {
                    out.downloaded += 1;
                    set_mtime(&dst, to.mtime);
                    out.new_last_local.push(to.clone());
                }
                Err(e) => out.errors.push(format!("local copy {} -> {}: {e}", from.path, to.path)),
            }
        }
    }

    for action in &plan.pure_transfers {
        if let Action::PureDownload { entry } = action {
            match store.download_rel(&entry.path, &entry.path) {
                Ok(local_path) => {
                    set_mtime(&local_path, entry.mtime);
                    out.downloaded += 1;
                    out.new_last_local.push(entry.clone());
                }
                Err(e) => out.errors.push(format!("download {}: {e}", entry.path)),
            }
        }
    }

    for (action, &decision) in plan.locally_deleted.iter().zip(deletion_decisions) {
        if let Action::LocallyDeleted { entry } = action {
            if decision {
                let path = dest_root.join(entry.path.trim_start_matches('/'));
                let _ = std::fs::remove_file(path);
                // Deleted; not carried into the new last-local.
            } else {
                out.new_last_local.push(entry.clone());
            }
        }
    }

    out
}

fn local_move(src: &Path, dst: &Path) -> anyhow::Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(src, dst)?;
    Ok(())
}

fn local_copy(src: &Path, dst: &Path) -> anyhow::Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, dst)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FileEntry;
    use crate::providers::LocalDirStore;
    use std::fs;

    fn entry(path: &str, hash: &str, size: i64) -> FileEntry {
        FileEntry {
            hash: hash.into(),
            size,
            mtime: 0.0,
            sync_time: 0.0,
            path: path.into(),
        }
    }

    #[test]
    fn push_unattended_upload_appends_current_entry_and_uploads() {
        let bucket = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(dest.path().join("a.txt"), b"v2").unwrap();
        let store = LocalDirStore::new(bucket.path(), dest.path());

        let plan = Reconciliation {
            auto_transfer: vec![Action::LocalNewerUpload {
                entry: entry("/a.txt", "h2", 2),
            }],
            ..Default::default()
        };
        let report = execute_push(&store, &plan, &[], &[], &[]);
        assert_eq!(report.uploaded, 1);
        assert!(report.errors.is_empty());
        assert_eq!(report.new_last_local.entries.len(), 1);
        assert!(bucket.path().join("a.txt").exists());
    }

    #[test]
    fn push_conflict_decision_false_keeps_remote_row() {
        let bucket = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(bucket.path(), dest.path());

        let plan = Reconciliation {
            conflicts: vec![Action::Conflict {
                current: Some(entry("/a.txt", "h2", 2)),
                last_local: None,
                remote: Some(entry("/a.txt", "h1", 1)),
            }],
            ..Default::default()
        };
        let report = execute_push(&store, &plan, &[false], &[], &[]);
        assert_eq!(report.uploaded, 0);
        assert_eq!(report.new_last_local.entries[0].hash, "h1");
    }

    #[test]
    fn push_failed_upload_drops_row_from_last_local() {
        let bucket = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        // File does not exist locally, so upload_rel will fail.
        let store = LocalDirStore::new(bucket.path(), dest.path());

        let plan = Reconciliation {
            pure_transfers: vec![Action::PureUpload {
                entry: entry("/missing.txt", "h1", 1),
            }],
            ..Default::default()
        };
        let report = execute_push(&store, &plan, &[], &[], &[]);
        assert_eq!(report.errors.len(), 1);
        assert!(report.new_last_local.entries.is_empty());
    }

    #[test]
    fn fetch_unattended_download_normalizes_mtime() {
        let bucket = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(bucket.path().join("a.txt"), b"remote").unwrap();
        let store = LocalDirStore::new(bucket.path(), dest.path());

        let plan = Reconciliation {
            auto_transfer: vec![Action::RemoteNewerDownload {
                entry: entry("/a.txt", "h1", 6),
            }],
            ..Default::default()
        };
        let report = execute_fetch(&store, dest.path(), &plan, &[], &[], &[], &[]);
        assert_eq!(report.downloaded, 1);
        assert!(dest.path().join("a.txt").exists());
    }

    #[test]
    fn fetch_locally_deleted_decision_true_removes_file() {
        let bucket = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(dest.path().join("gone.txt"), b"x").unwrap();
        let store = LocalDirStore::new(bucket.path(), dest.path());

        let plan = Reconciliation {
            locally_deleted: vec![Action::LocallyDeleted {
                entry: entry("/gone.txt", "h1", 1),
            }],
            ..Default::default()
        };
        let report = execute_fetch(&store, dest.path(), &plan, &[], &[], &[], &[true]);
        assert!(!dest.path().join("gone.txt").exists());
        assert!(report.new_last_local.entries.is_empty());
    }

    #[test]
    fn fetch_pure_download_fetches_a_brand_new_remote_file() {
        let bucket = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(bucket.path().join("new-on-remote.txt"), b"fresh").unwrap();
        let store = LocalDirStore::new(bucket.path(), dest.path());

        let plan = Reconciliation {
            pure_transfers: vec![Action::PureDownload {
                entry: entry("/new-on-remote.txt", "h9", 5),
            }],
            ..Default::default()
        };
        let report = execute_fetch(&store, dest.path(), &plan, &[], &[], &[], &[]);
        assert_eq!(report.downloaded, 1);
        assert!(report.errors.is_empty());
        assert_eq!(
            fs::read(dest.path().join("new-on-remote.txt")).unwrap(),
            b"fresh"
        );
        assert_eq!(report.new_last_local.entries.len(), 1);
    }

    #[test]
    fn fetch_rename_candidate_moves_the_local_file_locally() {
        let bucket = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(dest.path().join("old.txt"), b"same bytes").unwrap();
        let store = LocalDirStore::new(bucket.path(), dest.path());

        let plan = Reconciliation {
            renames: vec![Action::RenameCandidate {
                from: entry("/old.txt", "h1", 10),
                to: entry("/new.txt", "h1", 10),
            }],
            ..Default::default()
        };
        let report = execute_fetch(&store, dest.path(), &plan, &[], &[true], &[], &[]);
        assert!(report.errors.is_empty());
        assert!(!dest.path().join("old.txt").exists());
        assert!(dest.path().join("new.txt").exists());
        assert_eq!(report.new_last_local.entries[0].path, "/new.txt");
    }
}
