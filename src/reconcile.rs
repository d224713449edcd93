//! Three-way reconciler: classifies every path across
//! (current, last-local, remote) into one of nine action buckets.
//!
//! Paths present on both sides share one classification regardless of
//! direction — the "remote hasn't changed since our last sync point" test is
//! a single condition (`r.sync_time <= last_local.sync_time`); only its
//! label and resulting action (upload vs download) depend on which command
//! is running. Paths present on only one side are NOT symmetric the same
//! way: which manifest is "the side that gained a path" and which is "the
//! side that lost one" flips with direction, so `reconcile` swaps the roles
//! of `current`/`remote` for the one-sided buckets (new-path detection,
//! rename/copy matching, and the locally-deleted bucket) rather than always
//! reading them off `current`.

use crate::hash::EMPTY_HASH;
use crate::manifest::{FileEntry, Manifest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Push,
    Fetch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// No transfer; `entry` is carried verbatim into the new last-local.
    UnchangedHere { entry: FileEntry },
    /// Upload `entry` (from current) without prompting — push only.
    LocalNewerUpload { entry: FileEntry },
    /// Download `entry` (from remote) without prompting — fetch only.
    RemoteNewerDownload { entry: FileEntry },
    /// Content differs on both sides since the last agreed sync point.
    Conflict {
        current: Option<FileEntry>,
        last_local: Option<FileEntry>,
        remote: Option<FileEntry>,
    },
    /// `from` is the entry at the path already holding the matching content;
    /// `to` is the entry at the new path that should end up with it. On
    /// push `from` is remote-only and the action is a remote-move
    /// (`from.path -> to.path`); on fetch `from` is current-only and the
    /// action is a local move (`from.path -> to.path`).
    RenameCandidate { from: FileEntry, to: FileEntry },
    /// Like `RenameCandidate`, but `from`'s path also still exists on the
    /// side `to` belongs to, so the content should be duplicated rather
    /// than moved (remote-copy on push, local copy on fetch).
    CopyCandidate { from: FileEntry, to: FileEntry },
    /// New local path with no remote counterpart and no hash match: upload — push only.
    PureUpload { entry: FileEntry },
    /// New remote path with no local counterpart and no hash match: download — fetch only.
    PureDownload { entry: FileEntry },
    /// A path that disappeared from the side being synced from: on push,
    /// present in remote but not current (informational; remote is never
    /// auto-pruned). On fetch, present in current but not remote (the
    /// remote's current state no longer has it; offered for local deletion).
    LocallyDeleted { entry: FileEntry },
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub unchanged: Vec<Action>,
    pub auto_transfer: Vec<Action>,
    pub conflicts: Vec<Action>,
    pub renames: Vec<Action>,
    pub copies: Vec<Action>,
    pub pure_transfers: Vec<Action>,
    pub locally_deleted: Vec<Action>,
}

/// Classify every path across `current`, `last_local`, `remote`.
pub fn reconcile(
    current: &Manifest,
    last_local: &Manifest,
    remote: &Manifest,
    direction: Direction,
) -> Reconciliation {
    let mut out = Reconciliation::default();

    // Paths present on both sides: identical classification either way,
    // only the unattended-transfer action's shape depends on direction.
    for c in &current.entries {
        if let Some(r) = remote.get(&c.path) {
            if r.hash == c.hash && r.size == c.size {
                out.unchanged.push(Action::UnchangedHere { entry: r.clone() });
                continue;
            }
            let ll = last_local.get(&c.path);
            let remote_is_stale = match ll {
                Some(ll) => r.sync_time <= ll.sync_time,
                None => false,
            };
            if remote_is_stale {
                let action = match direction {
                    Direction::Push => Action::LocalNewerUpload { entry: c.clone() },
                    Direction::Fetch => Action::RemoteNewerDownload { entry: r.clone() },
                };
                out.auto_transfer.push(action);
            } else {
                out.conflicts.push(Action::Conflict {
                    current: Some(c.clone()),
                    last_local: ll.cloned(),
                    remote: Some(r.clone()),
                });
            }
        }
    }

    // The side that gained paths relative to the other: current-minus-remote
    // on push, remote-minus-current on fetch. Each new path is checked
    // against the *other* side for a hash match before falling back to a
    // plain transfer.
    let (new_side, other_side) = match direction {
        Direction::Push => (current, remote),
        Direction::Fetch => (remote, current),
    };

    for n in &new_side.entries {
        if other_side.get(&n.path).is_some() {
            continue; // handled by the common-path loop above
        }
        if n.hash != EMPTY_HASH {
            if let Some(matched) = other_side.first_with_hash(&n.hash) {
                if !new_side.contains_path(&matched.path) {
                    out.renames.push(Action::RenameCandidate {
                        from: matched.clone(),
                        to: n.clone(),
                    });
                } else {
                    out.copies.push(Action::CopyCandidate {
                        from: matched.clone(),
                        to: n.clone(),
                    });
                }
                continue;
            }
        }
        let action = match direction {
            Direction::Push => Action::PureUpload { entry: n.clone() },
            Direction::Fetch => Action::PureDownload { entry: n.clone() },
        };
        out.pure_transfers.push(action);
    }

    // The side that lost paths relative to the other: remote-minus-current
    // on push (informational), current-minus-remote on fetch (a genuine
    // local-deletion candidate).
    let (deleted_from, deleted_against) = match direction {
        Direction::Push => (remote, current),
        Direction::Fetch => (current, remote),
    };
    for d in &deleted_from.entries {
        if deleted_against.get(&d.path).is_none() {
            out.locally_deleted
                .push(Action::LocallyDeleted { entry: d.clone() });
        }
    }

    out
}
