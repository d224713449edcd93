//! Database-dump sync variant: the same three-way logic as the
//! tree task, applied to a single synthetic row backed by a dump file
//! rather than a directory tree.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::error::{DumpFailed, RemoteEmpty, UserCancelled};
use crate::hash;
use crate::indexer::now_secs;
use crate::manifest::BlobManifest;
use crate::providers::{DumpRestore, ObjectStore};

/// The on-disk and remote-key layout for one database task.
pub struct BlobPaths {
    pub conf_dir: PathBuf,
    pub dbname: String,
}

impl BlobPaths {
    pub fn new(conf_dir: impl Into<PathBuf>, dbname: impl Into<String>) -> Self {
        Self {
            conf_dir: conf_dir.into(),
            dbname: dbname.into(),
        }
    }

    pub fn dump_path(&self) -> PathBuf {
        self.conf_dir.join("database.sql")
    }

    pub fn backup_path(&self) -> PathBuf {
        self.conf_dir.join("database.backup.sql")
    }

    pub fn current_path(&self) -> PathBuf {
        self.conf_dir.join("database.current")
    }

    pub fn last_local_path(&self) -> PathBuf {
        self.conf_dir.join("database.last-local")
    }

    pub fn remote_manifest_path(&self) -> PathBuf {
        self.conf_dir.join("database.remote")
    }

    pub fn remote_manifest_key(&self) -> String {
        format!("/database.{}.checksum.tsv", self.dbname)
    }

    pub fn remote_dump_key(&self) -> String {
        format!("/database.{}.sql", self.dbname)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobOutcome {
    InitialCommit,
    NoChange,
    AutoUploaded,
    AutoDownloaded,
    ConflictUploaded,
    ConflictDownloaded,
    ConflictKept,
}

fn dump_and_hash(dump: &dyn DumpRestore, path: &Path) -> Result<BlobManifest> {
    dump.dump(path)?;
    if !path.exists() {
        return Err(DumpFailed {
            path: path.to_path_buf(),
        }
        .into());
    }
    let meta = path.metadata()?;
    let current_hash = hash::hash_file(path)?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Ok(BlobManifest {
        hash: current_hash,
        size: meta.len() as i64,
        mtime,
        sync_time: now_secs(),
    })
}

fn download_remote_manifest(
    store: &dyn ObjectStore,
    paths: &BlobPaths,
) -> Result<Option<BlobManifest>> {
    let local = paths.remote_manifest_path();
    let _ = std::fs::remove_file(&local);
    if store
        .download_abs(&paths.remote_manifest_key(), &local)
        .is_err()
    {
        return Ok(None);
    }
    BlobManifest::load(&local)
}

/// Push the current database state. `confirm` is called only when a genuine
/// conflict is detected, with `(current, last_local, remote)` — the
/// last-pushed triplet shown to the user uses the real *last-local* row, not
/// the *current* row relabeled.
pub fn push(
    store: &dyn ObjectStore,
    dump: &dyn DumpRestore,
    paths: &BlobPaths,
    confirm: impl FnOnce(&BlobManifest, Option<&BlobManifest>, &BlobManifest) -> bool,
) -> Result<BlobOutcome> {
    let result = push_inner(store, dump, paths, confirm);
    // The dump file is a scratch artifact, not part of the durable state;
    // drop it once the operation (whichever branch it took) is done.
    let _ = std::fs::remove_file(paths.dump_path());
    result
}

fn push_inner(
    store: &dyn ObjectStore,
    dump: &dyn DumpRestore,
    paths: &BlobPaths,
    confirm: impl FnOnce(&BlobManifest, Option<&BlobManifest>, &BlobManifest) -> bool,
) -> Result<BlobOutcome> {
    let current = dump_and_hash(dump, &paths.dump_path())?;
    current.save(&paths.current_path())?;

    let last_local = BlobManifest::load(&paths.last_local_path())?;
    let remote = download_remote_manifest(store, paths)?;

    let Some(remote) = remote else {
        // RemoteEmpty is normal for push: treat as the initial commit.
        store.upload_abs(&paths.dump_path(), &paths.remote_dump_key())?;
        current.save(&paths.remote_manifest_path())?;
        store.upload_abs(&paths.remote_manifest_path(), &paths.remote_manifest_key())?;
        current.save(&paths.last_local_path())?;
        return Ok(BlobOutcome::InitialCommit);
    };

    if current.hash == remote.hash {
        // Identical to remote: nothing to reconcile, last-local is left
        // exactly as it was (it already reflects the agreed state).
        return Ok(BlobOutcome::NoChange);
    }

    let remote_is_stale = match &last_local {
        Some(ll) => remote.sync_time <= ll.sync_time,
        None => false,
    };

    if remote_is_stale {
        store.upload_abs(&paths.dump_path(), &paths.remote_dump_key())?;
        current.save(&paths.remote_manifest_path())?;
        store.upload_abs(&paths.remote_manifest_path(), &paths.remote_manifest_key())?;
        current.save(&paths.last_local_path())?;
        return Ok(BlobOutcome::AutoUploaded);
    }

    if confirm(&current, last_local.as_ref(), &remote) {
        store.upload_abs(&paths.dump_path(), &paths.remote_dump_key())?;
        current.save(&paths.remote_manifest_path())?;
        store.upload_abs(&paths.remote_manifest_path(), &paths.remote_manifest_key())?;
        current.save(&paths.last_local_path())?;
        Ok(BlobOutcome::ConflictUploaded)
    } else {
        Err(UserCancelled.into())
    }
}

/// Fetch the remote database state. Symmetric with [`push`], with one
/// extra step before importing: the current dump is copied aside as
/// `*.backup.sql` — dump local, THEN back up, THEN download, THEN import,
/// so a failed download never leaves the operator without a recent local copy.
pub fn fetch(
    store: &dyn ObjectStore,
    dump: &dyn DumpRestore,
    paths: &BlobPaths,
    confirm: impl FnOnce(&BlobManifest, Option<&BlobManifest>, &BlobManifest) -> bool,
) -> Result<BlobOutcome> {
    let result = fetch_inner(store, dump, paths, confirm);
    let _ = std::fs::remove_file(paths.dump_path());
    result
}

fn fetch_inner(
    store: &dyn ObjectStore,
    dump: &dyn DumpRestore,
    paths: &BlobPaths,
    confirm: impl FnOnce(&BlobManifest, Option<&BlobManifest>, &BlobManifest) -> bool,
) -> Result<BlobOutcome> {
    let current = dump_and_hash(dump, &paths.dump_path())?;
    current.save(&paths.current_path())?;

    let last_local = BlobManifest::load(&paths.last_local_path())?;
    let remote = download_remote_manifest(store, paths)?
        .ok_or(RemoteEmpty)?;

    if current.hash == remote.hash {
        remote.save(&paths.last_local_path())?;
        return Ok(BlobOutcome::NoChange);
    }

    let remote_is_stale = match &last_local {
        Some(ll) => remote.sync_time <= ll.sync_time,
        None => false,
    };

    if remote_is_stale {
        // Remote hasn't changed since our last sync: download unattended.
        std::fs::copy(&paths.dump_path(), &paths.backup_path())?;
        store.download_abs(&paths.remote_dump_key(), &paths.dump_path())?;
        dump.import(&paths.dump_path())?;
        remote.save(&paths.last_local_path())?;
        return Ok(BlobOutcome::AutoDownloaded);
    }

    if confirm(&current, last_local.as_ref(), &remote) {
        std::fs::copy(&paths.dump_path(), &paths.backup_path())?;
        store.download_abs(&paths.remote_dump_key(), &paths.dump_path())?;
        dump.import(&paths.dump_path())?;
        remote.save(&paths.last_local_path())?;
        Ok(BlobOutcome::ConflictDownloaded)
    } else {
        // Cancelled: last-local is left exactly as it was, matching the
        // original's no-op on "Operation cancelled."
        Ok(BlobOutcome::ConflictKept)
    }
}

#[derive(Debug, Clone)]
pub struct BlobDiff {
    pub current: BlobManifest,
    pub last_local: Option<BlobManifest>,
    pub remote: Option<BlobManifest>,
    pub in_sync: bool,
}

/// Compare local, last-local, and remote without performing any transfer.
pub fn diff(store: &dyn ObjectStore, dump: &dyn DumpRestore, paths: &BlobPaths) -> Result<BlobDiff> {
    let result = diff_inner(store, dump, paths);
    let _ = std::fs::remove_file(paths.dump_path());
    result
}

fn diff_inner(store: &dyn ObjectStore, dump: &dyn DumpRestore, paths: &BlobPaths) -> Result<BlobDiff> {
    let current = dump_and_hash(dump, &paths.dump_path())?;
    current.save(&paths.current_path())?;
    let last_local = BlobManifest::load(&paths.last_local_path())?;
    let remote = download_remote_manifest(store, paths)?;
    let in_sync = remote.as_ref().map(|r| r.hash == current.hash).unwrap_or(false);
    Ok(BlobDiff {
        current,
        last_local,
        remote,
        in_sync,
    })
}
