//! External interfaces: the object-store and dump/restore
//! capability sets the core depends on, plus one real implementation of
//! each backed by the local filesystem — sufficient for tests and for
//! single-machine dry runs. Production drivers (aliyun OSS, mysqldump, …)
//! are out of scope; they would be further implementors of these same
//! traits, loaded by name from configuration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Six synchronous operations against a remote bucket. Remote
/// paths are rooted at `/`; a driver joins them to its bucket.
pub trait ObjectStore {
    fn download_abs(&self, remote_path: &str, local_path: &Path) -> Result<PathBuf>;
    fn download_rel(&self, remote_path: &str, relative_path: &str) -> Result<PathBuf>;
    fn upload_abs(&self, local_path: &Path, remote_path: &str) -> Result<()>;
    fn upload_rel(&self, relative_path: &str, remote_path: &str) -> Result<()>;
    /// Modeled as remove(dst) + copy(src -> dst): the source is preserved on
    /// the remote so a wrong rename guess cannot lose data.
    fn remote_move(&self, src: &str, dst: &str) -> Result<()>;
    fn remote_copy(&self, src: &str, dst: &str) -> Result<()>;
}

/// Two opaque operations against a database.
pub trait DumpRestore {
    /// Write a dump file at `path`; must be byte-deterministic for identical
    /// database state.
    fn dump(&self, path: &Path) -> Result<()>;
    /// Drop the target database and re-create it from the dump at `path`.
    fn import(&self, path: &Path) -> Result<()>;
}

/// An `ObjectStore` backed by a second local directory standing in for the
/// bucket. `dest_root` is the configured sync destination used to resolve
/// the "-rel" operations.
pub struct LocalDirStore {
    pub bucket_root: PathBuf,
    pub dest_root: PathBuf,
}

impl LocalDirStore {
    pub fn new(bucket_root: impl Into<PathBuf>, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            bucket_root: bucket_root.into(),
            dest_root: dest_root.into(),
        }
    }

    fn bucket_path(&self, remote_path: &str) -> PathBuf {
        self.bucket_root.join(remote_path.trim_start_matches('/'))
    }

    fn dest_path(&self, relative_path: &str) -> PathBuf {
        self.dest_root.join(relative_path.trim_start_matches('/'))
    }

    fn copy_file(src: &Path, dst: &Path) -> Result<()> {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::copy(src, dst)
            .with_context(|| format!("copy {} -> {}", src.display(), dst.display()))?;
        Ok(())
    }
}

impl ObjectStore for LocalDirStore {
    fn download_abs(&self, remote_path: &str, local_path: &Path) -> Result<PathBuf> {
        let src = self.bucket_path(remote_path);
        if local_path.exists() {
            fs::remove_file(local_path).ok();
        }
        Self::copy_file(&src, local_path)?;
        Ok(local_path.to_path_buf())
    }

    fn download_rel(&self, remote_path: &str, relative_path: &str) -> Result<PathBuf> {
        let local_path = self.dest_path(relative_path);
        self.download_abs(remote_path, &local_path)
    }

    fn upload_abs(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let dst = self.bucket_path(remote_path);
        if dst.exists() {
            fs::remove_file(&dst).ok();
        }
        Self::copy_file(local_path, &dst)
    }

    fn upload_rel(&self, relative_path: &str, remote_path: &str) -> Result<()> {
        let local_path = self.dest_path(relative_path);
        self.upload_abs(&local_path, remote_path)
    }

    fn remote_move(&self, src: &str, dst: &str) -> Result<()> {
        self.remote_copy(src, dst)
    }

    fn remote_copy(&self, src: &str, dst: &str) -> Result<()> {
        let src_path = self.bucket_path(src);
        let dst_path = self.bucket_path(dst);
        if dst_path.exists() {
            fs::remove_file(&dst_path).ok();
        }
        Self::copy_file(&src_path, &dst_path)
    }
}

/// A `DumpRestore` standing in for a live database with a single file: dump
/// copies the stand-in out, import copies a dump back over it.
pub struct FileBackedDump {
    pub db_file: PathBuf,
}

impl FileBackedDump {
    pub fn new(db_file: impl Into<PathBuf>) -> Self {
        Self {
            db_file: db_file.into(),
        }
    }
}

impl DumpRestore for FileBackedDump {
    fn dump(&self, path: &Path) -> Result<()> {
        if !self.db_file.exists() {
            anyhow::bail!("no database state at {}", self.db_file.display());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::copy(&self.db_file, path)
            .with_context(|| format!("dump {} -> {}", self.db_file.display(), path.display()))?;
        Ok(())
    }

    fn import(&self, path: &Path) -> Result<()> {
        if let Some(parent) = self.db_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::copy(path, &self.db_file)
            .with_context(|| format!("import {} -> {}", path.display(), self.db_file.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_then_download_round_trips_content() {
        let bucket = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(bucket.path(), dest.path());

        let local_file = dest.path().join("a.txt");
        fs::write(&local_file, b"hello").unwrap();
        store.upload_rel("/a.txt", "/a.txt").unwrap();

        let downloaded = dest.path().join("b.txt");
        store.download_abs("/a.txt", &downloaded).unwrap();
        assert_eq!(fs::read(&downloaded).unwrap(), b"hello");
    }

    #[test]
    fn remote_move_preserves_source() {
        let bucket = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(bucket.path(), dest.path());

        fs::write(bucket.path().join("old.txt"), b"content").unwrap();
        store.remote_move("/old.txt", "/new.txt").unwrap();

        assert!(bucket.path().join("old.txt").exists());
        assert!(bucket.path().join("new.txt").exists());
    }

    #[test]
    fn dump_then_import_round_trips() {
        let db = tempfile::tempdir().unwrap();
        let db_file = db.path().join("db.bin");
        fs::write(&db_file, b"rows").unwrap();
        let driver = FileBackedDump::new(&db_file);

        let dump_path = db.path().join("db.sql");
        driver.dump(&dump_path).unwrap();
        fs::write(&dump_path, b"rows-modified").unwrap();
        driver.import(&dump_path).unwrap();

        assert_eq!(fs::read(&db_file).unwrap(), b"rows-modified");
    }
}
