//! Manifest codec: tab-separated rows for the tree variant
//! (5 columns) and the blob variant (4 columns, no path, no trailing newline).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::MalformedManifest;

/// One row of a tree manifest: a single file's fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub hash: String,
    pub size: i64,
    pub mtime: f64,
    pub sync_time: f64,
    pub path: String,
}

/// The single synthetic row of a blob manifest: a dumped database's fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobManifest {
    pub hash: String,
    pub size: i64,
    pub mtime: f64,
    pub sync_time: f64,
}

/// An ordered set of `FileEntry` rows. Order is insertion order from the walk;
/// equality for reconciliation purposes is the `(path, hash, size)` triple.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub entries: Vec<FileEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: FileEntry) {
        self.entries.push(entry);
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// First entry (in manifest order) with the given hash, per spec's
    /// tie-break rule for ambiguous rename/copy matches.
    pub fn first_with_hash(&self, hash: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.hash == hash)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\n",
                e.hash, e.size, e.mtime, e.sync_time, e.path
            ));
        }
        out
    }

    pub fn parse_tsv(path: &Path, data: &str) -> Result<Self> {
        let mut out = Manifest::new();
        for line in data.lines() {
            if line.is_empty() {
                continue;
            }
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() != 5 {
                return Err(MalformedManifest {
                    path: path.to_path_buf(),
                    detail: format!("expected 5 columns, found {}", cols.len()),
                }
                .into());
            }
            let size: i64 = cols[1].parse().map_err(|_| MalformedManifest {
                path: path.to_path_buf(),
                detail: format!("invalid size {:?}", cols[1]),
            })?;
            let mtime: f64 = cols[2].parse().map_err(|_| MalformedManifest {
                path: path.to_path_buf(),
                detail: format!("invalid mtime {:?}", cols[2]),
            })?;
            let sync_time: f64 = cols[3].parse().map_err(|_| MalformedManifest {
                path: path.to_path_buf(),
                detail: format!("invalid sync_time {:?}", cols[3]),
            })?;
            out.push(FileEntry {
                hash: cols[0].to_string(),
                size,
                mtime,
                sync_time,
                path: cols[4].to_string(),
            });
        }
        Ok(out)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Manifest::new());
        }
        let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::parse_tsv(path, &data)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.to_tsv().as_bytes())
    }
}

impl BlobManifest {
    pub fn to_tsv(&self) -> String {
        format!(
            "{}\t{}\t{:.3}\t{:.3}",
            self.hash, self.size, self.mtime, self.sync_time
        )
    }

    pub fn parse_tsv(path: &Path, data: &str) -> Result<Self> {
        let cleaned = data.replace('\r', "").replace('\n', "");
        let cols: Vec<&str> = cleaned.split('\t').collect();
        if cols.len() != 4 {
            return Err(MalformedManifest {
                path: path.to_path_buf(),
                detail: format!("expected 4 columns, found {}", cols.len()),
            }
            .into());
        }
        let size: i64 = cols[1].parse().map_err(|_| MalformedManifest {
            path: path.to_path_buf(),
            detail: format!("invalid size {:?}", cols[1]),
        })?;
        let mtime: f64 = cols[2].parse().map_err(|_| MalformedManifest {
            path: path.to_path_buf(),
            detail: format!("invalid mtime {:?}", cols[2]),
        })?;
        let sync_time: f64 = cols[3].parse().map_err(|_| MalformedManifest {
            path: path.to_path_buf(),
            detail: format!("invalid sync_time {:?}", cols[3]),
        })?;
        Ok(BlobManifest {
            hash: cols[0].to_string(),
            size,
            mtime,
            sync_time,
        })
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        if data.trim().is_empty() {
            return Ok(None);
        }
        Self::parse_tsv(path, &data).map(Some)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.to_tsv().as_bytes())
    }
}

/// Write `data` to a temp file beside `path` and rename it into place, so a
/// crash mid-write never leaves a half-written manifest.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let tmp = parent.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("manifest"),
        uuid::Uuid::new_v4()
    ));
    fs::write(&tmp, data).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_rows() {
        let mut m = Manifest::new();
        m.push(FileEntry {
            hash: "abc123".into(),
            size: 42,
            mtime: 100.5,
            sync_time: 200.25,
            path: "/alice/a.txt".into(),
        });
        let tsv = m.to_tsv();
        let parsed = Manifest::parse_tsv(Path::new("x"), &tsv).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn rejects_wrong_column_count() {
        let err = Manifest::parse_tsv(Path::new("x"), "a\tb\tc\n").unwrap_err();
        assert!(err.downcast_ref::<MalformedManifest>().is_some());
    }

    #[test]
    fn blob_manifest_round_trips_with_three_decimal_times() {
        let b = BlobManifest {
            hash: "deadbeef".into(),
            size: 7,
            mtime: 100.0,
            sync_time: 200.123456,
        };
        let tsv = b.to_tsv();
        assert_eq!(tsv, "deadbeef\t7\t100.000\t200.123");
        let parsed = BlobManifest::parse_tsv(Path::new("x"), &tsv).unwrap();
        assert_eq!(parsed.hash, b.hash);
        assert_eq!(parsed.size, b.size);
    }

    #[test]
    fn blob_manifest_tolerates_crlf() {
        let parsed = BlobManifest::parse_tsv(Path::new("x"), "h\t1\t2.000\t3.000\r\n").unwrap();
        assert_eq!(parsed.hash, "h");
        assert_eq!(parsed.size, 1);
    }

    #[test]
    fn blob_manifest_rejects_wrong_column_count() {
        let err = BlobManifest::parse_tsv(Path::new("x"), "h\t1\t2.000").unwrap_err();
        assert!(err.downcast_ref::<MalformedManifest>().is_some());
    }

    #[test]
    fn load_missing_tree_manifest_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let m = Manifest::load(&dir.path().join("nope")).unwrap();
        assert!(m.entries.is_empty());
    }

    #[test]
    fn save_then_load_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filesystem.current");
        let mut m = Manifest::new();
        m.push(FileEntry {
            hash: "h1".into(),
            size: 1,
            mtime: 1.0,
            sync_time: 2.0,
            path: "/a".into(),
        });
        m.save(&path).unwrap();
        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded, m);
    }
}
