//! Local indexer: walks a sync root, honors `.ignore` markers,
//! and produces the *current* manifest, reusing fingerprints from the
//! previous *last-local* manifest when `(mtime, size)` are unchanged.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

use crate::hash;
use crate::manifest::{FileEntry, Manifest};

pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn to_rel_slash(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("strip prefix {}", path.display()))?;
    let mut out = String::from("/");
    for (i, comp) in rel.components().enumerate() {
        if i > 0 {
            out.push('/');
        }
        out.push_str(&comp.as_os_str().to_string_lossy());
    }
    if out.contains('\t') || out.contains('\n') {
        bail!("path {:?} contains a tab or newline", out);
    }
    Ok(out)
}

/// True if `candidate` is equal to, or a descendant of, `prefix`, judged on
/// path-component boundaries rather than raw string prefix — unlike the
/// original, which would wrongly treat `/private` as inside an ignored `/priv`.
fn is_under(candidate: &str, prefix: &str) -> bool {
    if candidate == prefix {
        return true;
    }
    let prefixed = if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    };
    candidate.starts_with(&prefixed)
}

/// Walk `root`, reusing `(hash, sync_time)` from `last_local` when a file's
/// `(mtime, size)` are unchanged, and return the freshly built manifest.
pub fn build_current(root: &Path, last_local: &Manifest) -> Result<Manifest> {
    let mut ignored_prefixes: Vec<String> = Vec::new();
    let mut out = Manifest::new();

    // A `.ignore` directly at the sync root excludes the whole tree under
    // the empty-string prefix, same as a `.ignore` in any subdirectory.
    if root.join(".ignore").is_file() {
        ignored_prefixes.push(String::new());
    }

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path == root {
            continue;
        }

        if entry.file_type().is_dir() {
            let rel = to_rel_slash(root, path)?;
            if ignored_prefixes.iter().any(|p| is_under(&rel, p)) {
                continue;
            }
            if path.join(".ignore").is_file() {
                ignored_prefixes.push(rel);
            }
            continue;
        }

        if entry.file_type().is_symlink() {
            // Follow only if the target is a regular file inside `root`; skip
            // otherwise rather than guess.
            let target = match std::fs::canonicalize(path) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if !target.starts_with(root) || !target.is_file() {
                continue;
            }
        }

        let rel = to_rel_slash(root, path)?;
        let parent_rel = rel.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
        if ignored_prefixes.iter().any(|p| is_under(parent_rel, p)) {
            continue;
        }

        if path.file_name().map(|n| n == ".ignore").unwrap_or(false) {
            // Recorded as a synthetic marker entry below, not as a plain file.
            continue;
        }

        // Use a following stat even for the symlink case above: walkdir's own
        // `entry.metadata()` reports the link's own metadata when
        // `follow_links(false)`, which would record the link's size/mtime
        // rather than the target regular file's.
        let meta = std::fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
        let size = meta.len() as i64;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let (file_hash, sync_time) = match last_local.get(&rel) {
            Some(prev) if prev.mtime == mtime && prev.size == size => {
                (prev.hash.clone(), prev.sync_time)
            }
            _ => (hash::hash_file(path)?, now_secs()),
        };

        out.push(FileEntry {
            hash: file_hash,
            size,
            mtime,
            sync_time,
            path: rel,
        });
    }

    for prefix in &ignored_prefixes {
        let marker_path = format!("{prefix}/.ignore");
        let sync_time = last_local
            .get(&marker_path)
            .map(|e| e.sync_time)
            .unwrap_or_else(now_secs);
        out.push(FileEntry {
            hash: hash::EMPTY_HASH.to_string(),
            size: 0,
            mtime: 0.0,
            sync_time,
            path: marker_path,
        });
    }

    Ok(out)
}

pub fn current_manifest_path(conf_dir: &Path) -> PathBuf {
    conf_dir.join("filesystem.current")
}

pub fn last_local_manifest_path(conf_dir: &Path) -> PathBuf {
    conf_dir.join("filesystem.last-local")
}

pub fn remote_manifest_path(conf_dir: &Path) -> PathBuf {
    conf_dir.join("filesystem.remote")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path, contents: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn indexes_plain_files_with_leading_slash_paths() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.txt"), b"hello");
        let m = build_current(dir.path(), &Manifest::new()).unwrap();
        assert_eq!(m.entries.len(), 1);
        assert_eq!(m.entries[0].path, "/a.txt");
    }

    #[test]
    fn ignore_marker_excludes_subtree_and_emits_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("secret/.ignore"), b"");
        touch(&dir.path().join("secret/data.bin"), b"shh");
        touch(&dir.path().join("public.txt"), b"hi");

        let m = build_current(dir.path(), &Manifest::new()).unwrap();
        let paths: Vec<&str> = m.entries.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"/public.txt"));
        assert!(paths.contains(&"/secret/.ignore"));
        assert!(!paths.contains(&"/secret/data.bin"));

        let marker = m.get("/secret/.ignore").unwrap();
        assert_eq!(marker.hash, hash::EMPTY_HASH);
        assert_eq!(marker.size, 0);
        assert_eq!(marker.mtime, 0.0);
    }

    #[test]
    fn similarly_named_sibling_directory_is_not_caught_by_ignore_prefix() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("priv/.ignore"), b"");
        touch(&dir.path().join("priv/x.txt"), b"a");
        touch(&dir.path().join("private/y.txt"), b"b");

        let m = build_current(dir.path(), &Manifest::new()).unwrap();
        let paths: Vec<&str> = m.entries.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"/private/y.txt"));
        assert!(!paths.contains(&"/priv/x.txt"));
    }

    #[test]
    fn nested_ignore_inside_already_ignored_subtree_is_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a/.ignore"), b"");
        touch(&dir.path().join("a/b/.ignore"), b"");
        touch(&dir.path().join("a/b/c.txt"), b"x");

        let m = build_current(dir.path(), &Manifest::new()).unwrap();
        let paths: Vec<&str> = m.entries.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"/a/.ignore"));
        assert!(!paths.iter().any(|p| p.starts_with("/a/b")));
    }

    #[test]
    fn unchanged_mtime_and_size_reuse_hash_and_sync_time_from_last_local() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        touch(&file, b"hello");

        let first = build_current(dir.path(), &Manifest::new()).unwrap();
        let first_entry = first.get("/a.txt").unwrap().clone();

        let second = build_current(dir.path(), &first).unwrap();
        let second_entry = second.get("/a.txt").unwrap();
        assert_eq!(second_entry.hash, first_entry.hash);
        assert_eq!(second_entry.sync_time, first_entry.sync_time);
    }

    #[test]
    fn ignore_at_sync_root_excludes_the_entire_tree() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join(".ignore"), b"");
        touch(&dir.path().join("a.txt"), b"hello");
        touch(&dir.path().join("sub/b.txt"), b"world");

        let m = build_current(dir.path(), &Manifest::new()).unwrap();
        let paths: Vec<&str> = m.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/.ignore"]);

        let marker = m.get("/.ignore").unwrap();
        assert_eq!(marker.hash, hash::EMPTY_HASH);
    }

    #[test]
    fn reindexing_unchanged_tree_is_byte_identical_under_the_codec() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.txt"), b"hello");
        touch(&dir.path().join("sub/b.txt"), b"world");

        let first = build_current(dir.path(), &Manifest::new()).unwrap();
        let second = build_current(dir.path(), &first).unwrap();
        assert_eq!(first.to_tsv(), second.to_tsv());
    }
}
