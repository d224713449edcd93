//! Interactive resolver: presents each non-empty bucket as a
//! checkbox list with a sensible default and returns a parallel boolean
//! vector of decisions. The resolver is the only place a command blocks on
//! a human; it holds no state across rows.

use anyhow::Result;
use dialoguer::MultiSelect;

use crate::reconcile::Action;

/// Default selection state: upload-conflicts default off,
/// rename/copy candidates default on.
pub fn default_for(action: &Action) -> bool {
    match action {
        Action::Conflict { .. } => false,
        Action::RenameCandidate { .. } | Action::CopyCandidate { .. } => true,
        Action::LocallyDeleted { .. } => false,
        _ => true,
    }
}

fn label_for(action: &Action) -> String {
    match action {
        Action::Conflict { current, remote, .. } => {
            let path = current
                .as_ref()
                .or(remote.as_ref())
                .map(|e| e.path.as_str())
                .unwrap_or("?");
            format!("conflict: {path}")
        }
        Action::RenameCandidate { from, to } => format!("rename: {} -> {}", from.path, to.path),
        Action::CopyCandidate { from, to } => format!("copy: {} -> {}", from.path, to.path),
        Action::LocallyDeleted { entry } => format!("delete locally: {}", entry.path),
        Action::LocalNewerUpload { entry } => format!("upload: {}", entry.path),
        Action::RemoteNewerDownload { entry } => format!("download: {}", entry.path),
        Action::PureUpload { entry } => format!("upload: {}", entry.path),
        Action::PureDownload { entry } => format!("download: {}", entry.path),
        Action::UnchangedHere { entry } => entry.path.clone(),
    }
}

/// Prompt the user over `actions` (all drawn from the same bucket) and
/// return one bool per action, in the same order. When `non_interactive` is
/// true (the `-y`/`--yes` flag), every row's default is accepted without
/// prompting — the idiomatic analogue of the original's `required_args =
/// ['y']` convention for scripted use.
pub fn resolve(title: &str, actions: &[Action], non_interactive: bool) -> Result<Vec<bool>> {
    if actions.is_empty() {
        return Ok(Vec::new());
    }
    if non_interactive {
        return Ok(actions.iter().map(default_for).collect());
    }

    let labels: Vec<String> = actions.iter().map(label_for).collect();
    let defaults: Vec<bool> = actions.iter().map(default_for).collect();

    let selected = MultiSelect::new()
        .with_prompt(title)
        .items(&labels)
        .defaults(&defaults)
        .interact()?;

    let mut out = vec![false; actions.len()];
    for idx in selected {
        out[idx] = true;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FileEntry;

    fn entry(path: &str) -> FileEntry {
        FileEntry {
            hash: "h".into(),
            size: 0,
            mtime: 0.0,
            sync_time: 0.0,
            path: path.into(),
        }
    }

    #[test]
    fn conflict_defaults_off() {
        let a = Action::Conflict {
            current: Some(entry("/a")),
            last_local: None,
            remote: Some(entry("/a")),
        };
        assert!(!default_for(&a));
    }

    #[test]
    fn rename_and_copy_default_on() {
        let rename = Action::RenameCandidate {
            from: entry("/a"),
            to: entry("/b"),
        };
        let copy = Action::CopyCandidate {
            from: entry("/a"),
            to: entry("/b"),
        };
        assert!(default_for(&rename));
        assert!(default_for(&copy));
    }

    #[test]
    fn locally_deleted_defaults_off() {
        let a = Action::LocallyDeleted { entry: entry("/a") };
        assert!(!default_for(&a));
    }

    #[test]
    fn non_interactive_mode_accepts_defaults_without_prompting() {
        let actions = vec![
            Action::Conflict {
                current: Some(entry("/a")),
                last_local: None,
                remote: Some(entry("/a")),
            },
            Action::RenameCandidate {
                from: entry("/b"),
                to: entry("/c"),
            },
        ];
        let decisions = resolve("conflicts", &actions, true).unwrap();
        assert_eq!(decisions, vec![false, true]);
    }

    #[test]
    fn empty_bucket_short_circuits_without_prompting() {
        let decisions = resolve("nothing", &[], false).unwrap();
        assert!(decisions.is_empty());
    }
}
