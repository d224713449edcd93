//! Task configuration layout: resolves the
//! `<app>/conf/<task_name>/` directory a tree or blob task reads and writes
//! its manifests under, with file, env var, and CLI flag overrides —
//! precedence flag > env > file > default.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

const RESERVED_CHARS: &[char] = &['/', '\\', ':', '*', '?', '|', '<', '>', '"'];

/// Replace filesystem-reserved characters in a user-supplied task name with
/// `_`, matching the original's repeated inline sanitization in
/// `shared/oss.py::init` and `tasks/database.py::init`.
pub fn sanitize_task_name(name: &str) -> String {
    name.chars()
        .map(|c| if RESERVED_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

#[derive(Debug, Default, Deserialize, Clone)]
struct PartialConfig {
    #[serde(default)]
    app_root: Option<PathBuf>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub app_root: Option<PathBuf>,
}

pub fn default_app_root() -> PathBuf {
    home_dir().join(".driftsync")
}

pub fn default_config_path() -> PathBuf {
    home_dir().join(".driftsync").join("config.json")
}

/// `DRIFTSYNC_CONFIG_PATH` flag/env > default.
pub fn resolve_config_path(flag_path: Option<&Path>) -> PathBuf {
    if let Some(p) = flag_path {
        return absolutize_path(p);
    }
    if let Ok(env_path) = std::env::var("DRIFTSYNC_CONFIG_PATH") {
        let env_path = env_path.trim();
        if !env_path.is_empty() {
            return absolutize_path(Path::new(env_path));
        }
    }
    absolutize_path(&default_config_path())
}

fn load_partial(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        return Ok(PartialConfig::default());
    }
    let data = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parse config json {}", path.display()))
}

/// Resolve the app root directory: flag > `DRIFTSYNC_HOME` env > the
/// `app_root` key in the JSON config file at `config_path` > default.
pub fn resolve_app_root(config_path: &Path, overrides: &ConfigOverrides) -> Result<PathBuf> {
    if let Some(p) = &overrides.app_root {
        return Ok(absolutize_path(p));
    }
    if let Ok(env_root) = std::env::var("DRIFTSYNC_HOME") {
        let env_root = env_root.trim();
        if !env_root.is_empty() {
            return Ok(absolutize_path(Path::new(env_root)));
        }
    }
    let file_cfg = load_partial(config_path)?;
    if let Some(p) = file_cfg.app_root {
        return Ok(absolutize_path(&p));
    }
    Ok(absolutize_path(&default_app_root()))
}

/// The per-task conf directory under an app root. Creates it (and its
/// parents) if missing.
pub fn task_conf_dir(app_root: &Path, task_name: &str) -> Result<PathBuf> {
    let dir = app_root.join("conf").join(sanitize_task_name(task_name));
    std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn log_dir(app_root: &Path) -> PathBuf {
    app_root.join("logs")
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn absolutize_path(path: &Path) -> PathBuf {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    clean_lexical(&abs)
}

fn clean_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Path::new(&std::path::MAIN_SEPARATOR.to_string())),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(p) => out.push(p),
        }
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: once_cell::sync::Lazy<Mutex<()>> =
        once_cell::sync::Lazy::new(|| Mutex::new(()));

    #[test]
    fn sanitizes_reserved_characters() {
        assert_eq!(sanitize_task_name("a/b:c*d?e|f<g>h\"i\\j"), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn leaves_ordinary_names_untouched() {
        assert_eq!(sanitize_task_name("prod-backups"), "prod-backups");
    }

    #[test]
    fn app_root_flag_beats_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        let saved = env::var("DRIFTSYNC_HOME").ok();
        env::set_var("DRIFTSYNC_HOME", "/env/root");

        let overrides = ConfigOverrides {
            app_root: Some(PathBuf::from("/flag/root")),
        };
        let resolved = resolve_app_root(Path::new("/does/not/exist.json"), &overrides).unwrap();
        assert_eq!(resolved, PathBuf::from("/flag/root"));

        match saved {
            Some(v) => env::set_var("DRIFTSYNC_HOME", v),
            None => env::remove_var("DRIFTSYNC_HOME"),
        }
    }

    #[test]
    fn app_root_env_beats_file() {
        let _lock = ENV_LOCK.lock().unwrap();
        let saved = env::var("DRIFTSYNC_HOME").ok();
        env::set_var("DRIFTSYNC_HOME", "/env/root");

        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.json");
        std::fs::write(&config_path, r#"{"app_root":"/file/root"}"#).unwrap();

        let resolved = resolve_app_root(&config_path, &ConfigOverrides::default()).unwrap();
        assert_eq!(resolved, PathBuf::from("/env/root"));

        match saved {
            Some(v) => env::set_var("DRIFTSYNC_HOME", v),
            None => env::remove_var("DRIFTSYNC_HOME"),
        }
    }

    #[test]
    fn app_root_file_beats_default_when_no_flag_or_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        let saved = env::var("DRIFTSYNC_HOME").ok();
        env::remove_var("DRIFTSYNC_HOME");

        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.json");
        std::fs::write(&config_path, r#"{"app_root":"/file/root"}"#).unwrap();

        let resolved = resolve_app_root(&config_path, &ConfigOverrides::default()).unwrap();
        assert_eq!(resolved, PathBuf::from("/file/root"));

        match saved {
            Some(v) => env::set_var("DRIFTSYNC_HOME", v),
            None => env::remove_var("DRIFTSYNC_HOME"),
        }
    }

    #[test]
    fn task_conf_dir_nests_under_conf_and_sanitizes() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = task_conf_dir(tmp.path(), "weird/name:here").unwrap();
        assert_eq!(dir, tmp.path().join("conf").join("weird_name_here"));
        assert!(dir.exists());
    }
}
