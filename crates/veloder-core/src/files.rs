use std::fs::{self, File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, VeloderError};

/// Filename timestamp, e.g. `20250805_143012`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub fn ensure_directory(dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    create_dir_all(dir).map_err(|err| VeloderError::io(dir, err))
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_directory(parent),
        _ => Ok(()),
    }
}

/// Write `value` as pretty JSON, creating parent directories.
pub fn save_json<T: Serialize + ?Sized>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let payload = serde_json::to_vec_pretty(value).map_err(|err| VeloderError::json(path, err))?;
    let mut file = File::create(path).map_err(|err| VeloderError::io(path, err))?;
    file.write_all(&payload)
        .map_err(|err| VeloderError::io(path, err))?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|err| VeloderError::io(path, err))?;
    serde_json::from_str(&raw).map_err(|err| VeloderError::json(path, err))
}

pub fn save_text(content: &str, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    fs::write(path, content).map_err(|err| VeloderError::io(path, err))
}

pub fn timestamp_slug() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// `<dir>/<prefix>_<timestamp>.<ext>`, never an existing file.
pub fn timestamped_path(dir: impl AsRef<Path>, prefix: &str, ext: &str) -> PathBuf {
    unique_path(
        dir.as_ref()
            .join(format!("{prefix}_{}.{ext}", timestamp_slug())),
    )
}

/// Append `_1`, `_2`, ... to the file stem until the path is free.
pub fn unique_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

    (1..)
        .map(|idx| parent.join(format!("{stem}_{idx}{ext}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(path)
}

/// Paths written during a run, shared by the tools that write them.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl Artifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, path: impl Into<PathBuf>) {
        if let Ok(mut paths) = self.paths.lock() {
            paths.push(path.into());
        }
    }

    pub fn list(&self) -> Vec<PathBuf> {
        self.paths
            .lock()
            .map(|paths| paths.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    #[test]
    fn json_round_trip_preserves_object() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("nested/dir/events.json");
        let value = json!({
            "timestamp": "2025-08-05T10:00:00",
            "events": [{"name": "Ironman Brasil", "location": "Florianópolis, SC"}],
            "summary": {"total_events": 1, "locations": ["Florianópolis, SC"]}
        });

        save_json(&value, &path).unwrap();
        let loaded: Value = load_json(&path).unwrap();
        assert_eq!(loaded, value);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Florianópolis"), "non-ASCII must not be escaped");
    }

    #[test]
    fn load_json_reports_malformed_content() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();
        let err = load_json::<Value>(&path).unwrap_err();
        assert!(matches!(err, VeloderError::Json { .. }));
    }

    #[test]
    fn timestamped_paths_do_not_collide() {
        let temp = TempDir::new().expect("temp dir");
        let first = timestamped_path(temp.path(), "post", "html");
        save_text("<p>one</p>", &first).unwrap();
        let second = unique_path(first.clone());
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("_1.html"));
    }

    #[test]
    fn save_text_creates_parent_directories() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("output/post.md");
        save_text("# Título", &path).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "# Título");
    }

    #[test]
    fn artifacts_are_shared_between_clones() {
        let artifacts = Artifacts::new();
        let handle = artifacts.clone();
        handle.record("data/output/post/post_1.html");
        assert_eq!(
            artifacts.list(),
            vec![PathBuf::from("data/output/post/post_1.html")]
        );
    }
}
