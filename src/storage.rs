//! YAML-file keyed persistence.
//!
//! One entity per `<dir>/<key>.yaml`. Writes go to a temporary sibling file
//! that is renamed into place, so a reader never observes a partial entity.
//! Corrupt files are logged and left out of listings.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Errors from the YAML store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("I/O error at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("failed to encode '{key}': {reason}")]
    Encode { key: String, reason: String },

    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
}

/// An entity with a stable storage key.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Keyed store of YAML documents in one directory.
#[derive(Debug)]
pub struct YamlStore<T> {
    dir: PathBuf,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for YamlStore<T> {
    fn clone(&self) -> Self {
        Self {
            dir: self.dir.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T> YamlStore<T>
where
    T: Keyed + Serialize + DeserializeOwned,
{
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            _entity: PhantomData,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for `key`, after validating it cannot escape the directory.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.yaml")))
    }

    pub fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.path_for(key)?.is_file())
    }

    /// Load one entity. A missing file is `Ok(None)`.
    pub fn get(&self, key: &str) -> Result<Option<T>, StorageError> {
        let path = self.path_for(key)?;
        if !path.is_file() {
            return Ok(None);
        }
        read_yaml(&path).map(Some)
    }

    /// Load every readable entity, sorted by file name.
    pub fn list(&self) -> Result<Vec<T>, StorageError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir, e)),
        };

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "yaml"))
            .collect();
        paths.sort();

        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            match read_yaml(&path) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping corrupt entry"),
            }
        }
        Ok(items)
    }

    /// Write one entity atomically, creating the directory if needed.
    pub fn save(&self, item: &T) -> Result<(), StorageError> {
        let path = self.path_for(item.key())?;
        let text = serde_yaml::to_string(item).map_err(|e| StorageError::Encode {
            key: item.key().to_string(),
            reason: e.to_string(),
        })?;
        std::fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        write_atomic(&path, &text)
    }

    /// Remove one entity. Returns whether a file was deleted.
    pub fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

/// Reject keys that are empty or could address a file outside the store.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let reason = if key.trim().is_empty() {
        Some("must not be empty")
    } else if key.contains(['/', '\\', '\0']) {
        Some("must not contain path separators")
    } else if key.starts_with('.') {
        Some("must not start with '.'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Write `contents` to a temporary sibling and rename it over `path`.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), StorageError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    std::fs::write(&tmp, contents).map_err(|e| io_error(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_error(path, e));
    }
    Ok(())
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let text = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    serde_yaml::from_str(&text).map_err(|e| StorageError::Decode {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn io_error(path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        name: String,
        body: String,
    }

    impl Keyed for Note {
        fn key(&self) -> &str {
            &self.name
        }
    }

    fn note(name: &str, body: &str) -> Note {
        Note {
            name: name.into(),
            body: body.into(),
        }
    }

    #[test]
    fn test_save_get_list_delete() {
        let dir = TempDir::new().unwrap();
        let store: YamlStore<Note> = YamlStore::new(dir.path().join("notes"));

        assert!(store.list().unwrap().is_empty());
        assert!(store.get("a").unwrap().is_none());

        store.save(&note("b", "second")).unwrap();
        store.save(&note("a", "first")).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(note("a", "first")));
        assert_eq!(
            store.list().unwrap().iter().map(|n| n.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert!(!store.exists("a").unwrap());
    }

    #[test]
    fn test_corrupt_entry_skipped_in_list() {
        let dir = TempDir::new().unwrap();
        let store: YamlStore<Note> = YamlStore::new(dir.path());
        store.save(&note("good", "ok")).unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "name: [unterminated").unwrap();

        let items = store.list().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "good");
        assert!(store.get("bad").is_err());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store: YamlStore<Note> = YamlStore::new(dir.path());
        store.save(&note("a", "one")).unwrap();
        store.save(&note("a", "two")).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.yaml".to_string()]);
        assert_eq!(store.get("a").unwrap().unwrap().body, "two");
    }

    #[test]
    fn test_invalid_keys_rejected() {
        for key in ["", "  ", "../escape", "a/b", ".hidden", "a\\b"] {
            assert!(validate_key(key).is_err(), "accepted {key:?}");
        }
        assert!(validate_key("sec-tools").is_ok());
        assert!(validate_key("My Server").is_ok());
    }
}
