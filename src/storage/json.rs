use std::{
    fs::{self, OpenOptions, rename, write},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use tracing::debug;
use uuid::Uuid;

use crate::storage::{KeyValueStore, StorageError, validate_key};

/// Number of snapshots kept per key in the backups directory
const MAX_BACKUPS: usize = 5;

/// Stores every key as `<dir>/<key>.json`.
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn get_backup_dir(&self) -> PathBuf {
        self.dir.join("backups")
    }

    fn get_backup_path(&self, key: &str) -> PathBuf {
        let nanos = jiff::Timestamp::now().as_nanosecond();
        self.get_backup_dir().join(format!("{key}-{nanos:020}.json"))
    }

    /// Copies the current value of `key` into the backups directory.
    /// Returns the number of bytes copied, 0 when there was nothing to back up.
    fn create_backup(&self, key: &str, path: &Path) -> Result<u64, StorageError> {
        let file_exists = fs::exists(path).map_err(|e| StorageError::BackupFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        if !file_exists {
            return Ok(0);
        }

        let backups_dir = self.get_backup_dir();
        fs::create_dir_all(&backups_dir).map_err(|e| StorageError::BackupFailed {
            path: backups_dir,
            source: e,
        })?;

        let backup_path = self.get_backup_path(key);
        fs::copy(path, &backup_path).map_err(|e| StorageError::BackupFailed {
            path: backup_path,
            source: e,
        })
    }

    fn cleanup_old_backups(&self, key: &str) -> Result<(), StorageError> {
        let backup_dir = self.get_backup_dir();
        let backup_dir_exists =
            fs::exists(&backup_dir).map_err(|e| StorageError::CleanupFailed {
                dir: backup_dir.clone(),
                source: e,
            })?;
        if !backup_dir_exists {
            return Ok(());
        }

        let prefix = format!("{key}-");
        let mut file_entries = fs::read_dir(&backup_dir)
            .map_err(|e| StorageError::CleanupFailed {
                dir: backup_dir.clone(),
                source: e,
            })?
            .flatten()
            .filter(|entry| entry.metadata().map(|m| m.is_file()).unwrap_or(false))
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .map(|entry| entry.path())
            .collect::<Vec<_>>();

        file_entries.sort();

        let number_of_files_to_delete = file_entries.len().saturating_sub(MAX_BACKUPS);
        if number_of_files_to_delete == 0 {
            return Ok(());
        }

        for file_path in &file_entries[0..number_of_files_to_delete] {
            fs::remove_file(file_path).map_err(|e| StorageError::CleanupFailed {
                dir: backup_dir.clone(),
                source: e,
            })?;
        }

        debug!(key, removed = number_of_files_to_delete, "Pruned old backups");
        Ok(())
    }

    fn replace(&self, key: &str, temp_path: &Path, path: &Path) -> Result<(), StorageError> {
        let lock_file_path = self.dir.join(format!("{key}.lock"));
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_file_path)
            .map_err(|e| StorageError::SaveFailed {
                key: key.to_string(),
                path: lock_file_path.clone(),
                source: e,
            })?;
        lock_file
            .lock_exclusive()
            .map_err(|e| StorageError::SaveFailed {
                key: key.to_string(),
                path: lock_file_path,
                source: e,
            })?;

        self.create_backup(key, path)?;
        self.cleanup_old_backups(key)?;

        rename(temp_path, path).map_err(|e| StorageError::SaveFailed {
            key: key.to_string(),
            path: path.to_path_buf(),
            source: e,
        })?;

        FileExt::unlock(&lock_file).map_err(|e| StorageError::SaveFailed {
            key: key.to_string(),
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }
}

impl KeyValueStore for JsonFileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.key_path(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::LoadFailed {
                key: key.to_string(),
                path,
                source: e,
            }),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.key_path(key)?;

        fs::create_dir_all(&self.dir).map_err(|e| StorageError::SaveFailed {
            key: key.to_string(),
            path: self.dir.clone(),
            source: e,
        })?;

        let temp_path = self.dir.join(format!("{key}.json.tmp.{}", Uuid::new_v4()));
        write(&temp_path, value).map_err(|e| StorageError::SaveFailed {
            key: key.to_string(),
            path: temp_path.clone(),
            source: e,
        })?;

        let result = self.replace(key, &temp_path, &path);
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result?;

        debug!(key, bytes = value.len(), path = %path.display(), "Flushed key");
        Ok(())
    }
}
