use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::datetime::DayKey;
use crate::store::TaskStore;
use crate::task::Task;

/// Blob key the whole task map is persisted under.
pub const TASKS_BLOB_KEY: &str = "dailyTasks";

/// Key-value blob persistence, the only I/O boundary of the store.
pub trait BlobStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Keeps an unreadable blob next to the live one so the next save
    /// does not destroy it.
    fn set_aside(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.set(&format!("{key}.bad"), value)
    }
}

/// One `<key>.json` file per blob inside a data directory.
#[derive(Debug)]
pub struct FileStorage {
    pub data_dir: PathBuf,
}

impl FileStorage {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened file storage");
        Ok(Self { data_dir })
    }

    pub fn blob_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }

    pub fn set_aside_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json.bad"))
    }
}

impl BlobStorage for FileStorage {
    #[tracing::instrument(skip(self))]
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.blob_path(key);
        if !path.exists() {
            debug!(file = %path.display(), "blob file absent");
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Some(raw))
    }

    #[tracing::instrument(skip(self, value))]
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.blob_path(key);
        write_atomic(&path, value)
            .with_context(|| format!("failed to save {}", path.display()))
    }

    #[tracing::instrument(skip(self, value))]
    fn set_aside(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.set_aside_path(key);
        write_atomic(&path, value)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Process-local storage for tests and embedders without a filesystem.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: RefCell<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(key: &str, value: &str) -> Self {
        let storage = Self::new();
        storage
            .blobs
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        storage
    }
}

impl BlobStorage for MemoryStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.blobs.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.blobs
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Loads and saves the [`TaskStore`] through a [`BlobStorage`]. Every
/// mutating method saves before returning.
#[derive(Debug)]
pub struct DataStore<S> {
    storage: S,
}

impl<S: BlobStorage> DataStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Never fails: an absent, unreadable or malformed blob is an empty
    /// store. A malformed blob is first set aside under `<key>.bad`.
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> TaskStore {
        let raw = match self.storage.get(TASKS_BLOB_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("no saved tasks; starting empty");
                return TaskStore::new();
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed reading saved tasks; starting empty");
                return TaskStore::new();
            }
        };

        match serde_json::from_str::<TaskStore>(&raw) {
            Ok(store) => {
                debug!(count = store.task_count(), "loaded tasks");
                store
            }
            Err(err) => {
                warn!(error = %err, "saved tasks are malformed; starting empty");
                if let Err(err) = self.storage.set_aside(TASKS_BLOB_KEY, &raw) {
                    warn!(error = %format!("{err:#}"), "failed to keep malformed tasks");
                }
                TaskStore::new()
            }
        }
    }

    #[tracing::instrument(skip(self, store))]
    pub fn save(&self, store: &TaskStore) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(store).context("failed to serialize tasks")?;
        debug!(count = store.task_count(), "saving tasks");
        self.storage.set(TASKS_BLOB_KEY, &serialized)
    }

    #[tracing::instrument(skip(self, store, text), fields(day = %key))]
    pub fn add_task(
        &self,
        mut store: TaskStore,
        key: &DayKey,
        text: &str,
        now_ms: u64,
    ) -> anyhow::Result<(Option<Task>, TaskStore)> {
        let added = store.add_task(key, text, now_ms);
        if added.is_some() {
            self.save(&store)?;
        }
        Ok((added, store))
    }

    #[tracing::instrument(skip(self, store), fields(day = %key))]
    pub fn toggle_task(
        &self,
        mut store: TaskStore,
        key: &DayKey,
        id: u64,
    ) -> anyhow::Result<TaskStore> {
        if store.toggle_task(key, id) {
            self.save(&store)?;
        }
        Ok(store)
    }

    #[tracing::instrument(skip(self, store), fields(day = %key))]
    pub fn delete_task(
        &self,
        mut store: TaskStore,
        key: &DayKey,
        id: u64,
    ) -> anyhow::Result<TaskStore> {
        if store.delete_task(key, id).is_some() {
            self.save(&store)?;
        }
        Ok(store)
    }
}

#[tracing::instrument(skip(path, contents))]
fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    debug!(file = %path.display(), bytes = contents.len(), "writing blob atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{BlobStorage, DataStore, MemoryStorage, TASKS_BLOB_KEY};
    use crate::datetime::day_key;
    use crate::store::TaskStore;

    #[test]
    fn corrupt_blob_loads_empty() {
        for raw in ["not json", "{\"2024-3-7\": 5}", "[1,2,3]", ""] {
            let store = DataStore::new(MemoryStorage::with_blob(TASKS_BLOB_KEY, raw));
            assert_eq!(store.load(), TaskStore::new(), "input: {raw:?}");
        }
    }

    #[test]
    fn malformed_blob_is_kept_aside() {
        let raw = r#"{"2024-3-7":[{"id":"1","text":"a","completed":false}]}"#;
        let ds = DataStore::new(MemoryStorage::with_blob(TASKS_BLOB_KEY, raw));
        let day = day_key(NaiveDate::from_ymd_opt(2024, 3, 8).expect("valid date"));

        ds.add_task(ds.load(), &day, "Fresh start", 7).expect("add");

        let kept = ds.storage().get("dailyTasks.bad").expect("get");
        assert_eq!(kept.as_deref(), Some(raw));
        assert_eq!(ds.load().task_count(), 1);
    }

    #[test]
    fn absent_blob_loads_empty() {
        let store = DataStore::new(MemoryStorage::new());
        assert!(store.load().is_empty());
    }

    #[test]
    fn mutations_persist_immediately() {
        let ds = DataStore::new(MemoryStorage::new());
        let day = day_key(NaiveDate::from_ymd_opt(2024, 3, 7).expect("valid date"));

        let (task, store) = ds
            .add_task(ds.load(), &day, "Water plants", 42)
            .expect("add");
        let task = task.expect("task added");
        assert_eq!(ds.load(), store);

        let store = ds.toggle_task(store, &day, task.id).expect("toggle");
        assert!(ds.load().tasks_for(&day)[0].completed);

        let store = ds.delete_task(store, &day, task.id).expect("delete");
        assert!(store.is_empty());
        assert!(ds.load().is_empty());
    }

    #[test]
    fn noops_do_not_write() {
        let ds = DataStore::new(MemoryStorage::new());
        let day = day_key(NaiveDate::from_ymd_opt(2024, 3, 7).expect("valid date"));

        let (task, store) = ds.add_task(ds.load(), &day, "   ", 1).expect("add");
        assert!(task.is_none());
        let store = ds.toggle_task(store, &day, 1).expect("toggle");
        ds.delete_task(store, &day, 1).expect("delete");

        assert_eq!(ds.storage().get(TASKS_BLOB_KEY).expect("get"), None);
    }
}
