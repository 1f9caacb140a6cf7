//! Durable local slots for offline state.
//!
//! Each slot holds one plain JSON document under a fixed name.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use moviesync_common::{Error, Result};

/// Slot holding the serialized local mirror of the collection.
pub const MIRROR_SLOT: &str = "movies";
/// Slot holding the serialized pending operation log.
pub const PENDING_SLOT: &str = "pendingOperations";

/// Named text slots that survive process restarts.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read a slot, or `None` if it was never written.
    async fn read_slot(&self, name: &str) -> Result<Option<String>>;

    /// Replace the contents of a slot.
    ///
    /// # Postconditions
    /// - Once this returns, a crash does not lose the new contents
    async fn write_slot(&self, name: &str, contents: &str) -> Result<()>;
}

/// Slot store keeping one `<slot>.json` file per slot in a directory.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    /// - Permission denied
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Directory holding the slot files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\', '.']) {
            return Err(Error::InvalidInput(format!("Invalid slot name: {}", name)));
        }
        Ok(self.root.join(format!("{}.json", name)))
    }
}

#[async_trait]
impl LocalStore for FileStore {
    async fn read_slot(&self, name: &str) -> Result<Option<String>> {
        let path = self.slot_path(name)?;
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn write_slot(&self, name: &str, contents: &str) -> Result<()> {
        let path = self.slot_path(name)?;
        let tmp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}

/// Slot store held in memory.
///
/// Useful for testing; contents last as long as the store. Writes to chosen
/// slots can be made to fail.
#[derive(Default)]
pub struct MemoryStore {
    slots: RwLock<HashMap<String, String>>,
    failing: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later write to `name` fail, or succeed again.
    pub async fn fail_writes(&self, name: &str, failing: bool) {
        let mut set = self.failing.write().await;
        if failing {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn read_slot(&self, name: &str) -> Result<Option<String>> {
        Ok(self.slots.read().await.get(name).cloned())
    }

    async fn write_slot(&self, name: &str, contents: &str) -> Result<()> {
        if self.failing.read().await.contains(name) {
            return Err(Error::Io(std::io::Error::other(format!(
                "Write to slot {} refused",
                name
            ))));
        }
        self.slots
            .write()
            .await
            .insert(name.to_string(), contents.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).await.unwrap();

        assert_eq!(store.read_slot(MIRROR_SLOT).await.unwrap(), None);

        store.write_slot(MIRROR_SLOT, "[]").await.unwrap();
        store.write_slot(MIRROR_SLOT, "[1]").await.unwrap();
        assert_eq!(
            store.read_slot(MIRROR_SLOT).await.unwrap().as_deref(),
            Some("[1]")
        );

        assert!(temp.path().join("movies.json").exists());
        assert!(!temp.path().join("movies.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let temp = TempDir::new().unwrap();

        {
            let store = FileStore::open(temp.path()).await.unwrap();
            store.write_slot(PENDING_SLOT, "[]").await.unwrap();
        }

        let store = FileStore::open(temp.path()).await.unwrap();
        assert_eq!(
            store.read_slot(PENDING_SLOT).await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_like_names() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).await.unwrap();

        assert!(store.write_slot("../escape", "x").await.is_err());
        assert!(store.read_slot("").await.is_err());
    }

    #[tokio::test]
    async fn test_slots_are_independent() {
        let store = MemoryStore::new();
        store.write_slot(MIRROR_SLOT, "a").await.unwrap();
        store.write_slot(PENDING_SLOT, "b").await.unwrap();

        assert_eq!(store.read_slot(MIRROR_SLOT).await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.read_slot(PENDING_SLOT).await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_memory_store_write_failure() {
        let store = MemoryStore::new();
        store.write_slot(PENDING_SLOT, "[]").await.unwrap();

        store.fail_writes(PENDING_SLOT, true).await;
        assert!(matches!(store.write_slot(PENDING_SLOT, "[1]").await, Err(Error::Io(_))));
        store.write_slot(MIRROR_SLOT, "[]").await.unwrap();
        assert_eq!(store.read_slot(PENDING_SLOT).await.unwrap().as_deref(), Some("[]"));

        store.fail_writes(PENDING_SLOT, false).await;
        store.write_slot(PENDING_SLOT, "[1]").await.unwrap();
    }
}
