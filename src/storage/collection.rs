//! A directory of `{id}.json` files behind a single-writer lock. Every
//! Planning/Docs entity is one instantiation of this — the spec notes they
//! "follow the same CRUD shape", so one generic type is what implements
//! that shape instead of restating it per entity.

use std::marker::PhantomData;
use std::path::PathBuf;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::models::Id;

use super::fs_helpers;

pub struct Collection<T> {
    dir: PathBuf,
    /// Single-writer lock per store, matching the concurrency model: readers
    /// may interleave, but writes within one collection are serialized.
    write_lock: Mutex<()>,
    _marker: PhantomData<T>,
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Sync,
{
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            write_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub async fn get(&self, id: &Id) -> Result<Option<T>> {
        fs_helpers::read_json(&fs_helpers::entity_path(&self.dir, id)).await
    }

    pub async fn list(&self) -> Result<Vec<(Id, T)>> {
        fs_helpers::list_json_dir(&self.dir).await
    }

    pub async fn list_values(&self) -> Result<Vec<T>> {
        Ok(self.list().await?.into_iter().map(|(_, v)| v).collect())
    }

    pub async fn put(&self, id: &Id, value: &T) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        fs_helpers::write_json(&fs_helpers::entity_path(&self.dir, id), value).await
    }

    pub async fn delete(&self, id: &Id) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        fs_helpers::delete_file(&fs_helpers::entity_path(&self.dir, id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        name: String,
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let collection: Collection<Widget> = Collection::new(dir.path().to_path_buf());
        let id = Id::from_string("w1");
        let widget = Widget { name: "gear".into() };

        collection.put(&id, &widget).await.unwrap();
        let fetched = collection.get(&id).await.unwrap();
        assert_eq!(fetched, Some(widget));
    }

    #[tokio::test]
    async fn missing_entity_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let collection: Collection<Widget> = Collection::new(dir.path().to_path_buf());
        assert_eq!(collection.get(&Id::from_string("nope")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_reports_whether_it_existed() {
        let dir = tempfile::tempdir().unwrap();
        let collection: Collection<Widget> = Collection::new(dir.path().to_path_buf());
        let id = Id::from_string("w1");
        collection.put(&id, &Widget { name: "gear".into() }).await.unwrap();

        assert!(collection.delete(&id).await.unwrap());
        assert!(!collection.delete(&id).await.unwrap());
    }

    #[tokio::test]
    async fn list_returns_every_stored_entity() {
        let dir = tempfile::tempdir().unwrap();
        let collection: Collection<Widget> = Collection::new(dir.path().to_path_buf());
        collection
            .put(&Id::from_string("w1"), &Widget { name: "gear".into() })
            .await
            .unwrap();
        collection
            .put(&Id::from_string("w2"), &Widget { name: "bolt".into() })
            .await
            .unwrap();

        let mut names: Vec<String> = collection
            .list_values()
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["bolt".to_string(), "gear".to_string()]);
    }
}
