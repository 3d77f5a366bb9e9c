//! Entity - one persisted record with dirty-field tracking
//!
//! Field writes go to both the live map and the modified map. `save` sends the
//! modified map to the owning repository and clears it only when the write
//! succeeded, so a failed save can be retried as is. Auxiliary table fields of
//! composite structures live in a nested map under `_<table>`.
//!
//! The repository handle is transient: it is skipped by serde and reattached
//! from the connection registry by [`Entity::from_snapshot`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::primary_key::PrimaryKey;
use super::traits::{Cascadable, Identifiable, Trackable};
use crate::backends::Row;
use crate::connection::Connection;
use crate::error::{ModelError, ModelResult};
use crate::repository::Persistence;

/// Key of the nested map holding fields of auxiliary table `table`
pub fn nested_key(table: &str) -> String {
    format!("_{}", table)
}

#[derive(Serialize, Deserialize)]
pub struct Entity {
    repository: String,
    primary_fields: Vec<String>,
    primary: PrimaryKey,
    data: Row,
    modified: Row,
    deleted: bool,
    #[serde(skip, default = "Uuid::new_v4")]
    instance_id: Uuid,
    #[serde(skip)]
    store: Option<Arc<dyn Persistence>>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("repository", &self.repository)
            .field("primary", &self.primary)
            .field("data", &self.data)
            .field("modified", &self.modified)
            .field("deleted", &self.deleted)
            .field("attached", &self.store.is_some())
            .finish()
    }
}

impl Entity {
    /// Entity bound to `store`, with its key read from `data`
    pub fn new(store: Arc<dyn Persistence>, primary_fields: Vec<String>, data: Row) -> Self {
        Self {
            repository: store.name().to_string(),
            primary: PrimaryKey::from_row(&primary_fields, &data),
            primary_fields,
            data,
            modified: Row::new(),
            deleted: false,
            instance_id: Uuid::new_v4(),
            store: Some(store),
        }
    }

    /// Rebuild an entity from [`Entity::snapshot`] output and reattach its repository
    pub fn from_snapshot(snapshot: Value, connection: &Connection) -> ModelResult<Self> {
        let mut entity: Entity = serde_json::from_value(snapshot)?;
        let store = connection.repository(&entity.repository)?;
        entity.attach(store);
        Ok(entity)
    }

    pub fn snapshot(&self) -> ModelResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn attach(&mut self, store: Arc<dyn Persistence>) {
        self.repository = store.name().to_string();
        self.store = Some(store);
    }

    pub fn is_attached(&self) -> bool {
        self.store.is_some()
    }

    pub fn repository_name(&self) -> &str {
        &self.repository
    }

    /// In-process identity, used to check plugin ownership
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn fields(&self) -> &Row {
        &self.data
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Field value deserialized into `T`; `None` when absent or null
    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> ModelResult<Option<T>> {
        match self.data.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }

    /// Field of auxiliary table `table`
    pub fn get_in(&self, table: &str, field: &str) -> Option<&Value> {
        self.data
            .get(&nested_key(table))
            .and_then(|nested| nested.get(field))
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> ModelResult<()> {
        if self.deleted {
            return Err(ModelError::AlreadyDeleted);
        }
        let value = value.into();
        self.data.insert(field.to_string(), value.clone());
        self.modified.insert(field.to_string(), value);
        Ok(())
    }

    /// Write a field of auxiliary table `table`
    pub fn set_in(&mut self, table: &str, field: &str, value: impl Into<Value>) -> ModelResult<()> {
        if self.deleted {
            return Err(ModelError::AlreadyDeleted);
        }
        let key = nested_key(table);
        let value = value.into();
        for map in [&mut self.data, &mut self.modified] {
            let nested = map
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Row::new()));
            if !nested.is_object() {
                *nested = Value::Object(Row::new());
            }
            if let Value::Object(nested) = nested {
                nested.insert(field.to_string(), value.clone());
            }
        }
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Live fields, optionally restricted to `filter`
    pub fn to_json(&self, filter: Option<&[&str]>) -> Value {
        match filter {
            None => Value::Object(self.data.clone()),
            Some(fields) => Value::Object(
                self.data
                    .iter()
                    .filter(|(name, _)| fields.contains(&name.as_str()))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect(),
            ),
        }
    }

    /// Write pending fields through the repository
    pub async fn save(&mut self) -> ModelResult<()> {
        if self.deleted {
            return Err(ModelError::AlreadyDeleted);
        }
        if self.modified.is_empty() {
            return Ok(());
        }

        let key = self.key()?;
        let store = self.store()?;
        store.update(&key, self.modified.clone()).await?;

        self.commit();
        Ok(())
    }

    pub async fn delete(&mut self) -> ModelResult<()> {
        if self.deleted {
            return Err(ModelError::AlreadyDeleted);
        }

        let key = self.key()?;
        let store = self.store()?;
        store.delete(&key).await?;

        self.deleted = true;
        Ok(())
    }

    /// Insert the live fields as a new row and adopt the generated key
    pub(crate) async fn insert_new(&mut self) -> ModelResult<()> {
        if self.deleted {
            return Err(ModelError::AlreadyDeleted);
        }

        let store = self.store()?;
        let key = store.insert(self.data.clone()).await?;
        if let [field] = self.primary_fields.as_slice() {
            if !key.is_null() {
                self.data.insert(field.clone(), key);
            }
        }

        self.commit();
        Ok(())
    }

    /// Set a field without recording it as modified
    pub(crate) fn set_clean(&mut self, field: &str, value: Value) {
        self.data.insert(field.to_string(), value);
    }

    pub(crate) fn store(&self) -> ModelResult<Arc<dyn Persistence>> {
        self.store.clone().ok_or(ModelError::Detached)
    }

    /// Key value for writes; every key part must be present
    fn key(&self) -> ModelResult<Value> {
        if let Some(field) = self.primary.missing_part(&self.primary_fields) {
            return Err(ModelError::MissingKeyPart(field.to_string()));
        }
        if !self.primary.is_valid() {
            return Err(ModelError::MissingKeyPart(self.primary_fields.join(",")));
        }
        Ok(self.primary.to_value())
    }

    fn commit(&mut self) {
        self.modified.clear();
        self.primary = PrimaryKey::from_row(&self.primary_fields, &self.data);
    }
}

impl Identifiable for Entity {
    fn primary_key(&self) -> &PrimaryKey {
        &self.primary
    }

    fn primary_fields(&self) -> &[String] {
        &self.primary_fields
    }
}

impl Trackable for Entity {
    fn modified_fields(&self) -> &Row {
        &self.modified
    }
}

#[async_trait]
impl Cascadable for Entity {
    async fn save(&mut self) -> ModelResult<()> {
        Entity::save(self).await
    }

    async fn delete(&mut self) -> ModelResult<()> {
        Entity::delete(self).await
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DriverError, Operation};
    use serde_json::json;
    use std::sync::Mutex;

    /// Persistence double recording calls
    #[derive(Default)]
    struct RecordingStore {
        updates: Mutex<Vec<(Value, Row)>>,
        deletes: Mutex<Vec<Value>>,
        fail_updates: bool,
    }

    #[async_trait]
    impl Persistence for RecordingStore {
        fn name(&self) -> &str {
            "recording"
        }

        async fn insert(&self, _data: Row) -> ModelResult<Value> {
            Ok(json!(99))
        }

        async fn update(&self, key: &Value, data: Row) -> ModelResult<u64> {
            if self.fail_updates {
                return Err(ModelError::Persistence {
                    operation: Operation::Update,
                    source: DriverError::Query("down".into()),
                });
            }
            self.updates.lock().unwrap().push((key.clone(), data));
            Ok(1)
        }

        async fn delete(&self, key: &Value) -> ModelResult<u64> {
            self.deletes.lock().unwrap().push(key.clone());
            Ok(1)
        }
    }

    fn entity_with(store: Arc<RecordingStore>) -> Entity {
        let data = json!({"id": 7, "title": "old"}).as_object().cloned().unwrap();
        Entity::new(store, vec!["id".to_string()], data)
    }

    #[tokio::test]
    async fn test_set_then_save_clears_modified() {
        let store = Arc::new(RecordingStore::default());
        let mut entity = entity_with(store.clone());

        entity.set("title", "new").unwrap();
        assert_eq!(entity.modified_fields().get("title"), Some(&json!("new")));
        assert!(entity.is_modified("title"));
        assert!(!entity.is_modified("id"));

        entity.save().await.unwrap();
        assert!(!entity.has_modified_fields());

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, json!(7));
        assert_eq!(updates[0].1.get("title"), Some(&json!("new")));
    }

    #[tokio::test]
    async fn test_save_without_changes_is_a_no_op() {
        let store = Arc::new(RecordingStore::default());
        let mut entity = entity_with(store.clone());

        entity.save().await.unwrap();
        assert!(store.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_modified_fields() {
        let store = Arc::new(RecordingStore {
            fail_updates: true,
            ..Default::default()
        });
        let mut entity = entity_with(store);

        entity.set("title", "new").unwrap();
        let err = entity.save().await.unwrap_err();
        assert!(matches!(err, ModelError::Persistence { operation: Operation::Update, .. }));
        assert!(entity.is_modified("title"));
    }

    #[tokio::test]
    async fn test_deleted_entity_rejects_save_and_delete() {
        let store = Arc::new(RecordingStore::default());
        let mut entity = entity_with(store.clone());

        entity.delete().await.unwrap();
        assert!(entity.is_deleted());
        assert_eq!(store.deletes.lock().unwrap().as_slice(), &[json!(7)]);

        assert!(matches!(entity.save().await, Err(ModelError::AlreadyDeleted)));
        assert!(matches!(entity.delete().await, Err(ModelError::AlreadyDeleted)));
        assert!(matches!(entity.set("title", "x"), Err(ModelError::AlreadyDeleted)));
    }

    #[tokio::test]
    async fn test_writes_without_key_are_refused() {
        let store = Arc::new(RecordingStore::default());
        let data = json!({"title": "keyless"}).as_object().cloned().unwrap();
        let mut entity = Entity::new(store.clone(), vec!["id".to_string()], data);

        entity.set("title", "new").unwrap();
        assert!(matches!(
            entity.save().await,
            Err(ModelError::MissingKeyPart(field)) if field == "id"
        ));
        assert!(entity.is_modified("title"));
        assert!(matches!(
            entity.delete().await,
            Err(ModelError::MissingKeyPart(field)) if field == "id"
        ));
        assert!(!entity.is_deleted());
        assert!(store.updates.lock().unwrap().is_empty());
        assert!(store.deletes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_set_in_nests_auxiliary_fields() {
        let mut entity = entity_with(Arc::new(RecordingStore::default()));

        entity.set_in("article_lang", "title", "Hallo").unwrap();
        assert_eq!(entity.get_in("article_lang", "title"), Some(&json!("Hallo")));
        assert_eq!(
            entity.modified_fields().get("_article_lang"),
            Some(&json!({"title": "Hallo"}))
        );
    }

    #[test]
    fn test_to_json_filter_and_snapshot_skips_handle() {
        let entity = entity_with(Arc::new(RecordingStore::default()));

        assert_eq!(entity.to_json(Some(&["title"])), json!({"title": "old"}));

        let snapshot = entity.snapshot().unwrap();
        assert!(snapshot.get("store").is_none());
        assert!(snapshot.get("instance_id").is_none());
        assert_eq!(snapshot["repository"], json!("recording"));

        let restored: Entity = serde_json::from_value(snapshot).unwrap();
        assert!(!restored.is_attached());
        assert_ne!(restored.instance_id(), entity.instance_id());
    }

    #[test]
    fn test_get_as() {
        let entity = entity_with(Arc::new(RecordingStore::default()));
        assert_eq!(entity.get_as::<i64>("id").unwrap(), Some(7));
        assert_eq!(entity.get_as::<String>("missing").unwrap(), None);
        assert!(entity.get_as::<i64>("title").is_err());
    }
}
