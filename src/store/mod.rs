//! Document storage: a small collection/document model with JSON bodies.
//!
//! Handlers talk to typed [`Collection`] accessors; the backing
//! [`DocumentStore`] is either Postgres (JSONB) or an in-memory map.

mod memory;
mod postgres;

use std::marker::PhantomData;

use anyhow::Context;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type Filters = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Equality filters on top-level fields plus ordering and paging.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Filters,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.insert(field.to_string(), value.into());
        self
    }

    pub fn order_by(mut self, field: &str, dir: Direction) -> Self {
        self.order_by = Some((field.to_string(), dir));
        self
    }

    pub fn page(mut self, limit: u64, offset: u64) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> anyhow::Result<Option<Value>>;
    /// Insert under a freshly generated id and return it.
    async fn add(&self, collection: &str, data: Value) -> anyhow::Result<String>;
    /// Create or overwrite the document with the given id.
    async fn set(&self, collection: &str, id: &str, data: Value) -> anyhow::Result<()>;
    /// Shallow-merge `patch` into an existing document. Returns false if it does not exist.
    async fn merge(&self, collection: &str, id: &str, patch: Value) -> anyhow::Result<bool>;
    /// Returns false if nothing was deleted.
    async fn delete(&self, collection: &str, id: &str) -> anyhow::Result<bool>;
    async fn find(&self, collection: &str, query: &Query) -> anyhow::Result<Vec<(String, Value)>>;
    async fn count(&self, collection: &str, filters: &Filters) -> anyhow::Result<u64>;
}

/// A write was rejected by a unique constraint (for example a second user
/// with the same email).
#[derive(Debug, thiserror::Error)]
#[error("duplicate document in {collection}")]
pub struct UniqueViolation {
    pub collection: String,
}

pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<UniqueViolation>().is_some()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

const ISO_MILLIS: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
);

/// Current UTC time with fixed millisecond precision, so that string order
/// equals chronological order.
pub fn timestamp() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

pub fn format_timestamp(t: OffsetDateTime) -> String {
    t.to_offset(time::UtcOffset::UTC)
        .format(ISO_MILLIS)
        .unwrap_or_else(|_| t.unix_timestamp().to_string())
}

/// A stored document: serializes as `{ "id": ..., ...data }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document<T> {
    pub id: String,
    #[serde(flatten)]
    pub data: T,
}

/// Typed accessor over one collection of a [`DocumentStore`].
pub struct Collection<'a, T> {
    store: &'a dyn DocumentStore,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T> Collection<'a, T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: &'a dyn DocumentStore, name: &'static str) -> Self {
        Self {
            store,
            name,
            _marker: PhantomData,
        }
    }

    fn decode(&self, id: String, value: Value) -> anyhow::Result<Document<T>> {
        let data = serde_json::from_value::<T>(value)
            .with_context(|| format!("decode {}/{}", self.name, id))?;
        Ok(Document { id, data })
    }

    pub async fn get(&self, id: &str) -> anyhow::Result<Option<Document<T>>> {
        match self.store.get(self.name, id).await? {
            Some(v) => Ok(Some(self.decode(id.to_string(), v)?)),
            None => Ok(None),
        }
    }

    pub async fn add(&self, data: T) -> anyhow::Result<Document<T>> {
        let value = serde_json::to_value(&data).context("encode document")?;
        let id = self.store.add(self.name, value).await?;
        Ok(Document { id, data })
    }

    pub async fn set(&self, id: &str, data: T) -> anyhow::Result<Document<T>> {
        let value = serde_json::to_value(&data).context("encode document")?;
        self.store.set(self.name, id, value).await?;
        Ok(Document {
            id: id.to_string(),
            data,
        })
    }

    /// Merge a patch and return the resulting document, or `None` if it is missing.
    pub async fn update<P: Serialize>(
        &self,
        id: &str,
        patch: &P,
    ) -> anyhow::Result<Option<Document<T>>> {
        let patch = serde_json::to_value(patch).context("encode patch")?;
        anyhow::ensure!(patch.is_object(), "patch must be a JSON object");
        if !self.store.merge(self.name, id, patch).await? {
            return Ok(None);
        }
        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> anyhow::Result<bool> {
        self.store.delete(self.name, id).await
    }

    pub async fn find(&self, query: &Query) -> anyhow::Result<Vec<Document<T>>> {
        self.store
            .find(self.name, query)
            .await?
            .into_iter()
            .map(|(id, v)| self.decode(id, v))
            .collect()
    }

    pub async fn count(&self, filters: &Filters) -> anyhow::Result<u64> {
        self.store.count(self.name, filters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Note {
        title: String,
        owner_id: String,
        #[serde(default)]
        pinned: bool,
    }

    #[test]
    fn timestamp_has_fixed_width() {
        let whole = format_timestamp(datetime!(2024-03-01 10:00:00 UTC));
        let frac = format_timestamp(datetime!(2024-03-01 10:00:00.5 UTC));
        assert_eq!(whole, "2024-03-01T10:00:00.000Z");
        assert_eq!(frac, "2024-03-01T10:00:00.500Z");
        assert!(whole < frac);
    }

    #[test]
    fn document_serializes_flat() {
        let doc = Document {
            id: "abc".to_string(),
            data: Note {
                title: "hi".into(),
                owner_id: "u1".into(),
                pinned: true,
            },
        };
        let v = serde_json::to_value(&doc).unwrap();
        assert_eq!(v["id"], "abc");
        assert_eq!(v["ownerId"], "u1");
        assert_eq!(v["pinned"], true);
    }

    #[tokio::test]
    async fn collection_update_merges_and_keeps_other_fields() {
        let store = MemoryStore::new();
        let notes = Collection::<Note>::new(&store, "notes");
        let created = notes
            .add(Note {
                title: "draft".into(),
                owner_id: "u1".into(),
                pinned: false,
            })
            .await
            .unwrap();

        let updated = notes
            .update(&created.id, &serde_json::json!({ "title": "final" }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.data.title, "final");
        assert_eq!(updated.data.owner_id, "u1");

        let missing = notes
            .update("nope", &serde_json::json!({ "title": "x" }))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn collection_rejects_non_object_patch() {
        let store = MemoryStore::new();
        let notes = Collection::<Note>::new(&store, "notes");
        let err = notes.update("id", &vec![1, 2, 3]).await.unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }
}
