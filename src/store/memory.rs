use std::cmp::Ordering;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{new_id, Direction, DocumentStore, Filters, Query};

struct Entry {
    seq: u64,
    data: Value,
}

/// Process-local store used for tests and for running without Postgres.
#[derive(Default)]
pub struct MemoryStore {
    docs: DashMap<(String, String), Entry>,
    seq: std::sync::atomic::AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    fn matching(&self, collection: &str, filters: &Filters) -> Vec<(String, u64, Value)> {
        self.docs
            .iter()
            .filter(|e| e.key().0 == collection && matches(&e.value().data, filters))
            .map(|e| (e.key().1.clone(), e.value().seq, e.value().data.clone()))
            .collect()
    }
}

fn matches(doc: &Value, filters: &Filters) -> bool {
    filters.iter().all(|(k, v)| doc.get(k) == Some(v))
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> anyhow::Result<Option<Value>> {
        Ok(self
            .docs
            .get(&(collection.to_string(), id.to_string()))
            .map(|e| e.data.clone()))
    }

    async fn add(&self, collection: &str, data: Value) -> anyhow::Result<String> {
        let id = new_id();
        self.set(collection, &id, data).await?;
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> anyhow::Result<()> {
        anyhow::ensure!(data.is_object(), "document must be a JSON object");
        let seq = self.next_seq();
        self.docs
            .insert((collection.to_string(), id.to_string()), Entry { seq, data });
        Ok(())
    }

    async fn merge(&self, collection: &str, id: &str, patch: Value) -> anyhow::Result<bool> {
        let Value::Object(patch) = patch else {
            anyhow::bail!("patch must be a JSON object");
        };
        let Some(mut entry) = self.docs.get_mut(&(collection.to_string(), id.to_string())) else {
            return Ok(false);
        };
        if let Value::Object(doc) = &mut entry.data {
            for (k, v) in patch {
                doc.insert(k, v);
            }
        }
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> anyhow::Result<bool> {
        Ok(self
            .docs
            .remove(&(collection.to_string(), id.to_string()))
            .is_some())
    }

    async fn find(&self, collection: &str, query: &Query) -> anyhow::Result<Vec<(String, Value)>> {
        let mut rows = self.matching(collection, &query.filters);
        match &query.order_by {
            Some((field, dir)) => rows.sort_by(|a, b| {
                let ord = compare(a.2.get(field), b.2.get(field)).then(a.1.cmp(&b.1));
                match dir {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            }),
            None => rows.sort_by_key(|r| r.1),
        }
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .skip(query.offset as usize)
            .take(limit)
            .map(|(id, _, data)| (id, data))
            .collect())
    }

    async fn count(&self, collection: &str, filters: &Filters) -> anyhow::Result<u64> {
        Ok(self
            .docs
            .iter()
            .filter(|e| e.key().0 == collection && matches(&e.value().data, filters))
            .count() as u64)
    }
}
