use super::dto::{ListUpdatesQuery, Update, UpdateUpdateRequest};
use crate::store::{Collection, Direction, Document, DocumentStore, Query};

pub const UPDATES: &str = "updates";

pub fn updates(store: &dyn DocumentStore) -> Collection<'_, Update> {
    Collection::new(store, UPDATES)
}

pub async fn insert(store: &dyn DocumentStore, update: Update) -> anyhow::Result<Document<Update>> {
    updates(store).add(update).await
}

pub async fn get(store: &dyn DocumentStore, id: &str) -> anyhow::Result<Option<Document<Update>>> {
    updates(store).get(id).await
}

pub async fn update(
    store: &dyn DocumentStore,
    id: &str,
    patch: &UpdateUpdateRequest,
) -> anyhow::Result<Option<Document<Update>>> {
    updates(store).update(id, patch).await
}

pub async fn delete(store: &dyn DocumentStore, id: &str) -> anyhow::Result<bool> {
    updates(store).delete(id).await
}

pub async fn list(
    store: &dyn DocumentStore,
    q: &ListUpdatesQuery,
) -> anyhow::Result<(Vec<Document<Update>>, u64)> {
    let mut query = Query::new();
    if let Some(school_id) = q.school_id.as_deref().filter(|s| !s.is_empty()) {
        query = query.filter("schoolId", school_id);
    }
    if let Some(campaign_id) = q.campaign_id.as_deref().filter(|s| !s.is_empty()) {
        query = query.filter("campaignId", campaign_id);
    }

    let coll = updates(store);
    let total = coll.count(&query.filters).await?;
    let page = q.page_params();
    let query = query
        .order_by("createdAt", Direction::Desc)
        .page(page.limit(), page.offset());
    Ok((coll.find(&query).await?, total))
}
