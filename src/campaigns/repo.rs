use super::dto::{Campaign, ListCampaignsQuery, UpdateCampaignRequest};
use crate::store::{Collection, Direction, Document, DocumentStore, Query};

pub const CAMPAIGNS: &str = "campaigns";

pub fn campaigns(store: &dyn DocumentStore) -> Collection<'_, Campaign> {
    Collection::new(store, CAMPAIGNS)
}

pub async fn insert(store: &dyn DocumentStore, campaign: Campaign) -> anyhow::Result<Document<Campaign>> {
    campaigns(store).add(campaign).await
}

pub async fn get(store: &dyn DocumentStore, id: &str) -> anyhow::Result<Option<Document<Campaign>>> {
    campaigns(store).get(id).await
}

pub async fn update(
    store: &dyn DocumentStore,
    id: &str,
    patch: &UpdateCampaignRequest,
) -> anyhow::Result<Option<Document<Campaign>>> {
    campaigns(store).update(id, patch).await
}

pub async fn delete(store: &dyn DocumentStore, id: &str) -> anyhow::Result<bool> {
    campaigns(store).delete(id).await
}

/// Public listing: one page plus the total matching count.
pub async fn list(
    store: &dyn DocumentStore,
    q: &ListCampaignsQuery,
) -> anyhow::Result<(Vec<Document<Campaign>>, u64)> {
    let mut query = Query::new().filter("status", q.status.as_deref().unwrap_or("active"));
    if let Some(category) = q.category.as_deref().filter(|c| !c.is_empty()) {
        query = query.filter("category", category);
    }
    if q.featured == Some(true) {
        query = query.filter("featured", true);
    }

    let coll = campaigns(store);
    let total = coll.count(&query.filters).await?;
    let page = q.page_params();
    let query = query
        .order_by("createdAt", Direction::Desc)
        .page(page.limit(), page.offset());
    Ok((coll.find(&query).await?, total))
}

pub async fn list_by_school(
    store: &dyn DocumentStore,
    school_id: &str,
) -> anyhow::Result<Vec<Document<Campaign>>> {
    let q = Query::new()
        .filter("schoolId", school_id)
        .order_by("createdAt", Direction::Desc);
    campaigns(store).find(&q).await
}
