use super::dto::{School, UpdateSchoolRequest};
use crate::pagination::PageParams;
use crate::store::{Collection, Direction, Document, DocumentStore, Filters, Query};

pub const SCHOOLS: &str = "schools";

pub fn schools(store: &dyn DocumentStore) -> Collection<'_, School> {
    Collection::new(store, SCHOOLS)
}

pub async fn get(store: &dyn DocumentStore, id: &str) -> anyhow::Result<Option<Document<School>>> {
    schools(store).get(id).await
}

pub async fn upsert(store: &dyn DocumentStore, uid: &str, school: School) -> anyhow::Result<Document<School>> {
    schools(store).set(uid, school).await
}

pub async fn update(
    store: &dyn DocumentStore,
    id: &str,
    patch: &UpdateSchoolRequest,
) -> anyhow::Result<Option<Document<School>>> {
    schools(store).update(id, patch).await
}

pub async fn list(
    store: &dyn DocumentStore,
    page: &PageParams,
) -> anyhow::Result<(Vec<Document<School>>, u64)> {
    let coll = schools(store);
    let total = coll.count(&Filters::new()).await?;
    let q = Query::new()
        .order_by("schoolName", Direction::Asc)
        .page(page.limit(), page.offset());
    Ok((coll.find(&q).await?, total))
}
