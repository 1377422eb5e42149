use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{CreateUpdateRequest, DeletedResponse, ListUpdatesQuery, Update, UpdateList, UpdateUpdateRequest},
    repo,
};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    state::AppState,
    store::{timestamp, Document},
};

pub fn update_routes() -> Router<AppState> {
    Router::new()
        .route("/updates", get(list_updates).post(create_update))
        .route(
            "/updates/:id",
            get(get_update).put(update_update).delete(delete_update),
        )
}

fn require_text(field: &str, value: Option<&str>) -> AppResult<()> {
    match value {
        Some(v) if v.trim().is_empty() => Err(AppError::BadRequest(format!("{field} cannot be empty"))),
        _ => Ok(()),
    }
}

#[instrument(skip(state, payload), fields(uid = %user.uid))]
pub async fn create_update(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateUpdateRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Document<Update>>)> {
    let Json(body) = payload?;
    require_text("title", Some(&body.title))?;
    require_text("content", Some(&body.content))?;

    let now = timestamp();
    let update = Update {
        title: body.title,
        content: body.content,
        school_id: user.uid.clone(),
        campaign_id: body.campaign_id.filter(|c| !c.is_empty()),
        media_url: body.media_url,
        status: body.status,
        author: body.author,
        created_at: now.clone(),
        updated_at: now,
    };

    let doc = repo::insert(state.store.as_ref(), update).await?;
    info!(update_id = %doc.id, "update posted");
    Ok((StatusCode::CREATED, Json(doc)))
}

#[instrument(skip(state))]
pub async fn list_updates(
    State(state): State<AppState>,
    Query(q): Query<ListUpdatesQuery>,
) -> AppResult<Json<UpdateList>> {
    let (updates, total) = repo::list(state.store.as_ref(), &q).await?;
    Ok(Json(UpdateList {
        updates,
        pagination: q.page_params().info(total),
    }))
}

async fn find_update(state: &AppState, id: &str) -> AppResult<Document<Update>> {
    repo::get(state.store.as_ref(), id)
        .await?
        .ok_or_else(|| AppError::NotFound("Update not found".into()))
}

async fn owned_update(state: &AppState, user: &AuthUser, id: &str) -> AppResult<Document<Update>> {
    let doc = find_update(state, id).await?;
    if doc.data.school_id != user.uid {
        warn!(uid = %user.uid, update_id = %id, "update access by non-owner");
        return Err(AppError::Forbidden("Forbidden: You do not own this update".into()));
    }
    Ok(doc)
}

#[instrument(skip(state))]
pub async fn get_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Document<Update>>> {
    find_update(&state, &id).await.map(Json)
}

#[instrument(skip(state, payload), fields(uid = %user.uid))]
pub async fn update_update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUpdateRequest>, JsonRejection>,
) -> AppResult<Json<Document<Update>>> {
    let Json(mut patch) = payload?;
    owned_update(&state, &user, &id).await?;
    require_text("title", patch.title.as_deref())?;
    require_text("content", patch.content.as_deref())?;

    patch.updated_at = timestamp();
    repo::update(state.store.as_ref(), &id, &patch)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Update not found".into()))
}

#[instrument(skip(state), fields(uid = %user.uid))]
pub async fn delete_update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<DeletedResponse>> {
    owned_update(&state, &user, &id).await?;
    repo::delete(state.store.as_ref(), &id).await?;
    info!(update_id = %id, "update deleted");
    Ok(Json(DeletedResponse {
        message: "Update deleted successfully",
        id,
    }))
}
