use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{CreateSchoolRequest, ListSchoolsQuery, School, SchoolList, UpdateSchoolRequest},
    repo,
};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    state::AppState,
    store::{timestamp, Document},
};

pub fn school_routes() -> Router<AppState> {
    Router::new()
        .route("/schools", get(get_own_school).post(create_school).put(update_own_school))
        .route("/schools/all", get(list_schools))
        .route("/schools/:id", get(get_school).put(update_school))
}

/// Creates (or replaces) the caller's school profile.
#[instrument(skip(state, payload), fields(uid = %user.uid))]
pub async fn create_school(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateSchoolRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Document<School>>)> {
    let Json(body) = payload?;
    if body.school_name.trim().is_empty() {
        return Err(AppError::BadRequest("schoolName is required".into()));
    }

    let now = timestamp();
    let school = School {
        school_name: body.school_name.trim().to_string(),
        country: body.country,
        city: body.city,
        school_type: body.school_type,
        challenges: body.challenges,
        contact_name: body.contact_name,
        email: body.email,
        phone: body.phone,
        profile_image: body.profile_image,
        students: body.students,
        teachers: body.teachers,
        created_at: now.clone(),
        updated_at: now,
    };

    let doc = repo::upsert(state.store.as_ref(), &user.uid, school).await?;
    info!("school profile saved");
    Ok((StatusCode::CREATED, Json(doc)))
}

async fn load_school(state: &AppState, id: &str) -> AppResult<Json<Document<School>>> {
    repo::get(state.store.as_ref(), id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("School not found".into()))
}

#[instrument(skip(state), fields(uid = %user.uid))]
pub async fn get_own_school(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Document<School>>> {
    load_school(&state, &user.uid).await
}

#[instrument(skip(state, _user))]
pub async fn get_school(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Document<School>>> {
    load_school(&state, &id).await
}

async fn apply_update(
    state: &AppState,
    user: &AuthUser,
    id: &str,
    mut patch: UpdateSchoolRequest,
) -> AppResult<Json<Document<School>>> {
    if user.uid != id {
        warn!(uid = %user.uid, school_id = %id, "school update by non-owner");
        return Err(AppError::Forbidden(
            "Forbidden: You do not have permission to access this school".into(),
        ));
    }
    if patch
        .school_name
        .as_deref()
        .is_some_and(|n| n.trim().is_empty())
    {
        return Err(AppError::BadRequest("schoolName cannot be empty".into()));
    }

    patch.updated_at = timestamp();
    repo::update(state.store.as_ref(), id, &patch)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("School not found".into()))
}

#[instrument(skip(state, payload), fields(uid = %user.uid))]
pub async fn update_own_school(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<UpdateSchoolRequest>, JsonRejection>,
) -> AppResult<Json<Document<School>>> {
    let Json(patch) = payload?;
    let id = user.uid.clone();
    apply_update(&state, &user, &id, patch).await
}

#[instrument(skip(state, payload), fields(uid = %user.uid))]
pub async fn update_school(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateSchoolRequest>, JsonRejection>,
) -> AppResult<Json<Document<School>>> {
    let Json(patch) = payload?;
    apply_update(&state, &user, &id, patch).await
}

#[instrument(skip(state), fields(uid = %user.uid))]
pub async fn list_schools(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<ListSchoolsQuery>,
) -> AppResult<Json<SchoolList>> {
    user.require_admin()?;
    let page = q.page_params();
    let (schools, total) = repo::list(state.store.as_ref(), &page).await?;
    Ok(Json(SchoolList {
        schools,
        pagination: page.info(total),
    }))
}
