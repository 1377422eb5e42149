use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path,
        Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{
        Campaign, CampaignList, CampaignView, CreateCampaignRequest, DeletedResponse, ImpactReport,
        ListCampaignsQuery, UpdateCampaignRequest, STATUSES,
    },
    repo, services,
};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    state::AppState,
    store::{timestamp, Document},
    upload::{
        handlers::{read_multipart, MultipartUpload, MULTIPART_BODY_LIMIT},
        services::{upload_file, UploadError},
    },
};

pub fn campaign_routes() -> Router<AppState> {
    Router::new()
        .route("/campaigns", get(list_campaigns).post(create_campaign))
        .route("/campaigns/school", get(list_own_campaigns))
        .route("/campaigns/school/:school_id", get(list_school_campaigns))
        .route(
            "/campaigns/:id",
            get(get_campaign).put(update_campaign).delete(delete_campaign),
        )
        .route(
            "/campaigns/:id/impact-report",
            post(upload_impact_report).layer(DefaultBodyLimit::max(MULTIPART_BODY_LIMIT)),
        )
}

fn valid_goal(goal: f64) -> bool {
    goal.is_finite() && goal > 0.0
}

fn check_status(status: &str) -> AppResult<()> {
    if STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("Invalid campaign status: {status}")))
    }
}

#[instrument(skip(state, payload), fields(uid = %user.uid))]
pub async fn create_campaign(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateCampaignRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<CampaignView>)> {
    let Json(body) = payload?;
    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("Campaign name is required".into()));
    }
    if !valid_goal(body.goal) {
        return Err(AppError::BadRequest("Campaign goal must be greater than 0".into()));
    }

    let now = timestamp();
    let campaign = Campaign {
        name: body.name.trim().to_string(),
        description: body.description,
        goal: body.goal,
        start_date: body.start_date,
        end_date: body.end_date,
        category: body.category,
        amount_raised: 0.0,
        status: "active".into(),
        media_url: body.media_url,
        additional_images: body.additional_images,
        school_id: user.uid.clone(),
        featured: false,
        location: body.location,
        organizer: body.organizer,
        impact_report: None,
        created_at: now.clone(),
        updated_at: now,
    };

    let doc = repo::insert(state.store.as_ref(), campaign).await?;
    info!(campaign_id = %doc.id, "campaign created");
    Ok((StatusCode::CREATED, Json(doc.into())))
}

#[instrument(skip(state))]
pub async fn list_campaigns(
    State(state): State<AppState>,
    Query(q): Query<ListCampaignsQuery>,
) -> AppResult<Json<CampaignList>> {
    let (docs, total) = repo::list(state.store.as_ref(), &q).await?;
    let docs = services::populate_all(state.store.as_ref(), docs).await;
    Ok(Json(CampaignList {
        campaigns: docs.into_iter().map(CampaignView::from).collect(),
        pagination: q.page_params().info(total),
    }))
}

#[instrument(skip(state))]
pub async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<CampaignView>> {
    let doc = find_campaign(&state, &id).await?;
    let doc = services::populate(state.store.as_ref(), doc).await;
    Ok(Json(doc.into()))
}

async fn school_campaigns(state: &AppState, school_id: &str) -> AppResult<Json<Vec<CampaignView>>> {
    let docs = repo::list_by_school(state.store.as_ref(), school_id).await?;
    let docs = services::populate_all(state.store.as_ref(), docs).await;
    Ok(Json(docs.into_iter().map(CampaignView::from).collect()))
}

#[instrument(skip(state), fields(uid = %user.uid))]
pub async fn list_own_campaigns(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Vec<CampaignView>>> {
    school_campaigns(&state, &user.uid).await
}

#[instrument(skip(state, _user))]
pub async fn list_school_campaigns(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(school_id): Path<String>,
) -> AppResult<Json<Vec<CampaignView>>> {
    school_campaigns(&state, &school_id).await
}

async fn find_campaign(state: &AppState, id: &str) -> AppResult<Document<Campaign>> {
    repo::get(state.store.as_ref(), id)
        .await?
        .ok_or_else(|| AppError::NotFound("Campaign not found".into()))
}

/// Loads the campaign and checks that the caller's school owns it.
async fn owned_campaign(state: &AppState, user: &AuthUser, id: &str) -> AppResult<Document<Campaign>> {
    let doc = find_campaign(state, id).await?;
    if doc.data.school_id != user.uid {
        warn!(uid = %user.uid, campaign_id = %id, "campaign access by non-owner");
        return Err(AppError::Forbidden(
            "Forbidden: You do not have permission to modify this campaign".into(),
        ));
    }
    Ok(doc)
}

#[instrument(skip(state, payload), fields(uid = %user.uid))]
pub async fn update_campaign(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateCampaignRequest>, JsonRejection>,
) -> AppResult<Json<CampaignView>> {
    let Json(mut patch) = payload?;
    owned_campaign(&state, &user, &id).await?;

    if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("Campaign name cannot be empty".into()));
    }
    if patch.goal.is_some_and(|g| !valid_goal(g)) {
        return Err(AppError::BadRequest("Campaign goal must be greater than 0".into()));
    }
    if let Some(status) = patch.status.as_deref() {
        check_status(status)?;
    }

    patch.updated_at = timestamp();
    let doc = repo::update(state.store.as_ref(), &id, &patch)
        .await?
        .ok_or_else(|| AppError::NotFound("Campaign not found".into()))?;
    info!(campaign_id = %id, "campaign updated");
    Ok(Json(doc.into()))
}

#[instrument(skip(state), fields(uid = %user.uid))]
pub async fn delete_campaign(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<DeletedResponse>> {
    owned_campaign(&state, &user, &id).await?;
    repo::delete(state.store.as_ref(), &id).await?;
    info!(campaign_id = %id, "campaign deleted");
    Ok(Json(DeletedResponse {
        message: "Campaign deleted successfully",
        id,
    }))
}

/// Uploads the impact report file and records it on the campaign.
#[instrument(skip(state, mp), fields(uid = %user.uid))]
pub async fn upload_impact_report(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    mp: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<CampaignView>> {
    owned_campaign(&state, &user, &id).await?;
    let MultipartUpload { files, .. } = read_multipart(mp?).await?;
    let file = files.into_iter().next().ok_or(UploadError::Missing)?;

    let folder = format!("impact-reports/{id}");
    let uploaded = upload_file(state.storage.as_ref(), &state.config.upload, &folder, file).await?;

    let now = timestamp();
    let patch = UpdateCampaignRequest {
        impact_report: Some(ImpactReport {
            url: uploaded.url,
            upload_date: now.clone(),
            file_name: Some(uploaded.file_name),
        }),
        updated_at: now,
        ..Default::default()
    };
    let doc = repo::update(state.store.as_ref(), &id, &patch)
        .await?
        .ok_or_else(|| AppError::NotFound("Campaign not found".into()))?;
    info!(campaign_id = %id, key = %uploaded.key, "impact report attached");
    Ok(Json(doc.into()))
}
