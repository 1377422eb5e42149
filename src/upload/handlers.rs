use std::time::Duration;

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{
    poller::wait_for_file,
    services::{
        check_file_exists, delete_file, upload_file, upload_many, FileStatus, IncomingFile,
        UploadError, UploadedFile, DEFAULT_FOLDER,
    },
};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    state::AppState,
};

/// Hard cap on a whole multipart body; per-file limits are checked separately.
pub const MULTIPART_BODY_LIMIT: usize = 64 * 1024 * 1024;
pub const MAX_STATUS_WAIT_SECS: u64 = 60;

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_single).delete(delete_uploaded))
        .route("/upload/multiple", post(upload_multiple))
        .route("/upload/status", get(file_status))
        .layer(DefaultBodyLimit::max(MULTIPART_BODY_LIMIT))
}

/// Files and the optional `folder` text field of a multipart body.
pub struct MultipartUpload {
    pub files: Vec<IncomingFile>,
    pub folder: Option<String>,
}

pub async fn read_multipart(mut mp: Multipart) -> AppResult<MultipartUpload> {
    let mut files = Vec::new();
    let mut folder = None;
    while let Some(field) = mp.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") | Some("files") | Some("files[]") => {
                let original_name = field.file_name().unwrap_or("file").to_string();
                let declared_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let body = field.bytes().await?;
                files.push(IncomingFile {
                    original_name,
                    declared_type,
                    body,
                });
            }
            Some("folder") => {
                folder = Some(field.text().await?);
            }
            _ => {}
        }
    }
    Ok(MultipartUpload { files, folder })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
    pub key: String,
    pub file_name: String,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MultiUploadResponse {
    pub urls: Vec<String>,
    pub files: Vec<UploadedFile>,
    pub message: &'static str,
}

#[instrument(skip(state, mp), fields(uid = %user.uid))]
pub async fn upload_single(
    State(state): State<AppState>,
    user: AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<UploadResponse>> {
    let MultipartUpload { files, folder } = read_multipart(mp?).await?;
    let file = files.into_iter().next().ok_or(UploadError::Missing)?;
    let folder = folder.unwrap_or_else(|| DEFAULT_FOLDER.to_string());

    let uploaded = upload_file(state.storage.as_ref(), &state.config.upload, &folder, file).await?;
    Ok(Json(UploadResponse {
        url: uploaded.url,
        key: uploaded.key,
        file_name: uploaded.file_name,
        message: "File uploaded successfully",
    }))
}

#[instrument(skip(state, mp), fields(uid = %user.uid))]
pub async fn upload_multiple(
    State(state): State<AppState>,
    user: AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<MultiUploadResponse>> {
    let MultipartUpload { files, folder } = read_multipart(mp?).await?;
    let folder = folder.unwrap_or_else(|| DEFAULT_FOLDER.to_string());

    let uploaded = upload_many(state.storage.as_ref(), &state.config.upload, &folder, files).await?;
    info!(count = uploaded.len(), "files uploaded");
    Ok(Json(MultiUploadResponse {
        urls: uploaded.iter().map(|f| f.url.clone()).collect(),
        files: uploaded,
        message: "Files uploaded successfully",
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub file_url: Option<String>,
    pub key: Option<String>,
    /// Seconds to keep polling until the object shows up.
    pub wait: Option<u64>,
}

impl FileRef {
    fn resolve_key(&self, state: &AppState) -> AppResult<String> {
        if let Some(key) = self.key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(key.trim_start_matches('/').to_string());
        }
        let url = self
            .file_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AppError::BadRequest("fileUrl is required".into()))?;
        state
            .storage
            .key_from_url(url)
            .ok_or_else(|| AppError::BadRequest("fileUrl does not point to this storage bucket".into()))
    }
}

#[instrument(skip(state, _user))]
pub async fn file_status(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(q): Query<FileRef>,
) -> AppResult<Json<FileStatus>> {
    let key = q.resolve_key(&state)?;
    let status = match q.wait.filter(|w| *w > 0) {
        Some(wait) => {
            let wait = Duration::from_secs(wait.min(MAX_STATUS_WAIT_SECS));
            let every = Duration::from_secs(state.config.upload.status_poll_secs.max(1));
            wait_for_file(state.storage.as_ref(), &key, every, wait).await?
        }
        None => check_file_exists(state.storage.as_ref(), &key).await?,
    };
    Ok(Json(status))
}

#[derive(Debug, Serialize)]
pub struct DeleteFileResponse {
    pub message: &'static str,
    pub key: String,
}

#[instrument(skip(state), fields(uid = %user.uid))]
pub async fn delete_uploaded(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<FileRef>,
) -> AppResult<Json<DeleteFileResponse>> {
    user.require_admin()?;
    let key = q.resolve_key(&state)?;
    delete_file(state.storage.as_ref(), &key).await?;
    Ok(Json(DeleteFileResponse {
        message: "File deleted successfully",
        key,
    }))
}
