use anyhow::Context;
use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{KeyScheme, UploadConfig};
use crate::error::AppError;
use crate::storage::StorageClient;

/// Declared MIME types accepted for upload.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

pub const DEFAULT_FOLDER: &str = "uploads";
pub const MAX_FILES_PER_REQUEST: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file provided")]
    Missing,
    #[error("File is empty")]
    Empty,
    #[error("File too large: {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
    #[error("Invalid file type: {0}")]
    UnsupportedType(String),
    #[error("Too many files: at most {0} per request")]
    TooMany(usize),
    #[error("Failed to upload file")]
    Storage(#[source] anyhow::Error),
}

impl From<UploadError> for AppError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Storage(inner) => AppError::Internal(inner.context("upload to storage")),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

/// A file received from a client, before validation.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub declared_type: String,
    pub body: Bytes,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub url: String,
    pub key: String,
    pub file_name: String,
    pub content_type: &'static str,
    pub size: usize,
}

/// Result of an existence check against the object store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl FileStatus {
    pub fn missing() -> Self {
        Self::default()
    }
}

pub fn validate(file: &IncomingFile, max_bytes: usize) -> Result<(), UploadError> {
    if file.body.is_empty() {
        return Err(UploadError::Empty);
    }
    if file.body.len() > max_bytes {
        return Err(UploadError::TooLarge {
            size: file.body.len(),
            max: max_bytes,
        });
    }
    let declared = file.declared_type.to_ascii_lowercase();
    if !ALLOWED_MIME_TYPES.contains(&declared.as_str()) {
        return Err(UploadError::UnsupportedType(file.declared_type.clone()));
    }
    Ok(())
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

fn extension_of(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}

/// Reduce a client-supplied name to `[A-Za-z0-9._-]`, keeping only the last path component.
pub fn sanitize_file_name(name: &str) -> String {
    lazy_static! {
        static ref UNSAFE: Regex = Regex::new(r"[^A-Za-z0-9._-]").unwrap();
        static ref UNDERSCORES: Regex = Regex::new(r"_+").unwrap();
    }
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned = UNSAFE.replace_all(base, "_");
    let cleaned = UNDERSCORES.replace_all(&cleaned, "_");
    let cleaned = cleaned.trim_start_matches(['.', '_']);
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Keep only plain path segments; never lets a key escape its folder.
pub fn sanitize_folder(folder: &str) -> String {
    lazy_static! {
        static ref SEGMENT: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
    }
    let segments: Vec<&str> = folder
        .split(['/', '\\'])
        .map(str::trim)
        .filter(|s| SEGMENT.is_match(s))
        .collect();
    if segments.is_empty() {
        DEFAULT_FOLDER.to_string()
    } else {
        segments.join("/")
    }
}

pub fn build_key(folder: &str, original_name: &str, scheme: KeyScheme, now_millis: i128, id: Uuid) -> String {
    let folder = sanitize_folder(folder);
    match scheme {
        KeyScheme::Timestamp => format!("{folder}/{now_millis}_{}", sanitize_file_name(original_name)),
        KeyScheme::Uuid => match extension_of(original_name) {
            Some(ext) => format!("{folder}/{id}.{}", sanitize_file_name(ext).to_ascii_lowercase()),
            None => format!("{folder}/{id}"),
        },
    }
}

/// Human-readable name for a storage key: the last segment without its
/// timestamp or UUID prefix.
pub fn display_name_from_key(key: &str) -> String {
    lazy_static! {
        static ref TIMESTAMP_PREFIX: Regex = Regex::new(r"^\d+_(.+)$").unwrap();
        static ref UUID_PREFIX: Regex = Regex::new(
            r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}[_-](.+)$"
        )
        .unwrap();
    }
    let segment = key.rsplit('/').next().unwrap_or(key);
    TIMESTAMP_PREFIX
        .captures(segment)
        .or_else(|| UUID_PREFIX.captures(segment))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| segment.to_string())
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

pub async fn upload_file(
    storage: &dyn StorageClient,
    cfg: &UploadConfig,
    folder: &str,
    file: IncomingFile,
) -> Result<UploadedFile, UploadError> {
    validate(&file, cfg.max_bytes)?;

    let now_millis = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let key = build_key(folder, &file.original_name, cfg.key_scheme, now_millis, Uuid::new_v4());
    let content_type = content_type_for(extension_of(&file.original_name).unwrap_or_default());
    let size = file.body.len();

    storage
        .put_object(&key, file.body, content_type)
        .await
        .with_context(|| format!("put_object {key}"))
        .map_err(UploadError::Storage)?;

    info!(%key, size, content_type, "file uploaded");
    Ok(UploadedFile {
        url: storage.public_url(&key),
        file_name: display_name_from_key(&key),
        key,
        content_type,
        size,
    })
}

/// Validate every file first so that a bad file rejects the whole batch
/// before anything is written.
pub async fn upload_many(
    storage: &dyn StorageClient,
    cfg: &UploadConfig,
    folder: &str,
    files: Vec<IncomingFile>,
) -> Result<Vec<UploadedFile>, UploadError> {
    if files.is_empty() {
        return Err(UploadError::Missing);
    }
    if files.len() > MAX_FILES_PER_REQUEST {
        return Err(UploadError::TooMany(MAX_FILES_PER_REQUEST));
    }
    for f in &files {
        validate(f, cfg.max_bytes)?;
    }
    let mut out = Vec::with_capacity(files.len());
    for f in files {
        out.push(upload_file(storage, cfg, folder, f).await?);
    }
    Ok(out)
}

/// `exists: false` when the object is gone; other storage failures propagate.
pub async fn check_file_exists(storage: &dyn StorageClient, key: &str) -> anyhow::Result<FileStatus> {
    let Some(head) = storage.head_object(key).await? else {
        debug!(%key, "file not found");
        return Ok(FileStatus::missing());
    };
    Ok(FileStatus {
        exists: true,
        file_name: Some(display_name_from_key(key)),
        size: Some(head.size),
        formatted_size: Some(format_size(head.size)),
        last_modified: head.last_modified,
        content_type: head.content_type,
    })
}

pub async fn delete_file(storage: &dyn StorageClient, key: &str) -> anyhow::Result<()> {
    storage
        .delete_object(key)
        .await
        .with_context(|| format!("delete_object {key}"))?;
    info!(%key, "file deleted");
    Ok(())
}
