use serde::{Deserialize, Serialize};

use crate::pagination::{PageInfo, PageParams};
use crate::store::Document;

pub const STATUSES: &[&str] = &["draft", "active", "completed", "cancelled", "paused"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Location {
    pub city: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Organizer {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImpactReport {
    pub url: String,
    pub upload_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Campaign {
    pub name: String,
    pub description: String,
    pub goal: f64,
    pub start_date: String,
    pub end_date: String,
    pub category: String,
    pub amount_raised: f64,
    pub status: String,
    pub media_url: String,
    pub additional_images: Vec<String>,
    pub school_id: String,
    pub featured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<Organizer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact_report: Option<ImpactReport>,
    pub created_at: String,
    pub updated_at: String,
}

impl Campaign {
    /// Progress towards the goal, 0..=100.
    pub fn progress_percentage(&self) -> f64 {
        if self.goal <= 0.0 {
            return 0.0;
        }
        (self.amount_raised / self.goal * 100.0).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub goal: f64,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub media_url: String,
    #[serde(default)]
    pub additional_images: Vec<String>,
    pub location: Option<Location>,
    pub organizer: Option<Organizer>,
}

/// Partial update; `schoolId` and `createdAt` are not patchable.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCampaignRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_raised: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<Organizer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact_report: Option<ImpactReport>,
    #[serde(skip_deserializing)]
    pub updated_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListCampaignsQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub featured: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl ListCampaignsQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

/// Campaign as returned to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignView {
    #[serde(flatten)]
    pub campaign: Document<Campaign>,
    pub progress_percentage: f64,
}

impl From<Document<Campaign>> for CampaignView {
    fn from(doc: Document<Campaign>) -> Self {
        Self {
            progress_percentage: doc.data.progress_percentage(),
            campaign: doc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CampaignList {
    pub campaigns: Vec<CampaignView>,
    pub pagination: PageInfo,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub message: &'static str,
    pub id: String,
}
