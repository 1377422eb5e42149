use serde::{Deserialize, Serialize};

use crate::pagination::{PageInfo, PageParams};
use crate::store::Document;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StudentDemographics {
    pub male: u32,
    pub female: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDemographics {
    pub steam_involved: u32,
    pub non_steam_involved: u32,
    pub total: u32,
}

/// School profile; the document id is the owner's uid.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct School {
    pub school_name: String,
    pub country: String,
    pub city: String,
    pub school_type: String,
    pub challenges: Vec<String>,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub students: Option<StudentDemographics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teachers: Option<TeacherDemographics>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSchoolRequest {
    pub school_name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub school_type: String,
    #[serde(default)]
    pub challenges: Vec<String>,
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub profile_image: Option<String>,
    pub students: Option<StudentDemographics>,
    pub teachers: Option<TeacherDemographics>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSchoolRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenges: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub students: Option<StudentDemographics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teachers: Option<TeacherDemographics>,
    /// Always set by the server.
    #[serde(skip_deserializing)]
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ListSchoolsQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl ListSchoolsQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SchoolList {
    pub schools: Vec<Document<School>>,
    pub pagination: PageInfo,
}
