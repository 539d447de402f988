//! Append-only case timeline and comments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    System,
    StatusChange,
    VolunteerJoined,
    VolunteerUpdate,
    VolunteerWithdrawn,
    ReporterUpdate,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::System => "system",
            UpdateType::StatusChange => "status_change",
            UpdateType::VolunteerJoined => "volunteer_joined",
            UpdateType::VolunteerUpdate => "volunteer_update",
            UpdateType::VolunteerWithdrawn => "volunteer_withdrawn",
            UpdateType::ReporterUpdate => "reporter_update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(UpdateType::System),
            "status_change" => Some(UpdateType::StatusChange),
            "volunteer_joined" => Some(UpdateType::VolunteerJoined),
            "volunteer_update" => Some(UpdateType::VolunteerUpdate),
            "volunteer_withdrawn" => Some(UpdateType::VolunteerWithdrawn),
            "reporter_update" => Some(UpdateType::ReporterUpdate),
            _ => None,
        }
    }
}

/// Immutable timeline entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseUpdate {
    pub id: Uuid,
    pub case_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub update_type: UpdateType,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Timeline entry about to be written.
#[derive(Debug, Clone)]
pub struct NewCaseUpdate {
    pub case_id: Uuid,
    pub user_id: Option<Uuid>,
    pub update_type: UpdateType,
    pub content: String,
    pub old_status: Option<String>,
    pub new_status: Option<String>,
}

impl NewCaseUpdate {
    pub fn new(case_id: Uuid, update_type: UpdateType, content: impl Into<String>) -> Self {
        Self {
            case_id,
            user_id: None,
            update_type,
            content: content.into(),
            old_status: None,
            new_status: None,
        }
    }

    pub fn by(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn statuses(mut self, old: &str, new: &str) -> Self {
        self.old_status = Some(old.to_string());
        self.new_status = Some(new.to_string());
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostUpdateRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub case_id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}
