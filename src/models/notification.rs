//! Notification payloads and the persisted in-app inbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Case, CaseType, Urgency};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewCaseNearby,
    CaseAccepted,
    VolunteerJoined,
    CaseResolved,
    CaseUpdate,
    System,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewCaseNearby => "new_case_nearby",
            NotificationType::CaseAccepted => "case_accepted",
            NotificationType::VolunteerJoined => "volunteer_joined",
            NotificationType::CaseResolved => "case_resolved",
            NotificationType::CaseUpdate => "case_update",
            NotificationType::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new_case_nearby" => Some(NotificationType::NewCaseNearby),
            "case_accepted" => Some(NotificationType::CaseAccepted),
            "volunteer_joined" => Some(NotificationType::VolunteerJoined),
            "case_resolved" => Some(NotificationType::CaseResolved),
            "case_update" => Some(NotificationType::CaseUpdate),
            "system" => Some(NotificationType::System),
            _ => None,
        }
    }
}

/// What a transport delivers to a recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_type: Option<CaseType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency: Option<Urgency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl NotificationPayload {
    pub fn new(kind: NotificationType, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
            case_id: None,
            case_type: None,
            urgency: None,
            distance_km: None,
        }
    }

    /// Attach the identifying fields of `case`.
    pub fn for_case(mut self, case: &Case) -> Self {
        self.case_id = Some(case.id);
        self.case_type = Some(case.case_type);
        self.urgency = Some(case.urgency);
        self
    }

    pub fn with_distance(mut self, distance_km: f64) -> Self {
        self.distance_km = Some(distance_km);
        self
    }
}

/// Inbox row written by the default transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(flatten)]
    pub payload: NotificationPayload,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Inbox page plus the caller's unread count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbox {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}
