//! A volunteer's engagement with one case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

/// Volunteer-on-case status. See [`crate::lifecycle`] for the legal moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolunteerStatus {
    Accepted,
    EnRoute,
    OnSite,
    Handling,
    Completed,
    Withdrawn,
}

impl VolunteerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolunteerStatus::Accepted => "accepted",
            VolunteerStatus::EnRoute => "en_route",
            VolunteerStatus::OnSite => "on_site",
            VolunteerStatus::Handling => "handling",
            VolunteerStatus::Completed => "completed",
            VolunteerStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accepted" => Some(VolunteerStatus::Accepted),
            "en_route" => Some(VolunteerStatus::EnRoute),
            "on_site" => Some(VolunteerStatus::OnSite),
            "handling" => Some(VolunteerStatus::Handling),
            "completed" => Some(VolunteerStatus::Completed),
            "withdrawn" => Some(VolunteerStatus::Withdrawn),
            _ => None,
        }
    }

    /// Human phrase used in timeline entries.
    pub fn describe(&self) -> &'static str {
        match self {
            VolunteerStatus::Accepted => "accepted the case",
            VolunteerStatus::EnRoute => "is on the way",
            VolunteerStatus::OnSite => "arrived on site",
            VolunteerStatus::Handling => "is handling the situation",
            VolunteerStatus::Completed => "completed their work",
            VolunteerStatus::Withdrawn => "left the case",
        }
    }
}

/// Link between a case and a volunteer. Unique per (case, volunteer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseVolunteer {
    pub id: Uuid,
    pub case_id: Uuid,
    pub volunteer_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volunteer_name: Option<String>,
    pub status: VolunteerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_location: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    pub accepted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrived_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Request body for accepting a case.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptCaseRequest {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Request body for a volunteer progress update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVolunteerStatusRequest {
    pub status: VolunteerStatus,
    #[serde(default)]
    pub note: Option<String>,
}
