//! Rescue case model and its type-specific detail records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

/// Kind of emergency a case reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseType {
    Animal,
    Flood,
    Accident,
}

impl CaseType {
    pub const ALL: [CaseType; 3] = [CaseType::Animal, CaseType::Flood, CaseType::Accident];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseType::Animal => "animal",
            CaseType::Flood => "flood",
            CaseType::Accident => "accident",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "animal" => Some(CaseType::Animal),
            "flood" => Some(CaseType::Flood),
            "accident" => Some(CaseType::Accident),
            _ => None,
        }
    }
}

/// Case lifecycle status. See [`crate::lifecycle`] for the legal moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    Accepted,
    InProgress,
    Resolved,
    Cancelled,
    Expired,
}

impl CaseStatus {
    pub const ACTIVE: [CaseStatus; 3] = [
        CaseStatus::Pending,
        CaseStatus::Accepted,
        CaseStatus::InProgress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Pending => "pending",
            CaseStatus::Accepted => "accepted",
            CaseStatus::InProgress => "in_progress",
            CaseStatus::Resolved => "resolved",
            CaseStatus::Cancelled => "cancelled",
            CaseStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CaseStatus::Pending),
            "accepted" => Some(CaseStatus::Accepted),
            "in_progress" => Some(CaseStatus::InProgress),
            "resolved" => Some(CaseStatus::Resolved),
            "cancelled" => Some(CaseStatus::Cancelled),
            "expired" => Some(CaseStatus::Expired),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

/// Urgency level. Ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Urgency::Low),
            "medium" => Some(Urgency::Medium),
            "high" => Some(Urgency::High),
            "critical" => Some(Urgency::Critical),
            _ => None,
        }
    }

    /// Display rank where 1 is the most urgent.
    pub fn priority(&self) -> u8 {
        match self {
            Urgency::Critical => 1,
            Urgency::High => 2,
            Urgency::Medium => 3,
            Urgency::Low => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimalKind {
    Dog,
    Cat,
    Bird,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimalCondition {
    Injured,
    Trapped,
    Sick,
    Abandoned,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccidentKind {
    Traffic,
    Fall,
    Fire,
    Drowning,
    Electric,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimalDetails {
    pub animal_type: AnimalKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animal_type_other: Option<String>,
    pub condition: AnimalCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_description: Option<String>,
    #[serde(default = "default_count")]
    pub estimated_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloodDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub people_count: Option<i64>,
    #[serde(default)]
    pub has_children: bool,
    #[serde(default)]
    pub has_elderly: bool,
    #[serde(default)]
    pub has_disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_level_cm: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor_level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_power: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_food_water: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_needs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccidentDetails {
    pub accident_type: AccidentKind,
    #[serde(default = "default_count")]
    pub victim_count: i64,
    #[serde(default)]
    pub has_unconscious: bool,
    #[serde(default)]
    pub has_bleeding: bool,
    #[serde(default)]
    pub has_fracture: bool,
    #[serde(default)]
    pub is_trapped: bool,
    #[serde(default)]
    pub hazard_present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hazard_description: Option<String>,
}

fn default_count() -> i64 {
    1
}

/// The single detail record a case may carry, keyed by case type.
///
/// Serialized externally tagged: `{"flood": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseDetails {
    Animal(AnimalDetails),
    Flood(FloodDetails),
    Accident(AccidentDetails),
}

impl CaseDetails {
    pub fn case_type(&self) -> CaseType {
        match self {
            CaseDetails::Animal(_) => CaseType::Animal,
            CaseDetails::Flood(_) => CaseType::Flood,
            CaseDetails::Accident(_) => CaseType::Accident,
        }
    }
}

/// A rescue case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: Uuid,
    pub case_type: CaseType,
    pub status: CaseStatus,
    pub urgency: Urgency,
    pub location: GeoPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_note: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter_phone: Option<String>,
    pub is_anonymous: bool,
    pub volunteer_count: i64,
    pub max_volunteers: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<CaseDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Case {
    pub fn is_reported_by(&self, user_id: Uuid) -> bool {
        self.reporter_id == Some(user_id)
    }

    pub fn has_capacity(&self) -> bool {
        self.volunteer_count < self.max_volunteers
    }
}

/// An active case returned from the nearby query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyCase {
    pub id: Uuid,
    pub case_type: CaseType,
    pub title: String,
    pub urgency: Urgency,
    pub status: CaseStatus,
    pub location: GeoPoint,
    pub distance_km: f64,
    pub volunteer_count: i64,
    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_MAX_VOLUNTEERS: i64 = 5;

fn default_urgency() -> Urgency {
    Urgency::Medium
}

/// Request body for reporting a new case.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCaseRequest {
    pub case_type: CaseType,
    #[serde(default = "default_urgency")]
    pub urgency: Urgency,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub location_note: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reporter_name: Option<String>,
    #[serde(default)]
    pub reporter_phone: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub max_volunteers: Option<i64>,
    #[serde(default)]
    pub details: Option<CaseDetails>,
}

/// Reporter-side patch of an existing case.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCaseRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub status: Option<CaseStatus>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub location_note: Option<String>,
}

/// Filters for the case listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseFilter {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default, rename = "type")]
    pub case_type: Option<CaseType>,
    #[serde(default)]
    pub status: Option<CaseStatus>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
}
