//! Users, volunteer availability and notification preferences.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CaseType;
use crate::errors::AppError;
use crate::geo::GeoPoint;

pub const DEFAULT_NOTIFICATION_RADIUS_KM: f64 = 10.0;
pub const MAX_NOTIFICATION_RADIUS_KM: f64 = 100.0;

/// A registered user. Any user may report cases or volunteer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub is_available: bool,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_updated_at: Option<DateTime<Utc>>,
    pub total_cases_reported: i64,
    pub total_cases_resolved: i64,
    pub created_at: DateTime<Utc>,
}

/// Daily window during which a volunteer does not want push alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl QuietHours {
    /// Whether `now` falls inside `[start, end)`. A window whose start is after
    /// its end wraps past midnight; an empty window never matches.
    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start == self.end {
            return false;
        }
        if self.start < self.end {
            now >= self.start && now < self.end
        } else {
            now >= self.start || now < self.end
        }
    }

    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Some(Self {
            start: hhmm::parse(start)?,
            end: hhmm::parse(end)?,
        })
    }
}

/// Notification preferences for a volunteer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub push_enabled: bool,
    pub case_types: Vec<CaseType>,
    pub notification_radius_km: f64,
    pub use_current_location: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet_hours: Option<QuietHours>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            push_enabled: true,
            case_types: CaseType::ALL.to_vec(),
            notification_radius_km: DEFAULT_NOTIFICATION_RADIUS_KM,
            use_current_location: true,
            center: None,
            quiet_hours: None,
        }
    }
}

impl Preferences {
    /// The point distances are measured from: the fixed center when the
    /// volunteer opted out of live location and set one, else the live location.
    pub fn effective_location(&self, current: Option<GeoPoint>) -> Option<GeoPoint> {
        match (self.use_current_location, self.center) {
            (false, Some(center)) => Some(center),
            _ => current,
        }
    }

    pub fn accepts(&self, case_type: CaseType) -> bool {
        self.case_types.contains(&case_type)
    }
}

/// An available volunteer pulled from storage for matching.
#[derive(Debug, Clone)]
pub struct VolunteerCandidate {
    pub user_id: Uuid,
    pub display_name: String,
    pub location: Option<GeoPoint>,
    pub preferences: Preferences,
}

/// Request body for registering a user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Partial profile update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl UpdateUserRequest {
    /// Trim the fields and check their shape. Phone uniqueness is checked by
    /// storage.
    pub fn normalized(mut self) -> Result<Self, AppError> {
        if let Some(name) = self.display_name.take() {
            let name = name.trim().to_string();
            if !(2..=100).contains(&name.chars().count()) {
                return Err(AppError::Validation(
                    "displayName must be 2 to 100 characters".to_string(),
                ));
            }
            self.display_name = Some(name);
        }
        if let Some(phone) = self.phone.take() {
            let phone = phone.trim().to_string();
            if !(10..=20).contains(&phone.len()) {
                return Err(AppError::Validation(
                    "phone must be 10 to 20 characters".to_string(),
                ));
            }
            self.phone = Some(phone);
        }
        if let Some(email) = self.email.take() {
            let email = email.trim().to_string();
            if !email.contains('@') {
                return Err(AppError::Validation("email is not valid".to_string()));
            }
            self.email = Some(email);
        }
        Ok(self)
    }
}

/// Activity summary for a user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub cases_reported: i64,
    /// Every case the user ever accepted, withdrawn ones included
    pub cases_accepted: i64,
    pub cases_completed: i64,
    pub cases_in_progress: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePlatform {
    Ios,
    Android,
    Web,
}

impl DevicePlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            DevicePlatform::Ios => "ios",
            DevicePlatform::Android => "android",
            DevicePlatform::Web => "web",
        }
    }
}

/// A device registered for push delivery. A token belongs to one user at a
/// time; registering it again moves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushToken {
    pub token: String,
    pub user_id: Uuid,
    pub platform: DevicePlatform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub is_active: bool,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPushTokenRequest {
    pub token: String,
    pub platform: DevicePlatform,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAvailabilityRequest {
    pub is_available: bool,
}

/// Partial preferences update. Quiet hours are `HH:MM` strings; send both or
/// neither, or set `clearQuietHours`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePreferencesRequest {
    #[serde(default)]
    pub push_enabled: Option<bool>,
    #[serde(default)]
    pub case_types: Option<Vec<CaseType>>,
    #[serde(default)]
    pub notification_radius_km: Option<f64>,
    #[serde(default)]
    pub use_current_location: Option<bool>,
    #[serde(default)]
    pub center: Option<GeoPoint>,
    #[serde(default)]
    pub quiet_hours_start: Option<String>,
    #[serde(default)]
    pub quiet_hours_end: Option<String>,
    #[serde(default)]
    pub clear_quiet_hours: bool,
}

impl UpdatePreferencesRequest {
    /// Apply this patch on top of `current`, validating the result.
    pub fn apply_to(&self, current: &Preferences) -> Result<Preferences, AppError> {
        let mut next = current.clone();

        if let Some(push_enabled) = self.push_enabled {
            next.push_enabled = push_enabled;
        }
        if let Some(case_types) = &self.case_types {
            next.case_types.clear();
            for case_type in case_types {
                if !next.case_types.contains(case_type) {
                    next.case_types.push(*case_type);
                }
            }
        }
        if let Some(radius) = self.notification_radius_km {
            if !(1.0..=MAX_NOTIFICATION_RADIUS_KM).contains(&radius) {
                return Err(AppError::Validation(format!(
                    "notificationRadiusKm must be between 1 and {}",
                    MAX_NOTIFICATION_RADIUS_KM
                )));
            }
            next.notification_radius_km = radius;
        }
        if let Some(use_current) = self.use_current_location {
            next.use_current_location = use_current;
        }
        if let Some(center) = self.center {
            if !center.is_valid() {
                return Err(AppError::Validation("center is out of range".to_string()));
            }
            next.center = Some(center);
        }

        if self.clear_quiet_hours {
            next.quiet_hours = None;
        }
        match (&self.quiet_hours_start, &self.quiet_hours_end) {
            (Some(start), Some(end)) => {
                next.quiet_hours = Some(QuietHours::parse(start, end).ok_or_else(|| {
                    AppError::Validation("Quiet hours must be HH:MM".to_string())
                })?);
            }
            (None, None) => {}
            _ => {
                return Err(AppError::Validation(
                    "quietHoursStart and quietHoursEnd must be set together".to_string(),
                ))
            }
        }

        Ok(next)
    }
}

pub(crate) mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn parse(s: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(s.trim(), FORMAT).ok()
    }

    pub fn format(time: &NaiveTime) -> String {
        time.format(FORMAT).to_string()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time {:?}", raw)))
    }
}
