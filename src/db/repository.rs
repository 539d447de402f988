//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity. Ids are stored
//! as hyphenated TEXT and timestamps as fixed-width RFC 3339 TEXT so that string
//! ordering matches time ordering.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::errors::{codes, AppError};
use crate::geo::{BoundingBox, GeoPoint};
use crate::models::{
    CaseType, CreateUserRequest, DevicePlatform, Preferences, PushToken, QuietHours,
    RegisterPushTokenRequest, UpdateUserRequest, User, UserStats, VolunteerCandidate,
};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Start a transaction. Callers write the case row first to take the lock.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, AppError> {
        Ok(self.pool.begin().await?)
    }

    // ==================== USER OPERATIONS ====================

    /// Register a user with default preferences.
    pub async fn create_user(&self, request: &CreateUserRequest) -> Result<User, AppError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let prefs = Preferences::default();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO users (id, display_name, email, phone, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&request.display_name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(ts(&now))
        .bind(ts(&now))
        .execute(&mut *tx)
        .await?;

        write_preferences(&mut *tx, id, &prefs, &now).await?;

        tx.commit().await?;

        Ok(User {
            id,
            display_name: request.display_name.clone(),
            email: request.email.clone(),
            phone: request.phone.clone(),
            is_available: true,
            is_active: true,
            location: None,
            location_updated_at: None,
            total_cases_reported: 0,
            total_cases_resolved: 0,
            created_at: now,
        })
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query(
            "SELECT id, display_name, email, phone, is_available, is_active, latitude, longitude, location_updated_at, total_cases_reported, total_cases_resolved, created_at FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Get a user or fail with `USER_NOT_FOUND`.
    pub async fn require_user(&self, id: Uuid) -> Result<User, AppError> {
        self.get_user(id)
            .await?
            .ok_or_else(|| AppError::user_not_found(id))
    }

    /// Apply a normalized profile patch. A phone number may belong to one user
    /// only.
    pub async fn update_profile(
        &self,
        id: Uuid,
        patch: &UpdateUserRequest,
    ) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await?;

        if let Some(phone) = &patch.phone {
            let taken = sqlx::query("SELECT id FROM users WHERE phone = ? AND id != ?")
                .bind(phone)
                .bind(id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
            if taken.is_some() {
                return Err(AppError::conflict(
                    codes::PHONE_EXISTS,
                    "Phone number is already registered",
                ));
            }
        }

        let result = sqlx::query(
            r#"
            UPDATE users SET
                display_name = COALESCE(?, display_name),
                email = COALESCE(?, email),
                phone = COALESCE(?, phone),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&patch.display_name)
        .bind(&patch.email)
        .bind(&patch.phone)
        .bind(ts(&Utc::now()))
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::user_not_found(id));
        }
        tx.commit().await?;
        self.require_user(id).await
    }

    /// Reporting and volunteering totals for a user.
    pub async fn user_stats(&self, id: Uuid) -> Result<UserStats, AppError> {
        let row = sqlx::query(
            r#"
            SELECT u.total_cases_reported, u.total_cases_resolved,
                   (SELECT COUNT(*) FROM case_volunteers v WHERE v.volunteer_id = u.id) AS accepted,
                   (SELECT COUNT(*) FROM case_volunteers v
                     WHERE v.volunteer_id = u.id
                       AND v.status IN ('accepted', 'en_route', 'on_site', 'handling')) AS in_progress
            FROM users u
            WHERE u.id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::user_not_found(id))?;

        Ok(UserStats {
            cases_reported: row.get("total_cases_reported"),
            cases_accepted: row.get("accepted"),
            cases_completed: row.get("total_cases_resolved"),
            cases_in_progress: row.get("in_progress"),
        })
    }

    pub async fn update_location(&self, id: Uuid, point: GeoPoint) -> Result<User, AppError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE users SET latitude = ?, longitude = ?, location_updated_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(point.latitude)
        .bind(point.longitude)
        .bind(ts(&now))
        .bind(ts(&now))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::user_not_found(id));
        }
        self.require_user(id).await
    }

    pub async fn set_availability(&self, id: Uuid, available: bool) -> Result<User, AppError> {
        let result =
            sqlx::query("UPDATE users SET is_available = ?, updated_at = ? WHERE id = ?")
                .bind(available as i32)
                .bind(ts(&Utc::now()))
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::user_not_found(id));
        }
        self.require_user(id).await
    }

    pub async fn increment_reported(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET total_cases_reported = total_cases_reported + 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn increment_resolved(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET total_cases_resolved = total_cases_resolved + 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== PREFERENCE OPERATIONS ====================

    /// Preferences for a user; defaults when none were stored.
    pub async fn get_preferences(&self, user_id: Uuid) -> Result<Preferences, AppError> {
        let row = sqlx::query(
            "SELECT push_enabled, case_types, notification_radius_km, use_current_location, center_latitude, center_longitude, quiet_hours_start, quiet_hours_end FROM user_preferences WHERE user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .as_ref()
            .map(preferences_from_row)
            .unwrap_or_default())
    }

    pub async fn save_preferences(
        &self,
        user_id: Uuid,
        prefs: &Preferences,
    ) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        write_preferences(&mut *conn, user_id, prefs, &Utc::now()).await
    }

    // ==================== PUSH TOKEN OPERATIONS ====================

    /// Register a device token for `user_id`, taking it over if another user
    /// had it.
    pub async fn register_push_token(
        &self,
        user_id: Uuid,
        request: &RegisterPushTokenRequest,
    ) -> Result<PushToken, AppError> {
        let now = ts(&Utc::now());
        sqlx::query(
            r#"
            INSERT INTO push_tokens (token, user_id, platform, device_id, is_active, last_used_at, created_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(token) DO UPDATE SET
                user_id = excluded.user_id,
                platform = excluded.platform,
                device_id = excluded.device_id,
                is_active = 1,
                last_used_at = excluded.last_used_at
            "#,
        )
        .bind(&request.token)
        .bind(user_id.to_string())
        .bind(request.platform.as_str())
        .bind(&request.device_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT token, user_id, platform, device_id, is_active, last_used_at, created_at FROM push_tokens WHERE token = ?",
        )
        .bind(&request.token)
        .fetch_one(&self.pool)
        .await?;
        Ok(push_token_from_row(&row))
    }

    /// Remove one of the user's tokens. Returns false when the user had no
    /// such token.
    pub async fn delete_push_token(&self, user_id: Uuid, token: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM push_tokens WHERE token = ? AND user_id = ?")
            .bind(token)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Active device tokens of a user.
    pub async fn push_tokens(&self, user_id: Uuid) -> Result<Vec<PushToken>, AppError> {
        let rows = sqlx::query(
            "SELECT token, user_id, platform, device_id, is_active, last_used_at, created_at FROM push_tokens WHERE user_id = ? AND is_active = 1 ORDER BY created_at ASC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(push_token_from_row).collect())
    }

    /// Available, active volunteers whose live location or preferred center
    /// falls inside `bbox`.
    pub async fn find_candidates(
        &self,
        bbox: &BoundingBox,
    ) -> Result<Vec<VolunteerCandidate>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.display_name, u.latitude, u.longitude,
                   p.push_enabled, p.case_types, p.notification_radius_km, p.use_current_location,
                   p.center_latitude, p.center_longitude, p.quiet_hours_start, p.quiet_hours_end
            FROM users u
            LEFT JOIN user_preferences p ON p.user_id = u.id
            WHERE u.is_available = 1 AND u.is_active = 1
              AND ((u.latitude BETWEEN ? AND ? AND u.longitude BETWEEN ? AND ?)
                OR (p.center_latitude BETWEEN ? AND ? AND p.center_longitude BETWEEN ? AND ?))
            "#,
        )
        .bind(bbox.min_lat)
        .bind(bbox.max_lat)
        .bind(bbox.min_lng)
        .bind(bbox.max_lng)
        .bind(bbox.min_lat)
        .bind(bbox.max_lat)
        .bind(bbox.min_lng)
        .bind(bbox.max_lng)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let has_prefs: Option<String> = row.get("case_types");
                VolunteerCandidate {
                    user_id: uuid_col(row, "id"),
                    display_name: row.get("display_name"),
                    location: GeoPoint::from_parts(row.get("latitude"), row.get("longitude")),
                    preferences: if has_prefs.is_some() {
                        preferences_from_row(row)
                    } else {
                        Preferences::default()
                    },
                }
            })
            .collect())
    }
}

async fn write_preferences(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    prefs: &Preferences,
    now: &DateTime<Utc>,
) -> Result<(), AppError> {
    let case_types = serde_json::to_string(&prefs.case_types)?;
    let (start, end) = match prefs.quiet_hours {
        Some(q) => (
            Some(q.start.format("%H:%M").to_string()),
            Some(q.end.format("%H:%M").to_string()),
        ),
        None => (None, None),
    };

    sqlx::query(
        r#"
        INSERT INTO user_preferences (user_id, push_enabled, case_types, notification_radius_km, use_current_location,
                                      center_latitude, center_longitude, quiet_hours_start, quiet_hours_end, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            push_enabled = excluded.push_enabled,
            case_types = excluded.case_types,
            notification_radius_km = excluded.notification_radius_km,
            use_current_location = excluded.use_current_location,
            center_latitude = excluded.center_latitude,
            center_longitude = excluded.center_longitude,
            quiet_hours_start = excluded.quiet_hours_start,
            quiet_hours_end = excluded.quiet_hours_end,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id.to_string())
    .bind(prefs.push_enabled as i32)
    .bind(case_types)
    .bind(prefs.notification_radius_km)
    .bind(prefs.use_current_location as i32)
    .bind(prefs.center.map(|c| c.latitude))
    .bind(prefs.center.map(|c| c.longitude))
    .bind(start)
    .bind(end)
    .bind(ts(now))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// Helper functions for row conversion

fn user_from_row(row: &SqliteRow) -> User {
    let is_available: i32 = row.get("is_available");
    let is_active: i32 = row.get("is_active");
    User {
        id: uuid_col(row, "id"),
        display_name: row.get("display_name"),
        email: row.get("email"),
        phone: row.get("phone"),
        is_available: is_available != 0,
        is_active: is_active != 0,
        location: GeoPoint::from_parts(row.get("latitude"), row.get("longitude")),
        location_updated_at: opt_ts_col(row, "location_updated_at"),
        total_cases_reported: row.get("total_cases_reported"),
        total_cases_resolved: row.get("total_cases_resolved"),
        created_at: ts_col(row, "created_at"),
    }
}

fn push_token_from_row(row: &SqliteRow) -> PushToken {
    let platform: String = row.get("platform");
    let is_active: i32 = row.get("is_active");
    PushToken {
        token: row.get("token"),
        user_id: uuid_col(row, "user_id"),
        platform: parse_enum(&platform).unwrap_or(DevicePlatform::Web),
        device_id: row.get("device_id"),
        is_active: is_active != 0,
        last_used_at: ts_col(row, "last_used_at"),
        created_at: ts_col(row, "created_at"),
    }
}

fn preferences_from_row(row: &SqliteRow) -> Preferences {
    let push_enabled: Option<i32> = row.get("push_enabled");
    let use_current: Option<i32> = row.get("use_current_location");
    let case_types: Option<String> = row.get("case_types");
    let start: Option<String> = row.get("quiet_hours_start");
    let end: Option<String> = row.get("quiet_hours_end");
    let defaults = Preferences::default();

    Preferences {
        push_enabled: push_enabled.map(|v| v != 0).unwrap_or(defaults.push_enabled),
        case_types: case_types
            .map(|s| parse_json_array::<CaseType>(&s))
            .unwrap_or(defaults.case_types),
        notification_radius_km: row
            .get::<Option<f64>, _>("notification_radius_km")
            .unwrap_or(defaults.notification_radius_km),
        use_current_location: use_current
            .map(|v| v != 0)
            .unwrap_or(defaults.use_current_location),
        center: GeoPoint::from_parts(row.get("center_latitude"), row.get("center_longitude")),
        quiet_hours: match (start, end) {
            (Some(start), Some(end)) => QuietHours::parse(&start, &end),
            _ => None,
        },
    }
}

/// Fixed-width UTC timestamp, lexically sortable.
pub(super) fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

pub(super) fn ts_col(row: &SqliteRow, col: &str) -> DateTime<Utc> {
    let raw: String = row.get(col);
    parse_ts(&raw)
}

pub(super) fn opt_ts_col(row: &SqliteRow, col: &str) -> Option<DateTime<Utc>> {
    let raw: Option<String> = row.get(col);
    raw.as_deref().map(parse_ts)
}

pub(super) fn uuid_col(row: &SqliteRow, col: &str) -> Uuid {
    let raw: String = row.get(col);
    Uuid::parse_str(&raw).unwrap_or_default()
}

pub(super) fn opt_uuid_col(row: &SqliteRow, col: &str) -> Option<Uuid> {
    let raw: Option<String> = row.get(col);
    raw.and_then(|s| Uuid::parse_str(&s).ok())
}

fn parse_json_array<T: DeserializeOwned>(s: &str) -> Vec<T> {
    serde_json::from_str(s).unwrap_or_default()
}

/// The serde string form of a unit enum value.
pub(super) fn enum_str<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

pub(super) fn parse_enum<T: DeserializeOwned>(s: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
}
