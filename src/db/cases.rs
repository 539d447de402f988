//! Case, volunteer, timeline and comment storage.
//!
//! Free functions take a `SqliteConnection` so the coordinator can chain them
//! inside one transaction; `Repository` methods cover the read paths.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use super::repository::{
    enum_str, opt_ts_col, opt_uuid_col, parse_enum, ts, ts_col, uuid_col, Repository,
};
use crate::errors::AppError;
use crate::geo::{BoundingBox, GeoPoint};
use crate::models::{
    AccidentDetails, AnimalDetails, Case, CaseDetails, CaseFilter, CaseStatus, CaseType,
    CaseUpdate, CaseVolunteer, Comment, FloodDetails, NewCaseUpdate, Page, PageQuery,
    UpdateCaseRequest, UpdateType, Urgency, VolunteerStatus,
};

const CASE_COLUMNS: &str = "c.id, c.case_type, c.status, c.urgency, c.latitude, c.longitude, c.address, c.location_note, c.title, c.description, c.reporter_id, c.reporter_name, c.reporter_phone, c.is_anonymous, c.volunteer_count, c.max_volunteers, c.created_at, c.updated_at, c.accepted_at, c.resolved_at";

const VOLUNTEER_COLUMNS: &str = "v.id, v.case_id, v.volunteer_id, u.display_name AS volunteer_name, v.status, v.latitude, v.longitude, v.distance_km, v.note, v.accepted_at, v.arrived_at, v.completed_at";

// ==================== CASE WRITES ====================

/// Insert a case row and its detail record.
pub async fn insert_case(conn: &mut SqliteConnection, case: &Case) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO cases (id, case_type, status, urgency, latitude, longitude, address, location_note, title,
                           description, reporter_id, reporter_name, reporter_phone, is_anonymous,
                           volunteer_count, max_volunteers, created_at, updated_at, accepted_at, resolved_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(case.id.to_string())
    .bind(case.case_type.as_str())
    .bind(case.status.as_str())
    .bind(case.urgency.as_str())
    .bind(case.location.latitude)
    .bind(case.location.longitude)
    .bind(&case.address)
    .bind(&case.location_note)
    .bind(&case.title)
    .bind(&case.description)
    .bind(case.reporter_id.map(|id| id.to_string()))
    .bind(&case.reporter_name)
    .bind(&case.reporter_phone)
    .bind(case.is_anonymous as i32)
    .bind(case.volunteer_count)
    .bind(case.max_volunteers)
    .bind(ts(&case.created_at))
    .bind(ts(&case.updated_at))
    .bind(case.accepted_at.as_ref().map(ts))
    .bind(case.resolved_at.as_ref().map(ts))
    .execute(&mut *conn)
    .await?;

    if let Some(details) = &case.details {
        insert_details(conn, case.id, details).await?;
    }

    Ok(())
}

async fn insert_details(
    conn: &mut SqliteConnection,
    case_id: Uuid,
    details: &CaseDetails,
) -> Result<(), AppError> {
    match details {
        CaseDetails::Animal(d) => {
            sqlx::query(
                "INSERT INTO case_animal_details (case_id, animal_type, animal_type_other, condition, condition_description, estimated_count) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(case_id.to_string())
            .bind(enum_str(&d.animal_type))
            .bind(&d.animal_type_other)
            .bind(enum_str(&d.condition))
            .bind(&d.condition_description)
            .bind(d.estimated_count)
            .execute(&mut *conn)
            .await?;
        }
        CaseDetails::Flood(d) => {
            sqlx::query(
                r#"
                INSERT INTO case_flood_details (case_id, people_count, has_children, has_elderly, has_disabled,
                                                water_level_cm, floor_level, has_power, has_food_water, medical_needs)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(case_id.to_string())
            .bind(d.people_count)
            .bind(d.has_children as i32)
            .bind(d.has_elderly as i32)
            .bind(d.has_disabled as i32)
            .bind(d.water_level_cm)
            .bind(d.floor_level)
            .bind(d.has_power.map(|v| v as i32))
            .bind(d.has_food_water.map(|v| v as i32))
            .bind(&d.medical_needs)
            .execute(&mut *conn)
            .await?;
        }
        CaseDetails::Accident(d) => {
            sqlx::query(
                r#"
                INSERT INTO case_accident_details (case_id, accident_type, victim_count, has_unconscious, has_bleeding,
                                                   has_fracture, is_trapped, hazard_present, hazard_description)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(case_id.to_string())
            .bind(enum_str(&d.accident_type))
            .bind(d.victim_count)
            .bind(d.has_unconscious as i32)
            .bind(d.has_bleeding as i32)
            .bind(d.has_fracture as i32)
            .bind(d.is_trapped as i32)
            .bind(d.hazard_present as i32)
            .bind(&d.hazard_description)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

/// Write the case row so the transaction holds the database write lock before
/// reading anything. Fails with `CASE_NOT_FOUND` when the case does not exist.
pub async fn lock_case(
    conn: &mut SqliteConnection,
    case_id: Uuid,
    now: &DateTime<Utc>,
) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE cases SET updated_at = ? WHERE id = ?")
        .bind(ts(now))
        .bind(case_id.to_string())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::case_not_found(case_id));
    }
    Ok(())
}

/// Move a case from `from` to `to`, stamping `accepted_at` / `resolved_at`.
/// Returns false if the case was no longer in `from`.
pub async fn transition_case(
    conn: &mut SqliteConnection,
    case_id: Uuid,
    from: CaseStatus,
    to: CaseStatus,
    now: &DateTime<Utc>,
) -> Result<bool, AppError> {
    let stamp = ts(now);
    let result = sqlx::query(
        r#"
        UPDATE cases SET
            status = ?,
            updated_at = ?,
            accepted_at = CASE WHEN ? = 'accepted' AND accepted_at IS NULL THEN ? ELSE accepted_at END,
            resolved_at = CASE WHEN ? = 'resolved' THEN ? ELSE resolved_at END
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(to.as_str())
    .bind(&stamp)
    .bind(to.as_str())
    .bind(&stamp)
    .bind(to.as_str())
    .bind(&stamp)
    .bind(case_id.to_string())
    .bind(from.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Add `delta` to the volunteer count, never going below zero.
pub async fn adjust_volunteer_count(
    conn: &mut SqliteConnection,
    case_id: Uuid,
    delta: i64,
) -> Result<(), AppError> {
    sqlx::query("UPDATE cases SET volunteer_count = MAX(0, volunteer_count + ?) WHERE id = ?")
        .bind(delta)
        .bind(case_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Apply the reporter's field edits. Status is handled by [`transition_case`].
pub async fn update_case_fields(
    conn: &mut SqliteConnection,
    case_id: Uuid,
    patch: &UpdateCaseRequest,
    now: &DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE cases SET
            title = COALESCE(?, title),
            description = COALESCE(?, description),
            urgency = COALESCE(?, urgency),
            address = COALESCE(?, address),
            location_note = COALESCE(?, location_note),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&patch.title)
    .bind(&patch.description)
    .bind(patch.urgency.map(|u| u.as_str()))
    .bind(&patch.address)
    .bind(&patch.location_note)
    .bind(ts(now))
    .bind(case_id.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Load a case with its detail record.
pub async fn fetch_case(
    conn: &mut SqliteConnection,
    case_id: Uuid,
) -> Result<Option<Case>, AppError> {
    let sql = format!("SELECT {} FROM cases c WHERE c.id = ?", CASE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(case_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut case = case_from_row(&row);
    case.details = fetch_details(conn, case.id, case.case_type).await?;
    Ok(Some(case))
}

async fn fetch_details(
    conn: &mut SqliteConnection,
    case_id: Uuid,
    case_type: CaseType,
) -> Result<Option<CaseDetails>, AppError> {
    let id = case_id.to_string();
    let details = match case_type {
        CaseType::Animal => sqlx::query(
            "SELECT animal_type, animal_type_other, condition, condition_description, estimated_count FROM case_animal_details WHERE case_id = ?",
        )
        .bind(&id)
        .fetch_optional(&mut *conn)
        .await?
        .and_then(|row| {
            let animal_type: String = row.get("animal_type");
            let condition: String = row.get("condition");
            Some(CaseDetails::Animal(AnimalDetails {
                animal_type: parse_enum(&animal_type)?,
                animal_type_other: row.get("animal_type_other"),
                condition: parse_enum(&condition)?,
                condition_description: row.get("condition_description"),
                estimated_count: row.get("estimated_count"),
            }))
        }),
        CaseType::Flood => sqlx::query(
            "SELECT people_count, has_children, has_elderly, has_disabled, water_level_cm, floor_level, has_power, has_food_water, medical_needs FROM case_flood_details WHERE case_id = ?",
        )
        .bind(&id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| {
            CaseDetails::Flood(FloodDetails {
                people_count: row.get("people_count"),
                has_children: flag(&row, "has_children"),
                has_elderly: flag(&row, "has_elderly"),
                has_disabled: flag(&row, "has_disabled"),
                water_level_cm: row.get("water_level_cm"),
                floor_level: row.get("floor_level"),
                has_power: opt_flag(&row, "has_power"),
                has_food_water: opt_flag(&row, "has_food_water"),
                medical_needs: row.get("medical_needs"),
            })
        }),
        CaseType::Accident => sqlx::query(
            "SELECT accident_type, victim_count, has_unconscious, has_bleeding, has_fracture, is_trapped, hazard_present, hazard_description FROM case_accident_details WHERE case_id = ?",
        )
        .bind(&id)
        .fetch_optional(&mut *conn)
        .await?
        .and_then(|row| {
            let accident_type: String = row.get("accident_type");
            Some(CaseDetails::Accident(AccidentDetails {
                accident_type: parse_enum(&accident_type)?,
                victim_count: row.get("victim_count"),
                has_unconscious: flag(&row, "has_unconscious"),
                has_bleeding: flag(&row, "has_bleeding"),
                has_fracture: flag(&row, "has_fracture"),
                is_trapped: flag(&row, "is_trapped"),
                hazard_present: flag(&row, "hazard_present"),
                hazard_description: row.get("hazard_description"),
            }))
        }),
    };
    Ok(details)
}

// ==================== VOLUNTEER WRITES ====================

/// The (case, volunteer) record in any status, withdrawn included.
pub async fn fetch_volunteer(
    conn: &mut SqliteConnection,
    case_id: Uuid,
    volunteer_id: Uuid,
) -> Result<Option<CaseVolunteer>, AppError> {
    let sql = format!(
        "SELECT {} FROM case_volunteers v LEFT JOIN users u ON u.id = v.volunteer_id WHERE v.case_id = ? AND v.volunteer_id = ?",
        VOLUNTEER_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(case_id.to_string())
        .bind(volunteer_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(volunteer_from_row))
}

pub async fn insert_volunteer(
    conn: &mut SqliteConnection,
    record: &CaseVolunteer,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO case_volunteers (id, case_id, volunteer_id, status, latitude, longitude, distance_km, note, accepted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(record.case_id.to_string())
    .bind(record.volunteer_id.to_string())
    .bind(record.status.as_str())
    .bind(record.accepted_location.map(|p| p.latitude))
    .bind(record.accepted_location.map(|p| p.longitude))
    .bind(record.distance_km)
    .bind(&record.note)
    .bind(ts(&record.accepted_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Bring a withdrawn record back to `accepted` with a fresh snapshot.
pub async fn reactivate_volunteer(
    conn: &mut SqliteConnection,
    record_id: Uuid,
    location: Option<GeoPoint>,
    distance_km: Option<f64>,
    now: &DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE case_volunteers SET
            status = 'accepted',
            latitude = ?,
            longitude = ?,
            distance_km = ?,
            note = NULL,
            accepted_at = ?,
            arrived_at = NULL,
            completed_at = NULL
        WHERE id = ? AND status = 'withdrawn'
        "#,
    )
    .bind(location.map(|p| p.latitude))
    .bind(location.map(|p| p.longitude))
    .bind(distance_km)
    .bind(ts(now))
    .bind(record_id.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Mark the volunteer withdrawn. Returns false if there was no active record.
pub async fn withdraw_volunteer(
    conn: &mut SqliteConnection,
    case_id: Uuid,
    volunteer_id: Uuid,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE case_volunteers SET status = 'withdrawn' WHERE case_id = ? AND volunteer_id = ? AND status != 'withdrawn'",
    )
    .bind(case_id.to_string())
    .bind(volunteer_id.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Record a progress status, stamping arrival or completion.
pub async fn set_volunteer_status(
    conn: &mut SqliteConnection,
    record_id: Uuid,
    status: VolunteerStatus,
    note: Option<&str>,
    now: &DateTime<Utc>,
) -> Result<(), AppError> {
    let stamp = ts(now);
    sqlx::query(
        r#"
        UPDATE case_volunteers SET
            status = ?,
            note = COALESCE(?, note),
            arrived_at = CASE WHEN ? = 'on_site' THEN ? ELSE arrived_at END,
            completed_at = CASE WHEN ? = 'completed' THEN ? ELSE completed_at END
        WHERE id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(note)
    .bind(status.as_str())
    .bind(&stamp)
    .bind(status.as_str())
    .bind(&stamp)
    .bind(record_id.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Every volunteer record on the case with its status.
pub async fn volunteer_statuses(
    conn: &mut SqliteConnection,
    case_id: Uuid,
) -> Result<Vec<(Uuid, VolunteerStatus)>, AppError> {
    let rows = sqlx::query("SELECT volunteer_id, status FROM case_volunteers WHERE case_id = ?")
        .bind(case_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let status: String = row.get("status");
            Some((uuid_col(row, "volunteer_id"), VolunteerStatus::parse(&status)?))
        })
        .collect())
}

// ==================== TIMELINE WRITES ====================

/// Append a timeline entry.
pub async fn insert_update(
    conn: &mut SqliteConnection,
    update: &NewCaseUpdate,
    now: &DateTime<Utc>,
) -> Result<CaseUpdate, AppError> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO case_updates (id, case_id, user_id, update_type, content, old_status, new_status, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(update.case_id.to_string())
    .bind(update.user_id.map(|u| u.to_string()))
    .bind(update.update_type.as_str())
    .bind(&update.content)
    .bind(&update.old_status)
    .bind(&update.new_status)
    .bind(ts(now))
    .execute(&mut *conn)
    .await?;

    Ok(CaseUpdate {
        id,
        case_id: update.case_id,
        user_id: update.user_id,
        user_name: None,
        update_type: update.update_type,
        content: update.content.clone(),
        old_status: update.old_status.clone(),
        new_status: update.new_status.clone(),
        created_at: *now,
    })
}

impl Repository {
    // ==================== CASE QUERIES ====================

    /// Get a case by ID, including its detail record.
    pub async fn get_case(&self, id: Uuid) -> Result<Option<Case>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_case(&mut *conn, id).await
    }

    /// Get a case or fail with `CASE_NOT_FOUND`.
    pub async fn require_case(&self, id: Uuid) -> Result<Case, AppError> {
        self.get_case(id)
            .await?
            .ok_or_else(|| AppError::case_not_found(id))
    }

    /// List cases newest first.
    pub async fn list_cases(
        &self,
        filter: &CaseFilter,
        page: &PageQuery,
    ) -> Result<Page<Case>, AppError> {
        let pattern = filter.q.as_ref().map(|q| format!("%{}%", q.trim()));
        let case_type = filter.case_type.map(|t| t.as_str());
        let status = filter.status.map(|s| s.as_str());
        let urgency = filter.urgency.map(|u| u.as_str());

        const WHERE: &str = r#"
            WHERE (?1 IS NULL OR c.title LIKE ?1 OR c.address LIKE ?1)
              AND (?2 IS NULL OR c.case_type = ?2)
              AND (?3 IS NULL OR c.status = ?3)
              AND (?4 IS NULL OR c.urgency = ?4)
        "#;

        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS total FROM cases c {}", WHERE))
            .bind(&pattern)
            .bind(case_type)
            .bind(status)
            .bind(urgency)
            .fetch_one(&self.pool)
            .await?
            .get("total");

        let rows = sqlx::query(&format!(
            "SELECT {} FROM cases c {} ORDER BY c.created_at DESC, c.rowid DESC LIMIT ?5 OFFSET ?6",
            CASE_COLUMNS, WHERE
        ))
        .bind(&pattern)
        .bind(case_type)
        .bind(status)
        .bind(urgency)
        .bind(page.limit() as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(
            rows.iter().map(case_from_row).collect(),
            page,
            total,
        ))
    }

    /// Active cases inside `bbox`, optionally restricted to `types`.
    pub async fn active_cases_in_box(
        &self,
        bbox: &BoundingBox,
        types: &[CaseType],
    ) -> Result<Vec<Case>, AppError> {
        let sql = format!(
            r#"
            SELECT {} FROM cases c
            WHERE c.status IN ('pending', 'accepted', 'in_progress')
              AND c.latitude BETWEEN ? AND ?
              AND c.longitude BETWEEN ? AND ?
            "#,
            CASE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.min_lng)
            .bind(bbox.max_lng)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(case_from_row)
            .filter(|case| types.is_empty() || types.contains(&case.case_type))
            .collect())
    }

    /// Cases the user reported, newest first.
    pub async fn reported_cases(
        &self,
        user_id: Uuid,
        page: &PageQuery,
    ) -> Result<Page<Case>, AppError> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM cases WHERE reporter_id = ?")
            .bind(user_id.to_string())
            .fetch_one(&self.pool)
            .await?
            .get("total");

        let sql = format!(
            "SELECT {} FROM cases c WHERE c.reporter_id = ? ORDER BY c.created_at DESC, c.rowid DESC LIMIT ? OFFSET ?",
            CASE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.to_string())
            .bind(page.limit() as i64)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(
            rows.iter().map(case_from_row).collect(),
            page,
            total,
        ))
    }

    /// Cases the user is currently volunteering on, most recently accepted first.
    pub async fn accepted_cases(
        &self,
        user_id: Uuid,
        page: &PageQuery,
    ) -> Result<Page<Case>, AppError> {
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM case_volunteers WHERE volunteer_id = ? AND status != 'withdrawn'",
        )
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await?
        .get("total");

        let sql = format!(
            r#"
            SELECT {} FROM cases c
            JOIN case_volunteers v ON v.case_id = c.id
            WHERE v.volunteer_id = ? AND v.status != 'withdrawn'
            ORDER BY v.accepted_at DESC
            LIMIT ? OFFSET ?
            "#,
            CASE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.to_string())
            .bind(page.limit() as i64)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(
            rows.iter().map(case_from_row).collect(),
            page,
            total,
        ))
    }

    /// Non-withdrawn volunteers on a case, in order of acceptance.
    pub async fn list_volunteers(&self, case_id: Uuid) -> Result<Vec<CaseVolunteer>, AppError> {
        let sql = format!(
            "SELECT {} FROM case_volunteers v LEFT JOIN users u ON u.id = v.volunteer_id WHERE v.case_id = ? AND v.status != 'withdrawn' ORDER BY v.accepted_at",
            VOLUNTEER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(case_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(volunteer_from_row).collect())
    }

    /// The (case, volunteer) record, withdrawn included.
    pub async fn get_volunteer(
        &self,
        case_id: Uuid,
        volunteer_id: Uuid,
    ) -> Result<Option<CaseVolunteer>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_volunteer(&mut *conn, case_id, volunteer_id).await
    }

    // ==================== TIMELINE OPERATIONS ====================

    /// Append a single timeline entry outside any larger transaction.
    pub async fn append_update(&self, update: &NewCaseUpdate) -> Result<CaseUpdate, AppError> {
        let mut conn = self.pool.acquire().await?;
        insert_update(&mut *conn, update, &Utc::now()).await
    }

    /// Timeline entries, newest first.
    pub async fn list_updates(
        &self,
        case_id: Uuid,
        page: &PageQuery,
    ) -> Result<Page<CaseUpdate>, AppError> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM case_updates WHERE case_id = ?")
            .bind(case_id.to_string())
            .fetch_one(&self.pool)
            .await?
            .get("total");

        let rows = sqlx::query(
            r#"
            SELECT cu.id, cu.case_id, cu.user_id, u.display_name AS user_name, cu.update_type,
                   cu.content, cu.old_status, cu.new_status, cu.created_at
            FROM case_updates cu
            LEFT JOIN users u ON u.id = cu.user_id
            WHERE cu.case_id = ?
            ORDER BY cu.created_at DESC, cu.rowid DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(case_id.to_string())
        .bind(page.limit() as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(
            rows.iter().map(update_from_row).collect(),
            page,
            total,
        ))
    }

    // ==================== COMMENT OPERATIONS ====================

    pub async fn create_comment(
        &self,
        case_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> Result<Comment, AppError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO case_comments (id, case_id, user_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(case_id.to_string())
        .bind(user_id.to_string())
        .bind(content)
        .bind(ts(&now))
        .execute(&self.pool)
        .await?;

        Ok(Comment {
            id,
            case_id,
            user_id,
            user_name: None,
            content: content.to_string(),
            created_at: now,
        })
    }

    pub async fn get_comment(&self, id: Uuid) -> Result<Option<Comment>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT cc.id, cc.case_id, cc.user_id, u.display_name AS user_name, cc.content, cc.created_at
            FROM case_comments cc
            LEFT JOIN users u ON u.id = cc.user_id
            WHERE cc.id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(comment_from_row))
    }

    /// Comments on a case, oldest first.
    pub async fn list_comments(
        &self,
        case_id: Uuid,
        page: &PageQuery,
    ) -> Result<Page<Comment>, AppError> {
        let total: i64 =
            sqlx::query("SELECT COUNT(*) AS total FROM case_comments WHERE case_id = ?")
                .bind(case_id.to_string())
                .fetch_one(&self.pool)
                .await?
                .get("total");

        let rows = sqlx::query(
            r#"
            SELECT cc.id, cc.case_id, cc.user_id, u.display_name AS user_name, cc.content, cc.created_at
            FROM case_comments cc
            LEFT JOIN users u ON u.id = cc.user_id
            WHERE cc.case_id = ?
            ORDER BY cc.created_at ASC, cc.rowid ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(case_id.to_string())
        .bind(page.limit() as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(
            rows.iter().map(comment_from_row).collect(),
            page,
            total,
        ))
    }

    pub async fn delete_comment(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM case_comments WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// Helper functions for row conversion

fn case_from_row(row: &SqliteRow) -> Case {
    let case_type: String = row.get("case_type");
    let status: String = row.get("status");
    let urgency: String = row.get("urgency");
    Case {
        id: uuid_col(row, "id"),
        case_type: CaseType::parse(&case_type).unwrap_or(CaseType::Animal),
        status: CaseStatus::parse(&status).unwrap_or(CaseStatus::Pending),
        urgency: Urgency::parse(&urgency).unwrap_or(Urgency::Medium),
        location: GeoPoint::new(row.get("latitude"), row.get("longitude")),
        address: row.get("address"),
        location_note: row.get("location_note"),
        title: row.get("title"),
        description: row.get("description"),
        reporter_id: opt_uuid_col(row, "reporter_id"),
        reporter_name: row.get("reporter_name"),
        reporter_phone: row.get("reporter_phone"),
        is_anonymous: flag(row, "is_anonymous"),
        volunteer_count: row.get("volunteer_count"),
        max_volunteers: row.get("max_volunteers"),
        details: None,
        created_at: ts_col(row, "created_at"),
        updated_at: ts_col(row, "updated_at"),
        accepted_at: opt_ts_col(row, "accepted_at"),
        resolved_at: opt_ts_col(row, "resolved_at"),
    }
}

fn volunteer_from_row(row: &SqliteRow) -> CaseVolunteer {
    let status: String = row.get("status");
    CaseVolunteer {
        id: uuid_col(row, "id"),
        case_id: uuid_col(row, "case_id"),
        volunteer_id: uuid_col(row, "volunteer_id"),
        volunteer_name: row.get("volunteer_name"),
        status: VolunteerStatus::parse(&status).unwrap_or(VolunteerStatus::Accepted),
        accepted_location: GeoPoint::from_parts(row.get("latitude"), row.get("longitude")),
        distance_km: row.get("distance_km"),
        accepted_at: ts_col(row, "accepted_at"),
        arrived_at: opt_ts_col(row, "arrived_at"),
        completed_at: opt_ts_col(row, "completed_at"),
        note: row.get("note"),
    }
}

fn update_from_row(row: &SqliteRow) -> CaseUpdate {
    let update_type: String = row.get("update_type");
    CaseUpdate {
        id: uuid_col(row, "id"),
        case_id: uuid_col(row, "case_id"),
        user_id: opt_uuid_col(row, "user_id"),
        user_name: row.get("user_name"),
        update_type: UpdateType::parse(&update_type).unwrap_or(UpdateType::System),
        content: row.get("content"),
        old_status: row.get("old_status"),
        new_status: row.get("new_status"),
        created_at: ts_col(row, "created_at"),
    }
}

fn comment_from_row(row: &SqliteRow) -> Comment {
    Comment {
        id: uuid_col(row, "id"),
        case_id: uuid_col(row, "case_id"),
        user_id: uuid_col(row, "user_id"),
        user_name: row.get("user_name"),
        content: row.get("content"),
        created_at: ts_col(row, "created_at"),
    }
}

fn flag(row: &SqliteRow, col: &str) -> bool {
    let value: i32 = row.get(col);
    value != 0
}

fn opt_flag(row: &SqliteRow, col: &str) -> Option<bool> {
    let value: Option<i32> = row.get(col);
    value.map(|v| v != 0)
}
