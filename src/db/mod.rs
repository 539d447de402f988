//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for all application data. Multi-step case
//! mutations run inside one transaction that writes the case row first, which
//! takes SQLite's write lock before anything is read.

mod cases;
mod media;
mod notifications;
mod repository;

pub use cases::*;
pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            is_available INTEGER NOT NULL DEFAULT 1,
            is_active INTEGER NOT NULL DEFAULT 1,
            latitude REAL,
            longitude REAL,
            location_updated_at TEXT,
            total_cases_reported INTEGER NOT NULL DEFAULT 0,
            total_cases_resolved INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_preferences (
            user_id TEXT PRIMARY KEY REFERENCES users(id),
            push_enabled INTEGER NOT NULL DEFAULT 1,
            case_types TEXT NOT NULL,
            notification_radius_km REAL NOT NULL DEFAULT 10,
            use_current_location INTEGER NOT NULL DEFAULT 1,
            center_latitude REAL,
            center_longitude REAL,
            quiet_hours_start TEXT,
            quiet_hours_end TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS push_tokens (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            platform TEXT NOT NULL,
            device_id TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_used_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cases (
            id TEXT PRIMARY KEY,
            case_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            urgency TEXT NOT NULL DEFAULT 'medium',
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            address TEXT,
            location_note TEXT,
            title TEXT NOT NULL,
            description TEXT,
            reporter_id TEXT,
            reporter_name TEXT,
            reporter_phone TEXT,
            is_anonymous INTEGER NOT NULL DEFAULT 0,
            volunteer_count INTEGER NOT NULL DEFAULT 0 CHECK (volunteer_count >= 0),
            max_volunteers INTEGER NOT NULL DEFAULT 5,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            accepted_at TEXT,
            resolved_at TEXT
        );

        CREATE TABLE IF NOT EXISTS case_animal_details (
            case_id TEXT PRIMARY KEY REFERENCES cases(id),
            animal_type TEXT NOT NULL,
            animal_type_other TEXT,
            condition TEXT NOT NULL,
            condition_description TEXT,
            estimated_count INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS case_flood_details (
            case_id TEXT PRIMARY KEY REFERENCES cases(id),
            people_count INTEGER,
            has_children INTEGER NOT NULL DEFAULT 0,
            has_elderly INTEGER NOT NULL DEFAULT 0,
            has_disabled INTEGER NOT NULL DEFAULT 0,
            water_level_cm INTEGER,
            floor_level INTEGER,
            has_power INTEGER,
            has_food_water INTEGER,
            medical_needs TEXT
        );

        CREATE TABLE IF NOT EXISTS case_accident_details (
            case_id TEXT PRIMARY KEY REFERENCES cases(id),
            accident_type TEXT NOT NULL,
            victim_count INTEGER NOT NULL DEFAULT 1,
            has_unconscious INTEGER NOT NULL DEFAULT 0,
            has_bleeding INTEGER NOT NULL DEFAULT 0,
            has_fracture INTEGER NOT NULL DEFAULT 0,
            is_trapped INTEGER NOT NULL DEFAULT 0,
            hazard_present INTEGER NOT NULL DEFAULT 0,
            hazard_description TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS case_volunteers (
            id TEXT PRIMARY KEY,
            case_id TEXT NOT NULL REFERENCES cases(id),
            volunteer_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'accepted',
            latitude REAL,
            longitude REAL,
            distance_km REAL,
            note TEXT,
            accepted_at TEXT NOT NULL,
            arrived_at TEXT,
            completed_at TEXT,
            UNIQUE (case_id, volunteer_id)
        );

        CREATE TABLE IF NOT EXISTS case_updates (
            id TEXT PRIMARY KEY,
            case_id TEXT NOT NULL REFERENCES cases(id),
            user_id TEXT,
            update_type TEXT NOT NULL,
            content TEXT NOT NULL,
            old_status TEXT,
            new_status TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS case_comments (
            id TEXT PRIMARY KEY,
            case_id TEXT NOT NULL REFERENCES cases(id),
            user_id TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS case_media (
            id TEXT PRIMARY KEY,
            case_id TEXT NOT NULL REFERENCES cases(id),
            media_type TEXT NOT NULL,
            url TEXT NOT NULL,
            storage_key TEXT NOT NULL,
            file_name TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            uploaded_by TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            type TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            case_id TEXT,
            case_type TEXT,
            urgency TEXT,
            distance_km REAL,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_users_location ON users(latitude, longitude);
        CREATE INDEX IF NOT EXISTS idx_users_available ON users(is_available, is_active);
        CREATE INDEX IF NOT EXISTS idx_prefs_center ON user_preferences(center_latitude, center_longitude);
        CREATE INDEX IF NOT EXISTS idx_cases_status ON cases(status);
        CREATE INDEX IF NOT EXISTS idx_cases_location ON cases(latitude, longitude);
        CREATE INDEX IF NOT EXISTS idx_cases_reporter ON cases(reporter_id);
        CREATE INDEX IF NOT EXISTS idx_cases_created_at ON cases(created_at);
        CREATE INDEX IF NOT EXISTS idx_case_volunteers_volunteer ON case_volunteers(volunteer_id);
        CREATE INDEX IF NOT EXISTS idx_case_updates_case ON case_updates(case_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_case_comments_case ON case_comments(case_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_case_media_case ON case_media(case_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_push_tokens_user ON push_tokens(user_id);
        CREATE INDEX IF NOT EXISTS idx_users_phone ON users(phone);
        CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
