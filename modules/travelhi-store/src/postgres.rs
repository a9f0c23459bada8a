use std::collections::BTreeSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use travelhi_common::geo::BoundingBox;
use travelhi_common::{
    Event, EventFilter, NewEvent, NewReport, NewUser, Page, Permission, Report, ReportCounter,
    Role, User, UserChanges,
};

use crate::error::DuplicateKey;
use crate::traits::{EventStore, RadiusQuery, ReportStore, TimeWindow, UserStore};

const REPORT_COLUMNS: &str = "id, report_type, lat, lng, name, description, photo, likes, \
     confirmations, denials, is_verified, user_id, created_at";

const USER_COLUMNS: &str =
    "id, username, email, full_name, password_hash, role, permissions, disabled, created_at";

const EVENT_COLUMNS: &str =
    "id, event_type, severity, description, lat, lng, is_verified, created_at";

/// Great-circle distance in meters from ($1, $2) to the row's lat/lng.
const HAVERSINE_SQL: &str = "2 * 6371000.0 * ASIN(LEAST(1.0, SQRT( \
     POWER(SIN(RADIANS(lat - $1) / 2), 2) + \
     COS(RADIANS($1)) * COS(RADIANS(lat)) * POWER(SIN(RADIANS(lng - $2) / 2), 2))))";

/// Postgres-backed implementation of every store trait.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        info!("Connected to database");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }
}

// --- Row types ---

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: i64,
    report_type: String,
    lat: f64,
    lng: f64,
    name: Option<String>,
    description: Option<String>,
    photo: Option<String>,
    likes: i64,
    confirmations: i64,
    denials: i64,
    is_verified: bool,
    user_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReportRow> for Report {
    type Error = anyhow::Error;

    fn try_from(row: ReportRow) -> Result<Self> {
        Ok(Report {
            id: row.id,
            report_type: row.report_type.parse()?,
            lat: row.lat,
            lng: row.lng,
            name: row.name,
            description: row.description,
            photo: row.photo,
            likes: row.likes,
            confirmations: row.confirmations,
            denials: row.denials,
            is_verified: row.is_verified,
            user_id: row.user_id,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    full_name: Option<String>,
    password_hash: String,
    role: String,
    permissions: Vec<String>,
    disabled: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        let mut permissions = BTreeSet::new();
        for raw in &row.permissions {
            match raw.parse::<Permission>() {
                Ok(p) => {
                    permissions.insert(p);
                }
                // Grants for permissions that no longer exist are dropped, not fatal.
                Err(_) => warn!(user_id = row.id, permission = %raw, "Ignoring unknown permission"),
            }
        }
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            full_name: row.full_name,
            password_hash: row.password_hash,
            role: row.role.parse()?,
            permissions,
            disabled: row.disabled,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    event_type: String,
    severity: String,
    description: Option<String>,
    lat: f64,
    lng: f64,
    is_verified: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = anyhow::Error;

    fn try_from(row: EventRow) -> Result<Self> {
        Ok(Event {
            id: row.id,
            event_type: row.event_type.parse()?,
            severity: row.severity.parse()?,
            description: row.description,
            lat: row.lat,
            lng: row.lng,
            is_verified: row.is_verified,
            created_at: row.created_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = anyhow::Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn map_unique_violation(err: sqlx::Error) -> anyhow::Error {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some("users_email_key") => "email",
                _ => "username",
            };
            return anyhow::Error::new(DuplicateKey { field });
        }
    }
    err.into()
}

// --- Reports ---

#[async_trait]
impl ReportStore for PgStore {
    async fn insert_report(&self, report: &NewReport) -> Result<Report> {
        let sql = format!(
            r#"
            INSERT INTO reports (report_type, lat, lng, name, description, photo, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {REPORT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(report.report_type.as_str())
            .bind(report.location.lat())
            .bind(report.location.lng())
            .bind(report.name.as_deref())
            .bind(report.description.as_deref())
            .bind(report.photo.as_deref())
            .bind(report.user_id)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn get_report(&self, id: i64) -> Result<Option<Report>> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1");
        sqlx::query_as::<_, ReportRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Report::try_from)
            .transpose()
    }

    async fn increment_counter(&self, id: i64, counter: ReportCounter) -> Result<Option<Report>> {
        // Single-statement increment: the row lock serializes concurrent bumps.
        let column = counter.column();
        let sql = format!(
            "UPDATE reports SET {column} = {column} + 1 WHERE id = $1 RETURNING {REPORT_COLUMNS}"
        );
        sqlx::query_as::<_, ReportRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Report::try_from)
            .transpose()
    }

    async fn set_verified(&self, id: i64, verified: bool) -> Result<Option<Report>> {
        let sql =
            format!("UPDATE reports SET is_verified = $2 WHERE id = $1 RETURNING {REPORT_COLUMNS}");
        sqlx::query_as::<_, ReportRow>(&sql)
            .bind(id)
            .bind(verified)
            .fetch_optional(&self.pool)
            .await?
            .map(Report::try_from)
            .transpose()
    }

    async fn reports_in_radius(&self, query: &RadiusQuery) -> Result<Page<Report>> {
        let (lat, lng) = (query.center.lat(), query.center.lng());
        let bbox = BoundingBox::around(lat, lng, query.radius_meters);

        let filter = format!(
            "lat BETWEEN $4 AND $5 AND lng BETWEEN $6 AND $7 AND {HAVERSINE_SQL} <= $3"
        );

        let count_sql = format!("SELECT COUNT(*) FROM reports WHERE {filter}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(lat)
            .bind(lng)
            .bind(query.radius_meters)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.min_lng)
            .bind(bbox.max_lng)
            .fetch_one(&self.pool)
            .await?;

        let page_sql = format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE {filter} \
             ORDER BY created_at DESC, id DESC OFFSET $8 LIMIT $9"
        );
        let rows = sqlx::query_as::<_, ReportRow>(&page_sql)
            .bind(lat)
            .bind(lng)
            .bind(query.radius_meters)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.min_lng)
            .bind(bbox.max_lng)
            .bind(query.skip)
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items: convert_all(rows)?,
            total,
        })
    }

    async fn reports_in_window(
        &self,
        window: &TimeWindow,
        skip: i64,
        limit: i64,
    ) -> Result<Page<Report>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reports WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(window.start)
        .bind(window.end)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM reports \
             WHERE created_at >= $1 AND created_at < $2 \
             ORDER BY created_at DESC, id DESC OFFSET $3 LIMIT $4"
        );
        let rows = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(window.start)
            .bind(window.end)
            .bind(skip)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items: convert_all(rows)?,
            total,
        })
    }
}

// --- Users ---

impl PgStore {
    async fn fetch_user(&self, sql: &str, id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let sql = format!(
            r#"
            INSERT INTO users (username, email, full_name, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(user.full_name.as_deref())
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)?;
        row.try_into()
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        self.fetch_user(&sql, id).await
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn list_users(&self, skip: i64, limit: i64) -> Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id OFFSET $1 LIMIT $2");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(skip)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn update_user(&self, id: i64, changes: &UserChanges) -> Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                full_name = COALESCE($3, full_name),
                password_hash = COALESCE($4, password_hash)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(changes.email.as_deref())
            .bind(changes.full_name.as_deref())
            .bind(changes.password_hash.as_deref())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_unique_violation)?
            .map(User::try_from)
            .transpose()
    }

    async fn set_role(&self, id: i64, role: Role) -> Result<Option<User>> {
        let sql = format!("UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn set_disabled(&self, id: i64, disabled: bool) -> Result<Option<User>> {
        let sql =
            format!("UPDATE users SET disabled = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(disabled)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn grant_permission(&self, id: i64, permission: Permission) -> Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users SET permissions = CASE
                WHEN $2 = ANY(permissions) THEN permissions
                ELSE array_append(permissions, $2)
            END
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(permission.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn revoke_permission(&self, id: i64, permission: Permission) -> Result<Option<User>> {
        let sql = format!(
            "UPDATE users SET permissions = array_remove(permissions, $2) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(permission.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn delete_user(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// --- Events ---

#[async_trait]
impl EventStore for PgStore {
    async fn insert_event(&self, event: &NewEvent) -> Result<Event> {
        let sql = format!(
            r#"
            INSERT INTO events (event_type, severity, description, lat, lng, is_verified)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {EVENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(event.event_type.as_str())
            .bind(event.severity.as_str())
            .bind(event.description.as_deref())
            .bind(event.location.lat())
            .bind(event.location.lng())
            .bind(event.is_verified)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn list_events(&self, limit: i64) -> Result<Vec<Event>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events ORDER BY created_at DESC, id DESC LIMIT $1"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn events_in_window(
        &self,
        window: &TimeWindow,
        filter: &EventFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Event>> {
        let sql = format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM events
            WHERE created_at >= $1 AND created_at < $2
              AND ($3::text IS NULL OR event_type = $3)
              AND ($4::text IS NULL OR severity = $4)
              AND ($5::boolean IS NULL OR is_verified = $5)
            ORDER BY created_at ASC, id ASC
            LIMIT $6 OFFSET $7
            "#
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(window.start)
            .bind(window.end)
            .bind(filter.event_type.map(|t| t.as_str()))
            .bind(filter.severity.map(|s| s.as_str()))
            .bind(filter.is_verified)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }
}
