// Storage collaborator boundaries.
//
// ReportStore: reports, atomic counter increments, radius and time-window reads.
// UserStore: accounts, role and explicit-grant mutations.
// EventStore: curated traffic events and their time-window reads.
//
// PgStore implements all three against Postgres; testing::MemoryStore
// implements them in memory for tests that need no database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use travelhi_common::{
    Event, EventFilter, Location, NewEvent, NewReport, NewUser, Page, Permission, Report,
    ReportCounter, Role, User, UserChanges,
};

/// Proximity query: every report within `radius_meters` (inclusive) of
/// `center`, newest first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusQuery {
    pub center: Location,
    pub radius_meters: f64,
    pub skip: i64,
    pub limit: i64,
}

/// Half-open `[start, end)` creation-time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist a report with all counters at zero.
    async fn insert_report(&self, report: &NewReport) -> Result<Report>;

    async fn get_report(&self, id: i64) -> Result<Option<Report>>;

    /// Atomically add one to a single counter. `None` when the id is unknown.
    async fn increment_counter(&self, id: i64, counter: ReportCounter) -> Result<Option<Report>>;

    async fn set_verified(&self, id: i64, verified: bool) -> Result<Option<Report>>;

    /// Page of matches plus the count of all matches.
    async fn reports_in_radius(&self, query: &RadiusQuery) -> Result<Page<Report>>;

    /// Reports created inside `window`, newest first.
    async fn reports_in_window(&self, window: &TimeWindow, skip: i64, limit: i64)
        -> Result<Page<Report>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with a wrapped [`crate::DuplicateKey`] on username/email collision.
    async fn create_user(&self, user: &NewUser) -> Result<User>;

    async fn user_by_id(&self, id: i64) -> Result<Option<User>>;
    async fn user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn list_users(&self, skip: i64, limit: i64) -> Result<Vec<User>>;

    async fn update_user(&self, id: i64, changes: &UserChanges) -> Result<Option<User>>;
    async fn set_role(&self, id: i64, role: Role) -> Result<Option<User>>;
    async fn set_disabled(&self, id: i64, disabled: bool) -> Result<Option<User>>;

    /// Add an explicit grant. Granting twice is a no-op.
    async fn grant_permission(&self, id: i64, permission: Permission) -> Result<Option<User>>;

    /// Remove an explicit grant. Never touches the role.
    async fn revoke_permission(&self, id: i64, permission: Permission) -> Result<Option<User>>;

    /// `false` when no such user existed.
    async fn delete_user(&self, id: i64) -> Result<bool>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(&self, event: &NewEvent) -> Result<Event>;

    /// Newest first.
    async fn list_events(&self, limit: i64) -> Result<Vec<Event>>;

    /// Events inside `window` matching `filter`, oldest first.
    async fn events_in_window(
        &self,
        window: &TimeWindow,
        filter: &EventFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Event>>;
}

/// Convenience bound for a backend that provides every store.
pub trait Store: ReportStore + UserStore + EventStore {}

impl<T: ReportStore + UserStore + EventStore> Store for T {}
