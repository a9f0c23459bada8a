// In-memory stores for tests that need no database.
//
// MemoryStore implements ReportStore, UserStore and EventStore with the same
// ordering, uniqueness and inclusive-radius rules as PgStore. Writes can be
// made to fail on demand to exercise storage-error paths.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use travelhi_common::{
    Event, EventFilter, NewEvent, NewReport, NewUser, Page, Permission, Report, ReportCounter,
    Role, User, UserChanges,
};

use crate::error::DuplicateKey;
use crate::traits::{EventStore, RadiusQuery, ReportStore, TimeWindow, UserStore};

/// Kraków Rynek Główny.
pub const KRAKOW: (f64, f64) = (50.0614, 19.9366);
/// Warsaw Old Town.
pub const WARSAW: (f64, f64) = (52.2297, 21.0122);

#[derive(Default)]
struct Inner {
    reports: Vec<Report>,
    users: Vec<User>,
    events: Vec<Event>,
    next_report_id: i64,
    next_user_id: i64,
    next_event_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write return an error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn report_count(&self) -> usize {
        self.inner.lock().unwrap().reports.len()
    }

    pub fn user_count(&self) -> usize {
        self.inner.lock().unwrap().users.len()
    }

    /// Insert a report with an explicit creation time.
    pub fn insert_report_at(&self, report: &NewReport, created_at: DateTime<Utc>) -> Report {
        let mut inner = self.inner.lock().unwrap();
        inner.next_report_id += 1;
        let stored = Report {
            id: inner.next_report_id,
            report_type: report.report_type,
            lat: report.location.lat(),
            lng: report.location.lng(),
            name: report.name.clone(),
            description: report.description.clone(),
            photo: report.photo.clone(),
            likes: 0,
            confirmations: 0,
            denials: 0,
            is_verified: false,
            user_id: report.user_id,
            created_at,
        };
        inner.reports.push(stored.clone());
        stored
    }

    /// Insert an event with an explicit creation time.
    pub fn insert_event_at(&self, event: &NewEvent, created_at: DateTime<Utc>) -> Event {
        let mut inner = self.inner.lock().unwrap();
        inner.next_event_id += 1;
        let stored = Event {
            id: inner.next_event_id,
            event_type: event.event_type,
            severity: event.severity,
            description: event.description.clone(),
            lat: event.location.lat(),
            lng: event.location.lng(),
            is_verified: event.is_verified,
            created_at,
        };
        inner.events.push(stored.clone());
        stored
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("memory store: writes disabled");
        }
        Ok(())
    }

    fn update_user_with(&self, id: i64, f: impl FnOnce(&mut User)) -> Result<Option<User>> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.users.iter_mut().find(|u| u.id == id).map(|u| {
            f(u);
            u.clone()
        }))
    }

    fn update_report_with(&self, id: i64, f: impl FnOnce(&mut Report)) -> Result<Option<Report>> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.reports.iter_mut().find(|r| r.id == id).map(|r| {
            f(r);
            r.clone()
        }))
    }
}

fn newest_first(reports: &mut [Report]) {
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

fn paginate<T>(items: Vec<T>, skip: i64, limit: i64) -> Page<T> {
    let total = items.len() as i64;
    let items = items
        .into_iter()
        .skip(skip.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect();
    Page { items, total }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn insert_report(&self, report: &NewReport) -> Result<Report> {
        self.check_writable()?;
        Ok(self.insert_report_at(report, Utc::now()))
    }

    async fn get_report(&self, id: i64) -> Result<Option<Report>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.reports.iter().find(|r| r.id == id).cloned())
    }

    async fn increment_counter(&self, id: i64, counter: ReportCounter) -> Result<Option<Report>> {
        self.update_report_with(id, |r| match counter {
            ReportCounter::Likes => r.likes += 1,
            ReportCounter::Confirmations => r.confirmations += 1,
            ReportCounter::Denials => r.denials += 1,
        })
    }

    async fn set_verified(&self, id: i64, verified: bool) -> Result<Option<Report>> {
        self.update_report_with(id, |r| r.is_verified = verified)
    }

    async fn reports_in_radius(&self, query: &RadiusQuery) -> Result<Page<Report>> {
        let mut matches: Vec<Report> = {
            let inner = self.inner.lock().unwrap();
            inner
                .reports
                .iter()
                .filter(|r| r.location().distance_meters(&query.center) <= query.radius_meters)
                .cloned()
                .collect()
        };
        newest_first(&mut matches);
        Ok(paginate(matches, query.skip, query.limit))
    }

    async fn reports_in_window(
        &self,
        window: &TimeWindow,
        skip: i64,
        limit: i64,
    ) -> Result<Page<Report>> {
        let mut matches: Vec<Report> = {
            let inner = self.inner.lock().unwrap();
            inner
                .reports
                .iter()
                .filter(|r| window.contains(r.created_at))
                .cloned()
                .collect()
        };
        newest_first(&mut matches);
        Ok(paginate(matches, skip, limit))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: &NewUser) -> Result<User> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap();
        if inner.users.iter().any(|u| u.username == user.username) {
            return Err(DuplicateKey { field: "username" }.into());
        }
        if inner.users.iter().any(|u| u.email == user.email) {
            return Err(DuplicateKey { field: "email" }.into());
        }
        inner.next_user_id += 1;
        let stored = User {
            id: inner.next_user_id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
            permissions: BTreeSet::new(),
            disabled: false,
            created_at: Utc::now(),
        };
        inner.users.push(stored.clone());
        Ok(stored)
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.username == username).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, skip: i64, limit: i64) -> Result<Vec<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(paginate(inner.users.clone(), skip, limit).items)
    }

    async fn update_user(&self, id: i64, changes: &UserChanges) -> Result<Option<User>> {
        if let Some(email) = &changes.email {
            let inner = self.inner.lock().unwrap();
            if inner.users.iter().any(|u| u.id != id && &u.email == email) {
                return Err(DuplicateKey { field: "email" }.into());
            }
        }
        self.update_user_with(id, |u| {
            if let Some(email) = &changes.email {
                u.email = email.clone();
            }
            if let Some(full_name) = &changes.full_name {
                u.full_name = Some(full_name.clone());
            }
            if let Some(hash) = &changes.password_hash {
                u.password_hash = hash.clone();
            }
        })
    }

    async fn set_role(&self, id: i64, role: Role) -> Result<Option<User>> {
        self.update_user_with(id, |u| u.role = role)
    }

    async fn set_disabled(&self, id: i64, disabled: bool) -> Result<Option<User>> {
        self.update_user_with(id, |u| u.disabled = disabled)
    }

    async fn grant_permission(&self, id: i64, permission: Permission) -> Result<Option<User>> {
        self.update_user_with(id, |u| {
            u.permissions.insert(permission);
        })
    }

    async fn revoke_permission(&self, id: i64, permission: Permission) -> Result<Option<User>> {
        self.update_user_with(id, |u| {
            u.permissions.remove(&permission);
        })
    }

    async fn delete_user(&self, id: i64) -> Result<bool> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap();
        let before = inner.users.len();
        inner.users.retain(|u| u.id != id);
        let removed = inner.users.len() != before;
        if removed {
            for report in inner.reports.iter_mut().filter(|r| r.user_id == Some(id)) {
                report.user_id = None;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, event: &NewEvent) -> Result<Event> {
        self.check_writable()?;
        Ok(self.insert_event_at(event, Utc::now()))
    }

    async fn list_events(&self, limit: i64) -> Result<Vec<Event>> {
        let mut events = self.inner.lock().unwrap().events.clone();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        events.truncate(limit.max(0) as usize);
        Ok(events)
    }

    async fn events_in_window(
        &self,
        window: &TimeWindow,
        filter: &EventFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = {
            let inner = self.inner.lock().unwrap();
            inner
                .events
                .iter()
                .filter(|e| window.contains(e.created_at) && filter.matches(e))
                .cloned()
                .collect()
        };
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(paginate(events, offset, limit).items)
    }
}
