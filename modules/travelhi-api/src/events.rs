use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;

use travelhi_common::permissions::require_permission;
use travelhi_common::{
    Event, EventFilter, EventType, Location, NewEvent, Permission, Severity, TravelError,
    TravelResult, User,
};
use travelhi_store::{EventStore, Store, TimeWindow};

pub const LIST_CAP: i64 = 1000;
pub const DEFAULT_THRESHOLD_HOURS: i64 = 3;
pub const MAX_THRESHOLD_HOURS: i64 = 24;
pub const DEFAULT_AROUND_LIMIT: i64 = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub severity: Severity,
    pub description: Option<String>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub is_verified: bool,
}

/// Parameters of a `± threshold` query around a point in time.
#[derive(Debug, Clone)]
pub struct AroundQuery {
    pub at: DateTime<Utc>,
    pub threshold_hours: i64,
    pub filter: EventFilter,
    pub limit: i64,
    pub offset: i64,
}

/// Curated traffic events.
pub struct EventService {
    store: Arc<dyn Store>,
}

impl EventService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, caller: &User, input: CreateEvent) -> TravelResult<Event> {
        require_permission(caller, Permission::ManageEvents)?;
        let event = self
            .store
            .insert_event(&NewEvent {
                event_type: input.event_type,
                severity: input.severity,
                description: input.description.filter(|d| !d.trim().is_empty()),
                location: Location::new(input.lat, input.lng)?,
                is_verified: input.is_verified,
            })
            .await?;
        info!(event_id = event.id, actor = caller.id, "Event created");
        Ok(event)
    }

    /// Newest first, capped at [`LIST_CAP`].
    pub async fn list(&self) -> TravelResult<Vec<Event>> {
        Ok(self.store.list_events(LIST_CAP).await?)
    }

    /// Events created on `day` (UTC), oldest first.
    pub async fn by_day(&self, day: NaiveDate) -> TravelResult<Vec<Event>> {
        let start = day.and_hms_opt(0, 0, 0).map(|t| t.and_utc()).ok_or_else(|| {
            TravelError::validation("Invalid day")
        })?;
        let window = TimeWindow {
            start,
            end: start + Duration::days(1),
        };
        Ok(self
            .store
            .events_in_window(&window, &EventFilter::default(), LIST_CAP, 0)
            .await?)
    }

    /// Events within `± threshold_hours` of `at`, oldest first.
    pub async fn around(&self, query: AroundQuery) -> TravelResult<Vec<Event>> {
        if !(1..=MAX_THRESHOLD_HOURS).contains(&query.threshold_hours) {
            return Err(TravelError::validation(format!(
                "'threshold_hours' must be between 1 and {MAX_THRESHOLD_HOURS}"
            )));
        }
        if !(1..=LIST_CAP).contains(&query.limit) || query.offset < 0 {
            return Err(TravelError::validation(format!(
                "'limit' must be between 1 and {LIST_CAP} and 'offset' non-negative"
            )));
        }

        let threshold = Duration::hours(query.threshold_hours);
        let window = TimeWindow {
            start: query.at - threshold,
            end: query.at + threshold,
        };
        Ok(self
            .store
            .events_in_window(&window, &query.filter, query.limit, query.offset)
            .await?)
    }
}
