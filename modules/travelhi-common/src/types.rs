use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TravelError;
use crate::geo;
use crate::permissions::{Permission, Principal, Role};

// --- Reports ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Accident,
    Delay,
    Blockage,
    Other,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Accident => "accident",
            ReportType::Delay => "delay",
            ReportType::Blockage => "blockage",
            ReportType::Other => "other",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = TravelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accident" => Ok(ReportType::Accident),
            "delay" => Ok(ReportType::Delay),
            "blockage" => Ok(ReportType::Blockage),
            "other" => Ok(ReportType::Other),
            _ => Err(TravelError::validation(format!("Unknown report type: {s}"))),
        }
    }
}

/// A point whose coordinates are known to be within valid ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    lat: f64,
    lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Result<Self, TravelError> {
        geo::validate_coordinates(lat, lng)?;
        Ok(Self { lat, lng })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    pub fn distance_meters(&self, other: &Location) -> f64 {
        geo::haversine_distance_meters(self.lat, self.lng, other.lat, other.lng)
    }
}

/// The three crowd-sourced counters on a report. Each only ever increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportCounter {
    Likes,
    Confirmations,
    Denials,
}

impl ReportCounter {
    /// Column name in the reports table.
    pub fn column(&self) -> &'static str {
        match self {
            ReportCounter::Likes => "likes",
            ReportCounter::Confirmations => "confirmations",
            ReportCounter::Denials => "denials",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub lat: f64,
    pub lng: f64,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Stored image reference; rewritten to an absolute URL before leaving the API.
    #[serde(rename = "photo_url")]
    pub photo: Option<String>,
    pub likes: i64,
    pub confirmations: i64,
    pub denials: i64,
    pub is_verified: bool,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn location(&self) -> Location {
        Location {
            lat: self.lat,
            lng: self.lng,
        }
    }

    /// Rewrite the stored photo reference as `{base_url}/uploads/{name}`.
    pub fn with_photo_url(mut self, base_url: &str) -> Self {
        if let Some(name) = self.photo.take() {
            let base = base_url.trim_end_matches('/');
            self.photo = Some(format!("{base}/uploads/{name}"));
        }
        self
    }

    /// Text shown in live notifications: description, then name, then a
    /// placeholder.
    pub fn display_text(&self) -> &str {
        self.description
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.name.as_deref().filter(|s| !s.trim().is_empty()))
            .unwrap_or(DEFAULT_REPORT_TEXT)
    }
}

pub const DEFAULT_REPORT_TEXT: &str = "Nowe zgłoszenie";

/// Everything needed to persist a new report. Counters start at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub report_type: ReportType,
    pub location: Location,
    pub name: Option<String>,
    pub description: Option<String>,
    pub photo: Option<String>,
    pub user_id: Option<i64>,
}

/// One page of results plus the unbounded match count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

// --- Users ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    /// Explicit grants only; see [`User::effective_permissions`].
    pub permissions: BTreeSet<Permission>,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn effective_permissions(&self) -> BTreeSet<Permission> {
        crate::permissions::effective_permissions(self.role, &self.permissions)
    }
}

impl Principal for User {
    fn principal_id(&self) -> i64 {
        self.id
    }

    fn role(&self) -> Role {
        self.role
    }

    fn granted_permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

/// Profile fields a user may change. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserChanges {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub password_hash: Option<String>,
}

// --- Events ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Accident,
    Delay,
    Blockage,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Accident => "ACCIDENT",
            EventType::Delay => "DELAY",
            EventType::Blockage => "BLOCKAGE",
            EventType::Other => "OTHER",
        }
    }
}

impl FromStr for EventType {
    type Err = TravelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACCIDENT" => Ok(EventType::Accident),
            "DELAY" => Ok(EventType::Delay),
            "BLOCKAGE" => Ok(EventType::Blockage),
            "OTHER" => Ok(EventType::Other),
            _ => Err(TravelError::validation(format!("Unknown event type: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl FromStr for Severity {
    type Err = TravelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            _ => Err(TravelError::validation(format!("Unknown severity: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub severity: Severity,
    pub description: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_type: EventType,
    pub severity: Severity,
    pub description: Option<String>,
    pub location: Location,
    pub is_verified: bool,
}

/// Optional filters for time-window event queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    pub severity: Option<Severity>,
    pub is_verified: Option<bool>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        self.event_type.map_or(true, |t| t == event.event_type)
            && self.severity.map_or(true, |s| s == event.severity)
            && self.is_verified.map_or(true, |v| v == event.is_verified)
    }
}
