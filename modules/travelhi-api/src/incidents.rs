//! Incident mutation pipeline and read paths.
//!
//! `create` runs validate → moderate → store image → persist, then hands a
//! notice to the broadcaster on a detached task. The caller gets the
//! persisted report as soon as storage commits; broadcast failures are
//! logged and never reach the caller.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};

use travelhi_common::geo::{validate_coordinates, validate_radius};
use travelhi_common::permissions::require_permission;
use travelhi_common::{
    CounterPolicy, Location, NewReport, Page, Permission, Report, ReportCounter, ReportType,
    TravelError, TravelResult, User,
};
use travelhi_store::{RadiusQuery, ReportStore, Store, TimeWindow};

use crate::broadcaster::Broadcaster;
use crate::images::{ImageStore, ImageUpload};
use crate::moderation::ModerationGate;

pub const MAX_PAGE_SIZE: i64 = 200;
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Name shown in notices for reports without an owner.
pub const ANONYMOUS_NAME: &str = "Anonim";

#[derive(Debug, Clone)]
pub struct CreateIncident {
    pub report_type: ReportType,
    pub lat: f64,
    pub lng: f64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub photo: Option<ImageUpload>,
}

/// Live notice pushed to every connection after a report is created.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentNotice {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub user: String,
    pub message: String,
    pub lat: f64,
    pub lng: f64,
    pub likes: i64,
    pub timestamp: String,
}

impl IncidentNotice {
    pub fn for_report(report: &Report, author: Option<&User>) -> Self {
        Self {
            kind: "incident",
            user: author
                .map(|u| u.username.clone())
                .unwrap_or_else(|| ANONYMOUS_NAME.to_string()),
            message: report.display_text().to_string(),
            lat: report.lat,
            lng: report.lng,
            likes: report.likes,
            timestamp: report.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedNotice {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: i64,
}

pub struct IncidentService {
    store: Arc<dyn Store>,
    moderation: Arc<ModerationGate>,
    images: Arc<dyn ImageStore>,
    broadcaster: Broadcaster,
    counter_policy: CounterPolicy,
}

impl IncidentService {
    pub fn new(
        store: Arc<dyn Store>,
        moderation: Arc<ModerationGate>,
        images: Arc<dyn ImageStore>,
        broadcaster: Broadcaster,
        counter_policy: CounterPolicy,
    ) -> Self {
        Self {
            store,
            moderation,
            images,
            broadcaster,
            counter_policy,
        }
    }

    pub async fn create(&self, input: CreateIncident, caller: Option<&User>) -> TravelResult<Report> {
        let location = Location::new(input.lat, input.lng)?;
        let name = non_blank(input.name);
        let description = non_blank(input.description);

        if !self.moderation.moderate(description.as_deref()).await {
            return Err(TravelError::ContentRejected(
                "Description contains inappropriate content.".into(),
            ));
        }
        if !self.moderation.moderate(name.as_deref()).await {
            return Err(TravelError::ContentRejected(
                "Name contains inappropriate content.".into(),
            ));
        }

        let photo = match input.photo {
            Some(upload) => Some(self.images.store(upload).await?),
            None => None,
        };

        let report = self
            .store
            .insert_report(&NewReport {
                report_type: input.report_type,
                location,
                name,
                description,
                photo,
                user_id: caller.map(|u| u.id),
            })
            .await?;
        info!(
            report_id = report.id,
            report_type = %report.report_type,
            anonymous = caller.is_none(),
            "Incident created"
        );

        self.announce(IncidentNotice::for_report(&report, caller));
        Ok(report)
    }

    pub async fn get(&self, id: i64) -> TravelResult<Report> {
        self.store
            .get_report(id)
            .await?
            .ok_or_else(|| report_not_found(id))
    }

    /// Add one to a single counter. Open to anyone unless the counter
    /// policy demands an authenticated caller.
    pub async fn increment(
        &self,
        id: i64,
        counter: ReportCounter,
        caller: Option<&User>,
    ) -> TravelResult<Report> {
        if self.counter_policy == CounterPolicy::Authenticated && caller.is_none() {
            return Err(TravelError::unauthorized("Not authenticated"));
        }
        self.store
            .increment_counter(id, counter)
            .await?
            .ok_or_else(|| report_not_found(id))
    }

    pub async fn verify(&self, id: i64, caller: &User) -> TravelResult<Report> {
        require_permission(caller, Permission::VerifyReport)?;
        let report = self
            .store
            .set_verified(id, true)
            .await?
            .ok_or_else(|| report_not_found(id))?;
        info!(report_id = id, verified_by = caller.id, "Incident verified");

        self.announce(VerifiedNotice {
            kind: "verified",
            id,
        });
        Ok(report)
    }

    pub async fn list_in_radius(
        &self,
        lat: f64,
        lng: f64,
        radius_meters: f64,
        skip: i64,
        limit: i64,
    ) -> TravelResult<Page<Report>> {
        validate_coordinates(lat, lng)?;
        validate_radius(radius_meters)?;
        validate_page(skip, limit)?;

        let query = RadiusQuery {
            center: Location::new(lat, lng)?,
            radius_meters,
            skip,
            limit,
        };
        Ok(self.store.reports_in_radius(&query).await?)
    }

    /// Reports created in `[since, until)`, newest first.
    pub async fn list_recent(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        skip: i64,
        limit: i64,
    ) -> TravelResult<Page<Report>> {
        if since >= until {
            return Err(TravelError::validation("'since' must be earlier than 'until'"));
        }
        validate_page(skip, limit)?;
        let window = TimeWindow {
            start: since,
            end: until,
        };
        Ok(self.store.reports_in_window(&window, skip, limit).await?)
    }

    /// Fire-and-forget fan-out on a detached task.
    fn announce<T: Serialize + Send + Sync + 'static>(&self, notice: T) {
        let broadcaster = self.broadcaster.clone();
        tokio::spawn(async move {
            if let Err(e) = broadcaster.broadcast(&notice).await {
                warn!(error = %e, "Broadcast failed");
            }
        });
    }
}

fn report_not_found(id: i64) -> TravelError {
    TravelError::not_found(format!("Report with id={id} not found"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn validate_page(skip: i64, limit: i64) -> TravelResult<()> {
    if skip < 0 {
        return Err(TravelError::validation("'skip' must be non-negative"));
    }
    if !(0..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(TravelError::validation(format!(
            "'limit' must be between 0 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(())
}
