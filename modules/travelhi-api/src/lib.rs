//! HTTP and WebSocket surface of the traffic incident service.

pub mod auth;
pub mod broadcaster;
pub mod disruptions;
pub mod error;
pub mod events;
pub mod images;
pub mod incidents;
pub mod jwt;
pub mod moderation;
pub mod password;
pub mod rest;
pub mod users;
pub mod ws;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue},
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::warn;

use ai_client::ModerationAgent;
use travelhi_common::Config;
use travelhi_store::Store;

use auth::Authenticator;
use broadcaster::Broadcaster;
use disruptions::DisruptionClassifier;
use events::EventService;
use images::ImageStore;
use incidents::IncidentService;
use jwt::{JwtService, ISSUER};
use moderation::ModerationGate;
use users::UserService;

/// External collaborators the service is wired against.
pub struct Collaborators {
    pub store: Arc<dyn Store>,
    /// Remote moderation classifier; `None` runs the lexical filter only.
    pub classifier: Option<Arc<dyn ModerationAgent>>,
    /// `None` makes the prediction endpoint answer 503.
    pub disruptions: Option<Arc<dyn DisruptionClassifier>>,
    pub images: Arc<dyn ImageStore>,
}

pub struct AppState {
    pub auth: Authenticator,
    pub incidents: IncidentService,
    pub users: UserService,
    pub events: EventService,
    pub disruptions: Option<Arc<dyn DisruptionClassifier>>,
    pub broadcaster: Broadcaster,
    pub public_base_url: Option<String>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(config: &Config, deps: Collaborators) -> Arc<Self> {
        let broadcaster = Broadcaster::new(config.ws_send_buffer);
        let moderation = Arc::new(ModerationGate::new(deps.classifier, config.moderation));
        let jwt = JwtService::new(&config.jwt_secret, ISSUER, config.token_ttl_minutes);

        Arc::new(Self {
            auth: Authenticator::new(jwt, deps.store.clone()),
            incidents: IncidentService::new(
                deps.store.clone(),
                moderation,
                deps.images,
                broadcaster.clone(),
                config.counter_policy,
            ),
            users: UserService::new(deps.store.clone()),
            events: EventService::new(deps.store),
            disruptions: deps.disruptions,
            broadcaster,
            public_base_url: config
                .public_base_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            upload_dir: PathBuf::from(&config.upload_dir),
            max_upload_bytes: config.max_upload_bytes,
            allowed_origins: config.allowed_origins.clone(),
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_upload_bytes + 64 * 1024;
    let cors = cors_layer(&state.allowed_origins);
    let uploads = ServeDir::new(&state.upload_dir);

    let api = Router::new()
        // Auth
        .route("/token", post(rest::auth::login))
        // Users
        .route("/users", get(rest::users::list_users).post(rest::auth::register))
        .route("/users/me", get(rest::users::me))
        .route(
            "/users/{id}",
            get(rest::users::get_user)
                .patch(rest::users::update_user)
                .delete(rest::users::delete_user),
        )
        .route("/users/{id}/role", patch(rest::users::update_role))
        .route("/users/{id}/status", patch(rest::users::update_status))
        .route("/users/{id}/permissions/add", post(rest::users::add_permission))
        .route("/users/{id}/permissions/remove", post(rest::users::remove_permission))
        // Incidents
        .route(
            "/incidents",
            get(rest::incidents::list_incidents).post(rest::incidents::create_incident),
        )
        .route("/incidents/recent", get(rest::incidents::recent_incidents))
        .route("/incidents/{id}", get(rest::incidents::get_incident))
        .route("/incidents/{id}/like", post(rest::incidents::like_incident))
        .route("/incidents/{id}/confirm", post(rest::incidents::confirm_incident))
        .route("/incidents/{id}/deny", post(rest::incidents::deny_incident))
        .route("/incidents/{id}/verify", post(rest::incidents::verify_incident))
        // Events
        .route(
            "/events",
            get(rest::events::list_events).post(rest::events::create_event),
        )
        .route("/events/by-day", get(rest::events::events_by_day))
        .route("/events/around", get(rest::events::events_around))
        // AI
        .route("/disruptions/predict", post(rest::disruptions::predict));

    Router::new()
        .route("/health", get(rest::health))
        .route("/ws", get(ws::ws_handler))
        .nest("/api/v1", api)
        .nest_service("/uploads", uploads)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // Logging layer: method + path only (no query params, no IP)
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}
