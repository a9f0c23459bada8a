use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::{ModerationAgent, OpenAi};
use travelhi_api::disruptions::DisruptionClassifier;
use travelhi_api::images::LocalImageStore;
use travelhi_api::{build_router, AppState, Collaborators};
use travelhi_common::Config;
use travelhi_store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let config = Config::from_env()?;

    let store = PgStore::connect(&config.database_url, 10).await?;
    store.migrate().await?;

    // Both AI collaborators share one client; without a key the service
    // runs the lexical filter only and prediction answers 503.
    let openai = config.openai_api_key.as_ref().map(|key| {
        Arc::new(
            OpenAi::new(key.clone(), config.openai_model.clone())
                .with_timeout(config.moderation.timeout),
        )
    });
    if openai.is_none() {
        info!("OPENAI_API_KEY not set, remote moderation disabled");
    }

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    let images = Arc::new(LocalImageStore::new(&config.upload_dir, config.max_upload_bytes));

    let state = AppState::new(
        &config,
        Collaborators {
            store: Arc::new(store),
            classifier: openai.clone().map(|c| c as Arc<dyn ModerationAgent>),
            disruptions: openai.map(|c| c as Arc<dyn DisruptionClassifier>),
            images,
        },
    );
    let app = build_router(state);

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("travelhi API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// `RUST_LOG` plus info for the service crates and the provider client,
/// whose fallback warnings would otherwise be filtered out.
fn log_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive("travelhi=info".parse()?)
        .add_directive("ai_client=info".parse()?))
}

/// `LOG_FORMAT=json` switches to structured output for log shipping.
fn init_tracing() -> Result<()> {
    let filter = log_filter()?;

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}
