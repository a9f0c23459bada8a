// Test fakes for the API's collaborators.
//
// - StaticClassifier (ModerationAgent): fixed verdict, counts calls
// - FailingClassifier / SlowClassifier: error and timeout paths
// - StaticDisruptions (DisruptionClassifier): fixed prediction or error
// - MemoryImageStore (ImageStore): validates like LocalImageStore, keeps bytes in memory
//
// Plus TestApp, which wires all of them around a MemoryStore.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;

use ai_client::{ModerationAgent, ModerationResult};
use travelhi_common::{Config, CounterPolicy, ModerationPolicy, NewUser, Role, TravelResult, User};
use travelhi_store::testing::MemoryStore;
use travelhi_store::UserStore;

use crate::disruptions::{DisruptionClassifier, DisruptionPrediction, TrafficReport};
use crate::images::{validate_image, ImageStore, ImageUpload};
use crate::password::hash_password;
use crate::{build_router, AppState, Collaborators};

pub const TEST_JWT_SECRET: &str = "test-secret-key";
pub const TEST_PASSWORD: &str = "correct horse battery";

/// Smallest byte string that sniffs as PNG.
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

// ---------------------------------------------------------------------------
// Moderation classifiers
// ---------------------------------------------------------------------------

pub struct StaticClassifier {
    flagged: bool,
    categories: Vec<String>,
    calls: AtomicUsize,
}

impl StaticClassifier {
    pub fn with_categories(flagged: bool, categories: &[&str]) -> Self {
        Self {
            flagged,
            categories: categories.iter().map(|c| c.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn allowing() -> Self {
        Self::with_categories(false, &[])
    }

    pub fn flagging(categories: &[&str]) -> Self {
        Self::with_categories(true, categories)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModerationAgent for StaticClassifier {
    async fn moderate(&self, _input: &str) -> Result<ModerationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ModerationResult {
            model: "static".to_string(),
            flagged: self.flagged,
            categories: self.categories.clone(),
        })
    }
}

pub struct FailingClassifier;

#[async_trait]
impl ModerationAgent for FailingClassifier {
    async fn moderate(&self, _input: &str) -> Result<ModerationResult> {
        bail!("moderation provider unavailable")
    }
}

pub struct SlowClassifier(pub Duration);

#[async_trait]
impl ModerationAgent for SlowClassifier {
    async fn moderate(&self, _input: &str) -> Result<ModerationResult> {
        tokio::time::sleep(self.0).await;
        Ok(ModerationResult::default())
    }
}

// ---------------------------------------------------------------------------
// Disruption classifier
// ---------------------------------------------------------------------------

pub struct StaticDisruptions(pub Option<DisruptionPrediction>);

#[async_trait]
impl DisruptionClassifier for StaticDisruptions {
    async fn predict(&self, _report: &TrafficReport) -> Result<DisruptionPrediction> {
        match &self.0 {
            Some(prediction) => Ok(prediction.clone()),
            None => bail!("model overloaded"),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryImageStore
// ---------------------------------------------------------------------------

pub struct MemoryImageStore {
    max_bytes: usize,
    files: Mutex<HashMap<String, Bytes>>,
}

impl MemoryImageStore {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn stored(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn store(&self, upload: ImageUpload) -> TravelResult<String> {
        let kind = validate_image(&upload, self.max_bytes)?;
        let name = format!("{}.{}", uuid::Uuid::new_v4(), kind.extension());
        self.files.lock().unwrap().insert(name.clone(), upload.bytes);
        Ok(name)
    }
}

// ---------------------------------------------------------------------------
// TestApp
// ---------------------------------------------------------------------------

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        token_ttl_minutes: 60,
        openai_api_key: None,
        openai_model: "gpt-4o-mini".to_string(),
        moderation: ModerationPolicy {
            strict_profanity: true,
            fail_closed: false,
            timeout: Duration::from_millis(500),
        },
        api_host: "127.0.0.1".to_string(),
        api_port: 0,
        public_base_url: Some("http://testserver".to_string()),
        allowed_origins: Vec::new(),
        upload_dir: std::env::temp_dir()
            .join("travelhi-test-uploads")
            .to_string_lossy()
            .into_owned(),
        max_upload_bytes: 1024 * 1024,
        ws_send_buffer: 16,
        counter_policy: CounterPolicy::Open,
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub classifier: Arc<StaticClassifier>,
    pub images: Arc<MemoryImageStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(test_config(), StaticClassifier::allowing(), None)
    }

    pub fn with(
        config: Config,
        classifier: StaticClassifier,
        disruptions: Option<DisruptionPrediction>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let classifier = Arc::new(classifier);
        let images = Arc::new(MemoryImageStore::new(config.max_upload_bytes));
        let state = AppState::new(
            &config,
            Collaborators {
                store: store.clone(),
                classifier: Some(classifier.clone()),
                disruptions: Some(Arc::new(StaticDisruptions(disruptions))),
                images: images.clone(),
            },
        );
        Self {
            state,
            store,
            classifier,
            images,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Insert a user with `role` and return it with a valid bearer token.
    pub async fn user_with_token(&self, username: &str, role: Role) -> (User, String) {
        let user = self
            .store
            .create_user(&NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                full_name: None,
                password_hash: hash_password(TEST_PASSWORD).unwrap(),
                role,
            })
            .await
            .unwrap();
        let token = self.state.auth.jwt().create_token(user.id).unwrap();
        (user, token)
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
