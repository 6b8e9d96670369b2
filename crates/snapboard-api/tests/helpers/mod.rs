//! Test helpers: build AppState and router for integration tests.
//!
//! The router runs against `MockMediaStore` and an in-memory rate limiter, so no
//! network or database is needed. Run with `cargo test -p snapboard-api`.

use axum_test::TestServer;
use snapboard_api::constants;
use snapboard_api::setup::routes;
use snapboard_api::state::AppState;
use snapboard_client::test_helpers::{create_test_resource, MockMediaStore};
use snapboard_core::config::{
    CacheRetryConfig, MediaStoreConfig, RateLimitConfig, UploadConfig,
};
use snapboard_core::{Config, RateLimitBackend};
use snapboard_infra::{RateLimiter, RetryPolicy};
use snapboard_services::{PhotoService, PhotoServiceConfig};
use std::sync::Arc;

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// API path prefix for tests (e.g. `/api/v0`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

/// Path for one photo, with the public id's slashes percent-encoded.
pub fn photo_path(public_id: &str) -> String {
    api_path(&format!("/photos/{}", public_id.replace('/', "%2F")))
}

pub fn test_config() -> Config {
    Config {
        server_port: 0,
        environment: "test".to_string(),
        cors_origins: vec!["*".to_string()],
        webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        media_store: MediaStoreConfig {
            api_url: "http://media.invalid".to_string(),
            delivery_url: "http://cdn.invalid".to_string(),
            cloud_name: "test".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            root_folder: "photos".to_string(),
            timeout_secs: 5,
        },
        rate_limit: RateLimitConfig {
            backend: RateLimitBackend::Memory,
            window_ms: 60_000,
            fail_open: false,
            database_url: None,
            api_per_window: 100,
            metadata_per_window: 30,
            batch_per_window: 5,
            trusted_proxy_count: 1,
        },
        cache_retry: CacheRetryConfig {
            cache_ttl_secs: 300,
            cache_max_entries: 1000,
            max_retries: 2,
            retry_delay_ms: 0,
            max_jitter_ms: 0,
        },
        upload: UploadConfig {
            max_file_size_bytes: 10 * 1024 * 1024,
            allowed_content_types: vec!["image/jpeg".to_string(), "image/png".to_string()],
        },
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub store: MockMediaStore,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Seed a photo in `photos/{owner}/game-{game}`.
    pub fn seed_photo(&self, owner: &str, game: u32, name: &str) -> String {
        let public_id = format!("photos/{}/game-{}/{}", owner, game, name);
        let owner_tag = format!("user:{}", owner);
        let game_tag = format!("game:{}", game);
        self.store
            .insert(create_test_resource(&public_id, &[&owner_tag, &game_tag]));
        public_id
    }
}

pub fn setup_test_app() -> TestApp {
    setup_test_app_with(|_| {})
}

/// Build the app after letting the caller adjust the configuration.
pub fn setup_test_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let mut config = test_config();
    configure(&mut config);

    let store = MockMediaStore::new();
    let photos = Arc::new(PhotoService::new(
        Arc::new(store.clone()),
        PhotoServiceConfig {
            retry: RetryPolicy::immediate(config.cache_retry.max_retries),
            ..PhotoServiceConfig::from_config(&config)
        },
    ));
    let rate_limiter = Arc::new(RateLimiter::in_memory(config.rate_limit_window()));

    let state = Arc::new(AppState::new(config, photos, rate_limiter));
    let router = routes::setup_routes(&state.config, state.clone()).expect("router");
    let server = TestServer::new(router).expect("test server");

    TestApp {
        server,
        store,
        state,
    }
}
