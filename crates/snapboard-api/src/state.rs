//! Application state shared by every handler.

use crate::middleware::RouteRateLimit;
use snapboard_core::Config;
use snapboard_infra::{RateLimitPurpose, RateLimiter, WebhookVerifier};
use snapboard_services::{BatchUpdater, PhotoService};
use std::sync::Arc;

/// Per-purpose limits, one middleware instance each.
#[derive(Clone)]
pub struct RateLimits {
    pub api: RouteRateLimit,
    pub metadata: RouteRateLimit,
    pub batch: RouteRateLimit,
    pub webhook: RouteRateLimit,
}

impl RateLimits {
    pub fn from_config(config: &Config, limiter: Arc<RateLimiter>) -> Self {
        let route = |purpose, limit| RouteRateLimit {
            limiter: limiter.clone(),
            purpose,
            limit,
            trusted_proxy_count: config.rate_limit.trusted_proxy_count,
        };
        let limits = &config.rate_limit;
        Self {
            api: route(RateLimitPurpose::Api, limits.api_per_window),
            metadata: route(RateLimitPurpose::Metadata, limits.metadata_per_window),
            batch: route(RateLimitPurpose::Batch, limits.batch_per_window),
            // Store deliveries arrive from a handful of addresses; they share the read budget.
            webhook: route(RateLimitPurpose::Webhook, limits.api_per_window),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub photos: Arc<PhotoService>,
    pub batch: BatchUpdater,
    pub rate_limiter: Arc<RateLimiter>,
    pub rate_limits: RateLimits,
    pub webhook_verifier: WebhookVerifier,
}

impl AppState {
    pub fn new(config: Config, photos: Arc<PhotoService>, rate_limiter: Arc<RateLimiter>) -> Self {
        let rate_limits = RateLimits::from_config(&config, rate_limiter.clone());
        let webhook_verifier = WebhookVerifier::new(config.webhook_secret.clone());
        Self {
            batch: BatchUpdater::new(photos.clone()),
            photos,
            rate_limiter,
            rate_limits,
            webhook_verifier,
            config,
        }
    }
}
