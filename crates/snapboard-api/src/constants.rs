//! API constants

/// API version segment used in every versioned route.
pub const API_VERSION: &str = "v0";

/// Versioned prefix, e.g. `/api/v0`.
pub const API_PREFIX: &str = "/api/v0";

/// Upper bound on in-flight requests across the server.
pub const DEFAULT_HTTP_CONCURRENCY_LIMIT: usize = 10_000;

/// Largest accepted JSON body. Batch requests hold at most 100 small operations.
pub const MAX_JSON_BODY_BYTES: usize = 1024 * 1024;

pub const WEBHOOK_PATH: &str = "/api/v0/webhooks/media";
