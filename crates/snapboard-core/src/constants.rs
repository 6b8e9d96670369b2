//! Limits and defaults shared across crates.

/// Maximum number of manual retries for a single upload task.
pub const MAX_UPLOAD_RETRIES: u32 = 3;

/// Maximum number of operations accepted by one batch metadata update.
pub const MAX_BATCH_OPERATIONS: usize = 100;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 100;

pub const DEFAULT_MAX_FILE_SIZE_MB: usize = 10;

pub const DEFAULT_ALLOWED_CONTENT_TYPES: &str =
    "image/jpeg,image/png,image/gif,image/webp,image/heic";

/// Store tag prefixes used to recover owner and game number from a listed resource.
pub const OWNER_TAG_PREFIX: &str = "user:";
pub const COLLECTION_TAG_PREFIX: &str = "game:";

/// Context key under which an asset's description is stored.
pub const CAPTION_CONTEXT_KEY: &str = "caption";
