//! Snapboard Services Layer
//!
//! Orchestration on top of the media store client and shared infrastructure:
//! the cache+retry photo facade, the batch metadata updater and the batch upload
//! orchestrator. HTTP handling stays in snapboard-api.

pub mod batch;
pub mod photos;
pub mod session;
pub mod upload;

pub use batch::BatchUpdater;
pub use photos::{
    folder_dependency, map_store_error, resource_dependency, CacheOptions, PhotoService,
    PhotoServiceConfig,
};
pub use session::{MemorySessionStore, SessionStore};
pub use upload::{
    IntakeReport, PendingFile, RejectedFile, UploadError, UploadEvent, UploadOrchestrator,
    UploadTarget,
};
