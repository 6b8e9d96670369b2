//! Snapboard Core Library
//!
//! This crate provides the domain models, error types, configuration, and upload
//! validation shared by every Snapboard component.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use config::{Config, RateLimitBackend};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use validation::{UploadValidator, ValidationError};
