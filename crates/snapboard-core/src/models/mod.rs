//! Data models for the application
//!
//! Gallery assets, upload tasks, and the batch metadata request/result shapes.

mod asset;
mod batch;
mod upload;

pub use asset::*;
pub use batch::*;
pub use upload::*;
