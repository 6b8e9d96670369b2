//! Snapboard HTTP service
//!
//! Gallery listing, photo metadata updates and deletion, batch metadata updates
//! and the media store's webhook receiver, over the services in `snapboard-services`.

pub mod api_doc;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod setup;
pub mod state;
pub mod utils;

pub use state::AppState;
