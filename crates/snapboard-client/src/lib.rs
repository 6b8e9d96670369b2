//! Snapboard media store client
//!
//! `MediaStore` is the seam between the application and the third-party media
//! management API. `HttpMediaStore` talks to the real service; the in-memory
//! `test_helpers::MockMediaStore` stands in for it in tests.

pub mod http;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;

pub use http::HttpMediaStore;
pub use store::{
    ListQuery, MediaStore, ResourceContext, ResourceUpdate, StoreError, StoreResult,
    StoredResource, UploadRequest,
};
