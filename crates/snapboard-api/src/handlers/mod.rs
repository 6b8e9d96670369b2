pub mod batch;
pub mod health;
pub mod photos;
pub mod webhooks;
