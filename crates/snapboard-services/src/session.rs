//! Per-session record of uploaded assets.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use snapboard_core::models::Asset;

/// Where finished uploads are remembered for the current session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Add assets, skipping any already recorded under the same public id.
    async fn append(&self, session_id: &str, assets: &[Asset]);

    async fn assets(&self, session_id: &str) -> Vec<Asset>;

    /// Forget a single asset. Returns whether it was recorded.
    async fn remove_asset(&self, session_id: &str, public_id: &str) -> bool;
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Vec<Asset>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn append(&self, session_id: &str, assets: &[Asset]) {
        let mut sessions = self.sessions.write().await;
        let recorded = sessions.entry(session_id.to_string()).or_default();
        for asset in assets {
            if !recorded.iter().any(|a| a.public_id == asset.public_id) {
                recorded.push(asset.clone());
            }
        }
    }

    async fn assets(&self, session_id: &str) -> Vec<Asset> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn remove_asset(&self, session_id: &str, public_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(recorded) = sessions.get_mut(session_id) else {
            return false;
        };
        let before = recorded.len();
        recorded.retain(|a| a.public_id != public_id);
        before != recorded.len()
    }
}
