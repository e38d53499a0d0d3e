use std::path::Path;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::{Result, event::InboundEvent};

/// Where to send a reply back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub user_id: String,
    /// Present for group conversations.
    pub group_id: Option<String>,
    pub private: bool,
}

impl ReplyTarget {
    pub fn private(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            group_id: None,
            private: true,
        }
    }

    pub fn group(user_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            group_id: Some(group_id.into()),
            private: false,
        }
    }
}

/// Deliver text or files to a user or group.
///
/// Implemented by the transport. Callers treat both operations as
/// fire-and-forget and only log failures.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_text(&self, to: &ReplyTarget, text: &str) -> Result<()>;
    async fn send_file(&self, to: &ReplyTarget, path: &Path) -> Result<()>;
}

/// Entry point the transport calls for each inbound event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: InboundEvent);
}
