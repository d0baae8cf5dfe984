use async_trait::async_trait;
use postpilot_core::types::{AccountCredentials, ContentItem};
use serde::{Deserialize, Serialize};

use crate::error::PublishError;

/// Outcome of one successful remote publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// Platform-native identifier of the created post.
    pub post_id: String,
}

/// Common interface implemented by every platform adapter.
///
/// Implementations must be `Send + Sync` so they can live in a
/// [`PublisherRegistry`](crate::registry::PublisherRegistry) shared across
/// timer tasks and the daemon poll loop.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Stable lowercase identifier for this platform (e.g. `"vk"`).
    ///
    /// Used as the registry key and must be unique across adapters.
    fn name(&self) -> &str;

    /// Deliver one content item to the platform.
    ///
    /// Remote and transport failures are returned as [`PublishError`];
    /// adapters never panic on bad remote data.
    async fn publish(
        &self,
        content: &ContentItem,
        creds: &AccountCredentials,
    ) -> Result<PublishReceipt, PublishError>;
}
