use std::collections::HashMap;

use postpilot_core::types::{AccountCredentials, ContentItem};
use tracing::{error, info};

use crate::error::PublishError;
use crate::publisher::{PublishReceipt, Publisher};

/// Platform name → adapter mapping, built once at startup.
pub struct PublisherRegistry {
    publishers: HashMap<String, Box<dyn Publisher>>,
}

impl PublisherRegistry {
    /// Create an empty registry with no adapters.
    pub fn new() -> Self {
        Self {
            publishers: HashMap::new(),
        }
    }

    /// Register an adapter under its [`Publisher::name`], lowercased.
    ///
    /// If an adapter with the same name is already registered it is replaced.
    pub fn register(&mut self, publisher: Box<dyn Publisher>) {
        let name = publisher.name().to_lowercase();
        info!(platform = %name, "registering publisher adapter");
        self.publishers.insert(name, publisher);
    }

    /// Lookup is case-insensitive to match the lowercased keys.
    pub fn get(&self, platform: &str) -> Option<&dyn Publisher> {
        self.publishers
            .get(&platform.to_lowercase())
            .map(|b| b.as_ref())
    }

    /// Registered platform names, sorted for deterministic output.
    pub fn platforms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.publishers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Publish on the named platform, or fail with `Unsupported`.
    pub async fn publish(
        &self,
        platform: &str,
        content: &ContentItem,
        creds: &AccountCredentials,
    ) -> Result<PublishReceipt, PublishError> {
        let Some(publisher) = self.get(platform) else {
            error!(%platform, "no adapter registered for platform");
            return Err(PublishError::Unsupported(platform.to_string()));
        };
        publisher.publish(content, creds).await
    }
}

impl Default for PublisherRegistry {
    fn default() -> Self {
        Self::new()
    }
}
