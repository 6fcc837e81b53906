//! Static transport registry
//!
//! Replaces runtime plugin discovery with an explicit map from transport
//! identifier to factory. Capability-driven selection is an explicit ranked
//! candidate list: each candidate is instantiated and probed via
//! `support_check`, and the first supported one wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use portage_common::CancelToken;

use super::TransportClient;

/// Factory producing a ready-to-use transport client
pub type TransportFactory = Box<dyn Fn() -> Arc<dyn TransportClient> + Send + Sync>;

/// Registry mapping transport identifiers to factories
#[derive(Default)]
pub struct TransportRegistry {
    factories: Mutex<HashMap<&'static str, TransportFactory>>,
}

impl TransportRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under an identifier, replacing any previous one
    pub fn register(&self, id: &'static str, factory: TransportFactory) {
        self.factories
            .lock()
            .expect("transport registry lock poisoned")
            .insert(id, factory);
    }

    /// Instantiate the transport registered under `id`
    pub fn create(&self, id: &str) -> Option<Arc<dyn TransportClient>> {
        let factories = self
            .factories
            .lock()
            .expect("transport registry lock poisoned");
        factories.get(id).map(|factory| factory())
    }

    /// Registered identifiers, in no particular order
    pub fn ids(&self) -> Vec<&'static str> {
        self.factories
            .lock()
            .expect("transport registry lock poisoned")
            .keys()
            .copied()
            .collect()
    }

    /// Probe a ranked candidate list and return the first supported client
    ///
    /// Unknown identifiers are skipped. Returns `None` when no candidate
    /// passes its `support_check`.
    pub async fn select(
        &self,
        candidates: &[&str],
        token: &CancelToken,
    ) -> Option<Arc<dyn TransportClient>> {
        for id in candidates {
            let Some(client) = self.create(id) else {
                continue;
            };
            if client.support_check(token).await.supported {
                return Some(client);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{
        ConnectionResult, LocalDirTransport, SupportResult, TransferOutcome, TransportFatal,
    };
    use portage_common::ResolvedRecord;

    struct UnsupportedTransport;

    #[async_trait::async_trait]
    impl TransportClient for UnsupportedTransport {
        fn id(&self) -> &'static str {
            "never"
        }

        async fn transfer(
            &self,
            _record: &ResolvedRecord,
            _token: &CancelToken,
        ) -> Result<TransferOutcome, TransportFatal> {
            Ok(TransferOutcome::success(0))
        }

        async fn support_check(&self, _token: &CancelToken) -> SupportResult {
            SupportResult::unsupported("probe always fails")
        }

        async fn connection_check(&self, _token: &CancelToken) -> ConnectionResult {
            ConnectionResult {
                connected: false,
                message: None,
            }
        }
    }

    fn registry_with_both() -> TransportRegistry {
        let registry = TransportRegistry::new();
        registry.register("never", Box::new(|| Arc::new(UnsupportedTransport)));
        registry.register("share", Box::new(|| Arc::new(LocalDirTransport::new())));
        registry
    }

    #[test]
    fn test_create_known_and_unknown() {
        let registry = registry_with_both();
        assert!(registry.create("share").is_some());
        assert!(registry.create("bogus").is_none());
        assert_eq!(registry.ids().len(), 2);
    }

    #[tokio::test]
    async fn test_select_respects_candidate_ranking() {
        let registry = registry_with_both();
        let token = CancelToken::new();

        // First supported candidate wins; unsupported and unknown skipped
        let client = registry
            .select(&["bogus", "never", "share"], &token)
            .await
            .expect("share should be selected");
        assert_eq!(client.id(), "share");
    }

    #[tokio::test]
    async fn test_select_none_when_nothing_supported() {
        let registry = TransportRegistry::new();
        registry.register("never", Box::new(|| Arc::new(UnsupportedTransport)));
        let token = CancelToken::new();
        assert!(registry.select(&["never"], &token).await.is_none());
    }
}
