//! Process-wide default client.
//!
//! The host sets the default once at startup with [`use_client`]; every
//! check that was not given its own client reads it at call time. A per-check
//! override (`Should::with_client`) always wins and never changes the default,
//! which makes it the race-free choice for tests that need per-case control.
//!
//! The store is never cleared automatically.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::client::LlmClient;

static DEFAULT_CLIENT: RwLock<Option<Arc<dyn LlmClient>>> = parking_lot::const_rwlock(None);

/// Install `client` as the process-wide default, returning the previous one.
///
/// Last write wins.
pub fn use_client(client: Arc<dyn LlmClient>) -> Option<Arc<dyn LlmClient>> {
    tracing::info!(client = client.name(), "default LLM client installed");
    DEFAULT_CLIENT.write().replace(client)
}

/// The current process-wide default, if one is set.
pub fn default_client() -> Option<Arc<dyn LlmClient>> {
    DEFAULT_CLIENT.read().clone()
}

/// Remove the process-wide default, returning it.
///
/// Intended for test harnesses that need to observe the unconfigured state.
pub fn clear_default_client() -> Option<Arc<dyn LlmClient>> {
    DEFAULT_CLIENT.write().take()
}

/// Pick the client for one call: the override if given, else the default.
pub(crate) fn resolve(override_client: Option<&Arc<dyn LlmClient>>) -> Option<Arc<dyn LlmClient>> {
    override_client.cloned().or_else(default_client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StaticClient;

    #[test]
    fn test_override_is_returned_as_is() {
        let client: Arc<dyn LlmClient> = StaticClient::shared("PASS");
        let resolved = resolve(Some(&client)).unwrap();
        assert!(Arc::ptr_eq(&resolved, &client));
    }
}
