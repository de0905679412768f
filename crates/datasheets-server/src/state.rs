use datasheets::config::RetrievalConfig;
use datasheets::providers::configs::OpenAiProviderConfig;

/// Shared application state: immutable configuration resolved once at
/// startup and injected into every request handler.
#[derive(Clone)]
pub struct AppState {
    pub provider_config: OpenAiProviderConfig,
    pub retrieval_config: RetrievalConfig,
}
