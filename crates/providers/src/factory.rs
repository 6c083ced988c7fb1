use eldercare_core::Config;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::{OpenAIProvider, Provider};

fn primary(config: &Config) -> OpenAIProvider {
    let p = &config.provider;
    OpenAIProvider::new(
        &p.api_key,
        &p.api_base,
        &p.model,
        p.max_tokens,
        p.temperature,
        Duration::from_secs(p.timeout_secs),
    )
}

/// Completion service for the configured primary model.
pub fn create_provider(config: &Config) -> Arc<dyn Provider> {
    info!(model = %config.provider.model, api_base = %config.provider.api_base, "Creating provider");
    Arc::new(primary(config))
}

/// Fallback model on the same endpoint, when one is configured and differs
/// from the primary.
pub fn create_fallback_provider(config: &Config) -> Option<Arc<dyn Provider>> {
    let fallback = config
        .provider
        .fallback_model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty() && *m != config.provider.model)?;
    info!(model = %fallback, "Creating fallback provider");
    Some(Arc::new(primary(config).with_model(fallback)))
}
