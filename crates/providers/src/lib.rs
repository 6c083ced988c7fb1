pub mod client;
pub mod factory;
pub mod openai;

use async_trait::async_trait;
use eldercare_core::types::{ChatMessage, LLMResponse};
use eldercare_core::Result;
use serde_json::Value;

/// A remote text-completion service.
///
/// `tools` are OpenAI-style function schemas; an empty slice means a plain
/// completion with no tool choice.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse>;

    fn model(&self) -> &str;
}

pub use client::build_http_client;
pub use factory::{create_fallback_provider, create_provider};
pub use openai::OpenAIProvider;
