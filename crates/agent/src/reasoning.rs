use eldercare_core::types::ChatMessage;
use eldercare_providers::Provider;
use tracing::warn;

/// Text from the completion service, or the template used in its place.
#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    Model(String),
    Fallback { text: String, reason: String },
}

impl Generated {
    pub fn text(&self) -> &str {
        match self {
            Generated::Model(t) => t,
            Generated::Fallback { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Generated::Model(t) => t,
            Generated::Fallback { text, .. } => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Generated::Fallback { .. })
    }
}

/// One tool-less completion. Errors and empty replies yield `fallback`.
pub async fn complete_text(provider: &dyn Provider, system: &str, user: &str, fallback: String) -> Generated {
    let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
    complete_messages(provider, &messages, fallback).await
}

pub async fn complete_messages(provider: &dyn Provider, messages: &[ChatMessage], fallback: String) -> Generated {
    match provider.chat(messages, &[]).await {
        Ok(resp) => match resp.content.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()) {
            Some(text) => Generated::Model(text),
            None => {
                warn!(model = provider.model(), "Empty completion, using template");
                Generated::Fallback {
                    text: fallback,
                    reason: "empty completion".to_string(),
                }
            }
        },
        Err(e) => {
            warn!(model = provider.model(), error = %e, "Completion failed, using template");
            Generated::Fallback {
                text: fallback,
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_accessors() {
        let g = Generated::Fallback {
            text: "template".into(),
            reason: "429".into(),
        };
        assert!(g.is_fallback());
        assert_eq!(g.text(), "template");
        assert_eq!(Generated::Model("hi".into()).into_text(), "hi");
    }
}
