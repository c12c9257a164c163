//! Static provider — answers every request with a fixed reply.
//!
//! Registered as a placeholder when no upstream is configured, and handy as
//! a last-resort entry at the end of a fallback chain.

use async_trait::async_trait;
use synapse_core::completion::FinishReason;
use synapse_core::error::ProviderError;
use synapse_core::provider::{Provider, ProviderRequest, ProviderResponse};

pub struct StaticProvider {
    name: String,
    reply: String,
}

impl StaticProvider {
    pub fn new(name: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse {
            content: self.reply.clone(),
            finish_reason: FinishReason::Stop,
            usage: None,
            model: request.model,
        })
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(vec![self.name.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapse_core::message::Message;

    #[tokio::test]
    async fn replies_with_fixed_text() {
        let p = StaticProvider::new("static", "no upstream configured");
        let resp = p
            .complete(ProviderRequest {
                model: "synapse".into(),
                messages: vec![Message::user("hi")],
                temperature: 0.7,
                max_tokens: None,
                stream: false,
            })
            .await
            .unwrap();
        assert_eq!(resp.content, "no upstream configured");
        assert_eq!(resp.model, "synapse");
        assert_eq!(resp.finish_reason, FinishReason::Stop);
        assert!(p.health_check().await.unwrap());
    }
}
