// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OpenAI vision provider.
//!
//! Holds credentials only. Inference is not wired up yet, so a configured
//! provider returns placeholder estimates labelled `openai`.

use super::placeholder::estimate;
use super::{ProviderError, ScanProvider};
use crate::models::{ScanInput, ScanMetrics};
use async_trait::async_trait;

pub struct OpenAiProvider {
    api_key: Option<String>,
}

impl OpenAiProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl ScanProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn analyze(&self, input: &ScanInput) -> Result<ScanMetrics, ProviderError> {
        if !self.is_configured() {
            return Err(ProviderError::NotConfigured("OPENAI_API_KEY"));
        }
        Ok(estimate(input, self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blank_key_is_not_configured() {
        let provider = OpenAiProvider::new(Some("  ".to_string()));
        let err = provider.analyze(&ScanInput::default()).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn configured_stub_labels_metrics() {
        let provider = OpenAiProvider::new(Some("sk-test".to_string()));
        let metrics = provider.analyze(&ScanInput::default()).await.unwrap();
        assert_eq!(metrics.provider, "openai");
        assert!(metrics.placeholder);
    }
}
