// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Replicate model provider (credentials only, placeholder output).

use super::placeholder::estimate;
use super::{ProviderError, ScanProvider};
use crate::models::{ScanInput, ScanMetrics};
use async_trait::async_trait;

pub struct ReplicateProvider {
    api_key: Option<String>,
    model: Option<String>,
}

impl ReplicateProvider {
    pub fn new(api_key: Option<String>, model: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl ScanProvider for ReplicateProvider {
    fn name(&self) -> &'static str {
        "replicate"
    }

    async fn analyze(&self, input: &ScanInput) -> Result<ScanMetrics, ProviderError> {
        if !self.is_configured() {
            return Err(ProviderError::NotConfigured("REPLICATE_API_KEY"));
        }
        tracing::debug!(model = ?self.model, "Replicate stub returning estimate");
        Ok(estimate(input, self.name()))
    }
}
