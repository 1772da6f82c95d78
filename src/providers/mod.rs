// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scan analysis providers.
//!
//! Every provider turns a [`ScanInput`] into [`ScanMetrics`]. Which one runs
//! is chosen by `config/app.scanProvider`, read once and cached for the
//! lifetime of the process.

pub mod openai;
pub mod placeholder;
pub mod replicate;

use crate::config::Config;
use crate::db::FirestoreDb;
use crate::error::AppError;
use crate::models::{ScanInput, ScanMetrics};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub use openai::OpenAiProvider;
pub use placeholder::PlaceholderProvider;
pub use replicate::ReplicateProvider;

/// Provider failure.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The named credential is not set
    #[error("provider not configured: {0} is missing")]
    NotConfigured(&'static str),

    #[error("provider failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait ScanProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(&self, input: &ScanInput) -> Result<ScanMetrics, ProviderError>;
}

/// Value of `config/app.scanProvider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Placeholder,
    OpenAi,
    Replicate,
}

impl ProviderKind {
    /// Parse a config value. Missing or unknown values mean placeholder.
    pub fn from_config(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("openai") => ProviderKind::OpenAi,
            Some("replicate") => ProviderKind::Replicate,
            _ => ProviderKind::Placeholder,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Placeholder => "placeholder",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Replicate => "replicate",
        }
    }
}

/// All providers, plus the cached selection.
#[derive(Clone)]
pub struct ScanProviders {
    placeholder: Arc<PlaceholderProvider>,
    openai: Arc<OpenAiProvider>,
    replicate: Arc<ReplicateProvider>,
    selection: Arc<OnceCell<ProviderKind>>,
}

impl ScanProviders {
    pub fn from_config(config: &Config) -> Self {
        Self {
            placeholder: Arc::new(PlaceholderProvider),
            openai: Arc::new(OpenAiProvider::new(config.openai_api_key.clone())),
            replicate: Arc::new(ReplicateProvider::new(
                config.replicate_api_key.clone(),
                config.replicate_model.clone(),
            )),
            selection: Arc::new(OnceCell::new()),
        }
    }

    pub fn get(&self, kind: ProviderKind) -> Arc<dyn ScanProvider> {
        match kind {
            ProviderKind::Placeholder => self.placeholder.clone(),
            ProviderKind::OpenAi => self.openai.clone(),
            ProviderKind::Replicate => self.replicate.clone(),
        }
    }

    /// Selected provider kind.
    ///
    /// The first successful read of `config/app` is cached; later changes
    /// need a restart. A failed read falls back to placeholder uncached.
    pub async fn selected_kind(&self, db: &FirestoreDb) -> ProviderKind {
        let selected = self
            .selection
            .get_or_try_init(|| async {
                let config = db.get_app_config().await?;
                let kind = ProviderKind::from_config(
                    config.as_ref().and_then(|c| c.scan_provider.as_deref()),
                );
                tracing::info!(provider = kind.as_str(), "Scan provider selected");
                Ok::<_, AppError>(kind)
            })
            .await;

        match selected {
            Ok(kind) => *kind,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read app config, using placeholder provider");
                ProviderKind::Placeholder
            }
        }
    }

    pub async fn select(&self, db: &FirestoreDb) -> Arc<dyn ScanProvider> {
        self.get(self.selected_kind(db).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppConfig;

    #[test]
    fn unknown_values_fall_back_to_placeholder() {
        assert_eq!(ProviderKind::from_config(None), ProviderKind::Placeholder);
        assert_eq!(
            ProviderKind::from_config(Some("gemini")),
            ProviderKind::Placeholder
        );
        assert_eq!(
            ProviderKind::from_config(Some(" OpenAI ")),
            ProviderKind::OpenAi
        );
    }

    #[tokio::test]
    async fn selection_is_cached_for_process_lifetime() {
        let db = FirestoreDb::new_in_memory();
        let providers = ScanProviders::from_config(&Config::test_default());

        db.set_app_config(&AppConfig {
            scan_provider: Some("replicate".to_string()),
        })
        .await
        .unwrap();
        assert_eq!(providers.selected_kind(&db).await, ProviderKind::Replicate);

        db.set_app_config(&AppConfig {
            scan_provider: Some("openai".to_string()),
        })
        .await
        .unwrap();
        assert_eq!(providers.selected_kind(&db).await, ProviderKind::Replicate);
        assert_eq!(providers.select(&db).await.name(), "replicate");
    }

    #[tokio::test]
    async fn offline_db_uses_placeholder() {
        let providers = ScanProviders::from_config(&Config::test_default());
        let kind = providers.selected_kind(&FirestoreDb::new_mock()).await;
        assert_eq!(kind, ProviderKind::Placeholder);

        // The failed read is not cached
        let db = FirestoreDb::new_in_memory();
        db.set_app_config(&AppConfig {
            scan_provider: Some("openai".to_string()),
        })
        .await
        .unwrap();
        assert_eq!(providers.selected_kind(&db).await, ProviderKind::OpenAi);
    }
}
