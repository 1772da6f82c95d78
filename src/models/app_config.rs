//! Runtime app configuration stored at `config/app`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// `placeholder`, `openai` or `replicate`
    #[serde(default)]
    pub scan_provider: Option<String>,
}
