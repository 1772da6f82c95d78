// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup. Allowlists merge hard-coded defaults
//! with CSV overrides and are passed around inside [`Config`] rather than
//! living in globals.

use std::collections::HashSet;
use std::env;
use std::time::Duration;

/// UIDs that always get unlimited credits (test accounts; Apple sign-in may
/// withhold the email, so UIDs are listed alongside emails).
const DEFAULT_UNLIMITED_UIDS: &[&str] = &["ww481RPvMYZzwn5vLX8FXyRlGVV2"];
const DEFAULT_UNLIMITED_EMAILS: &[&str] = &["tester@adlrlabs.com"];
const DEFAULT_ADMIN_EMAILS: &[&str] = &["developer@adlrlabs.com"];

/// How strictly App Check tokens are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCheckMode {
    /// Reject requests without a valid token.
    Strict,
    /// Log a warning and continue.
    Soft,
    /// Do not look at the header at all.
    Disabled,
}

impl AppCheckMode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "strict" => AppCheckMode::Strict,
            "disabled" | "off" => AppCheckMode::Disabled,
            _ => AppCheckMode::Soft,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppCheckMode::Strict => "strict",
            AppCheckMode::Soft => "soft",
            AppCheckMode::Disabled => "disabled",
        }
    }
}

/// UID and email allowlists computed once at boot.
///
/// Emails are stored lowercased; lookups lowercase the candidate.
#[derive(Debug, Clone, Default)]
pub struct Allowlists {
    pub staff_pro_uids: HashSet<String>,
    pub staff_pro_emails: HashSet<String>,
    pub unlimited_uids: HashSet<String>,
    pub unlimited_emails: HashSet<String>,
    pub admin_emails: HashSet<String>,
}

impl Allowlists {
    /// Build allowlists from defaults plus CSV overrides.
    pub fn from_csv(
        staff_pro_uids: Option<&str>,
        staff_pro_emails: Option<&str>,
        claims_allowlist: Option<&str>,
        admin_emails: Option<&str>,
    ) -> Self {
        let mut lists = Self {
            unlimited_uids: DEFAULT_UNLIMITED_UIDS.iter().map(|s| s.to_string()).collect(),
            unlimited_emails: DEFAULT_UNLIMITED_EMAILS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            admin_emails: DEFAULT_ADMIN_EMAILS.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };

        lists.staff_pro_uids.extend(parse_csv(staff_pro_uids, false));
        lists.staff_pro_emails.extend(parse_csv(staff_pro_emails, true));
        lists.unlimited_emails.extend(parse_csv(claims_allowlist, true));
        lists.admin_emails.extend(parse_csv(admin_emails, true));
        lists
    }
}

/// Split a comma-separated list, dropping blanks.
fn parse_csv(raw: Option<&str>, lowercase: bool) -> Vec<String> {
    raw.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if lowercase {
                s.to_lowercase()
            } else {
                s.to_string()
            }
        })
        .collect()
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// GCP / Firebase project ID
    pub gcp_project_id: String,
    /// Firebase project number (App Check audience)
    pub firebase_project_number: String,
    /// Server port
    pub port: u16,

    /// Stripe secret key (presence only; checkout lives elsewhere)
    pub stripe_secret: Option<String>,
    /// OpenAI API key for the OpenAI scan provider
    pub openai_api_key: Option<String>,
    /// Replicate API key and model for the Replicate scan provider
    pub replicate_api_key: Option<String>,
    pub replicate_model: Option<String>,

    pub app_check_mode: AppCheckMode,
    /// Fixed-window rate limit defaults
    pub rate_limit_window: Duration,
    pub rate_limit_max: u32,

    pub allowlists: Allowlists,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let gcp_project_id = env::var("GCP_PROJECT_ID")
            .or_else(|_| env::var("GCLOUD_PROJECT"))
            .map_err(|_| ConfigError::Missing("GCP_PROJECT_ID"))?;

        let rate_limit_window_ms: u64 = parse_var("RATE_LIMIT_WINDOW_MS", 60_000)?;

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            firebase_project_number: env::var("FIREBASE_PROJECT_NUMBER").unwrap_or_default(),
            gcp_project_id,
            port: parse_var("PORT", 8080)?,

            stripe_secret: secret_var("STRIPE_SECRET").or_else(|| secret_var("STRIPE_SECRET_KEY")),
            openai_api_key: secret_var("OPENAI_API_KEY"),
            replicate_api_key: secret_var("REPLICATE_API_KEY"),
            replicate_model: secret_var("REPLICATE_MODEL"),

            app_check_mode: AppCheckMode::parse(
                &env::var("APP_CHECK_MODE").unwrap_or_else(|_| "soft".to_string()),
            ),
            rate_limit_window: Duration::from_millis(rate_limit_window_ms),
            rate_limit_max: parse_var("RATE_LIMIT_MAX", 30)?,

            allowlists: Allowlists::from_csv(
                env::var("STAFF_PRO_UIDS").ok().as_deref(),
                env::var("STAFF_PRO_EMAILS").ok().as_deref(),
                env::var("CLAIMS_ALLOWLIST").ok().as_deref(),
                env::var("ADMIN_EMAILS_CSV").ok().as_deref(),
            ),
        })
    }

    /// Config for tests: no provider keys, App Check disabled.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            firebase_project_number: "123456789".to_string(),
            port: 8080,
            stripe_secret: None,
            openai_api_key: None,
            replicate_api_key: None,
            replicate_model: None,
            app_check_mode: AppCheckMode::Disabled,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 30,
            allowlists: Allowlists::from_csv(None, None, None, None),
        }
    }
}

/// Read a non-empty, trimmed variable.
fn secret_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        _ => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("GCP_PROJECT_ID", "test-project");
        env::set_var("RATE_LIMIT_WINDOW_MS", "30000");
        env::set_var("APP_CHECK_MODE", "strict");
        env::set_var("STAFF_PRO_EMAILS", " Coach@Example.com ,, ");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.gcp_project_id, "test-project");
        assert_eq!(config.rate_limit_window, Duration::from_secs(30));
        assert_eq!(config.app_check_mode, AppCheckMode::Strict);
        assert!(config
            .allowlists
            .staff_pro_emails
            .contains("coach@example.com"));
        assert_eq!(config.allowlists.staff_pro_emails.len(), 1);
    }

    #[test]
    fn test_allowlist_defaults_survive_overrides() {
        let lists = Allowlists::from_csv(None, None, Some("a@b.com"), None);
        assert!(lists.unlimited_uids.contains("ww481RPvMYZzwn5vLX8FXyRlGVV2"));
        assert!(lists.unlimited_emails.contains("tester@adlrlabs.com"));
        assert!(lists.unlimited_emails.contains("a@b.com"));
    }

    #[test]
    fn test_app_check_mode_parse() {
        assert_eq!(AppCheckMode::parse("STRICT"), AppCheckMode::Strict);
        assert_eq!(AppCheckMode::parse("disabled"), AppCheckMode::Disabled);
        assert_eq!(AppCheckMode::parse("whatever"), AppCheckMode::Soft);
    }
}
