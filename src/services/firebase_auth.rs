// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase ID token and App Check token verification.
//!
//! Both token kinds are RS256 JWTs signed by Google keys published as JWKS.
//! Keys are cached per verifier using the response `Cache-Control` max-age.

use crate::config::Config;
use anyhow::Context;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

const ID_TOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const APP_CHECK_JWKS_URL: &str = "https://firebaseappcheck.googleapis.com/v1/jwks";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;

/// Claims carried by a Firebase ID token, including custom claims.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Firebase UID
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub iat: Option<u64>,
    #[serde(default)]
    pub admin: Option<bool>,
    #[serde(default)]
    pub staff: Option<bool>,
    #[serde(default)]
    pub unlimited: Option<bool>,
    #[serde(default, rename = "unlimitedCredits")]
    pub unlimited_credits: Option<bool>,
    #[serde(default, rename = "creditsUnlimited")]
    pub credits_unlimited: Option<bool>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Claims carried by an App Check token.
#[derive(Debug, Clone, Deserialize)]
pub struct AppCheckClaims {
    /// Firebase app ID
    pub sub: String,
}

/// Token verification error categories.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenError {
    /// The token is missing/invalid or claims do not match expectations.
    #[error("invalid token: {0}")]
    Invalid(String),
    /// Fetching keys failed; the caller may retry.
    #[error("token verification unavailable: {0}")]
    Transient(String),
}

/// Which issuer/audience a verifier accepts.
#[derive(Debug, Clone)]
struct TokenProfile {
    jwks_url: String,
    issuers: Vec<String>,
    audiences: Vec<String>,
}

impl TokenProfile {
    fn id_token(config: &Config) -> Self {
        Self {
            jwks_url: ID_TOKEN_JWKS_URL.to_string(),
            issuers: vec![format!(
                "https://securetoken.google.com/{}",
                config.gcp_project_id
            )],
            audiences: vec![config.gcp_project_id.clone()],
        }
    }

    fn app_check(config: &Config) -> Self {
        Self {
            jwks_url: APP_CHECK_JWKS_URL.to_string(),
            issuers: vec![format!(
                "https://firebaseappcheck.googleapis.com/{}",
                config.firebase_project_number
            )],
            audiences: vec![
                format!("projects/{}", config.firebase_project_number),
                format!("projects/{}", config.gcp_project_id),
            ],
        }
    }
}

#[derive(Clone)]
enum VerifierMode {
    Google,
    StaticKey {
        kid: String,
        algorithm: Algorithm,
        decoding_key: Arc<DecodingKey>,
    },
}

#[derive(Clone)]
struct JwksCacheEntry {
    keys_by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// Verifier for Google-signed Firebase JWTs.
pub struct FirebaseTokenVerifier {
    http_client: reqwest::Client,
    profile: TokenProfile,
    mode: VerifierMode,
    jwks_cache: RwLock<Option<JwksCacheEntry>>,
    refresh_lock: Mutex<()>,
}

impl FirebaseTokenVerifier {
    /// Verifier for Firebase Auth ID tokens of this project.
    pub fn id_tokens(config: &Config) -> anyhow::Result<Self> {
        let profile = TokenProfile::id_token(config);
        tracing::info!(issuer = ?profile.issuers, "Initialized Firebase ID token verifier");
        Self::with_mode(profile, VerifierMode::Google)
    }

    /// Verifier for App Check tokens of this project.
    pub fn app_check(config: &Config) -> anyhow::Result<Self> {
        let profile = TokenProfile::app_check(config);
        tracing::info!(issuer = ?profile.issuers, "Initialized App Check token verifier");
        Self::with_mode(profile, VerifierMode::Google)
    }

    /// ID token verifier with a static key.
    ///
    /// This is intended for deterministic local/integration tests.
    pub fn id_tokens_with_static_key(
        config: &Config,
        kid: impl Into<String>,
        algorithm: Algorithm,
        decoding_key: DecodingKey,
    ) -> anyhow::Result<Self> {
        Self::with_static_key(TokenProfile::id_token(config), kid, algorithm, decoding_key)
    }

    /// App Check verifier with a static key (tests).
    pub fn app_check_with_static_key(
        config: &Config,
        kid: impl Into<String>,
        algorithm: Algorithm,
        decoding_key: DecodingKey,
    ) -> anyhow::Result<Self> {
        Self::with_static_key(TokenProfile::app_check(config), kid, algorithm, decoding_key)
    }

    fn with_static_key(
        profile: TokenProfile,
        kid: impl Into<String>,
        algorithm: Algorithm,
        decoding_key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            anyhow::bail!("static token kid must not be empty");
        }
        Self::with_mode(
            profile,
            VerifierMode::StaticKey {
                kid,
                algorithm,
                decoding_key: Arc::new(decoding_key),
            },
        )
    }

    fn with_mode(profile: TokenProfile, mode: VerifierMode) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building JWKS HTTP client")?;

        Ok(Self {
            http_client,
            profile,
            mode,
            jwks_cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Verify a Firebase ID token and return its claims.
    pub async fn verify_id_token(&self, token: &str) -> Result<IdTokenClaims, TokenError> {
        let claims: IdTokenClaims = self.verify(token).await?;

        if claims.sub.trim().is_empty() {
            return Err(TokenError::Invalid("empty sub claim".to_string()));
        }
        validate_iat(claims.iat)?;

        Ok(claims)
    }

    /// Verify an App Check token and return its claims.
    pub async fn verify_app_check_token(&self, token: &str) -> Result<AppCheckClaims, TokenError> {
        self.verify(token).await
    }

    async fn verify<C: DeserializeOwned>(&self, token: &str) -> Result<C, TokenError> {
        if token.is_empty() {
            return Err(TokenError::Invalid("token is empty".to_string()));
        }

        let header = decode_header(token)
            .map_err(|e| TokenError::Invalid(format!("invalid JWT header: {e}")))?;

        let expected_alg = self.expected_algorithm();
        if header.alg != expected_alg {
            return Err(TokenError::Invalid(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| TokenError::Invalid("missing JWT kid".to_string()))?;

        let decoding_key = self.decoding_key_for_kid(&kid).await?;

        let mut validation = Validation::new(expected_alg);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&self.profile.issuers);
        validation.set_audience(&self.profile.audiences);
        validation.validate_nbf = true;
        validation.leeway = CLOCK_SKEW_SECS;

        decode::<C>(token, decoding_key.as_ref(), &validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::Invalid(format!("JWT validation failed: {e}")))
    }

    fn expected_algorithm(&self) -> Algorithm {
        match &self.mode {
            VerifierMode::StaticKey { algorithm, .. } => *algorithm,
            VerifierMode::Google => Algorithm::RS256,
        }
    }

    async fn decoding_key_for_kid(&self, kid: &str) -> Result<Arc<DecodingKey>, TokenError> {
        if let VerifierMode::StaticKey {
            kid: static_kid,
            decoding_key,
            ..
        } = &self.mode
        {
            if kid == static_kid {
                return Ok(decoding_key.clone());
            }
            return Err(TokenError::Invalid(format!(
                "unknown JWT kid for static verifier: {kid}"
            )));
        }

        if let Some(key) = self.lookup_cached_key(kid).await {
            return Ok(key);
        }

        for force_refresh in [false, true] {
            self.refresh_jwks(force_refresh).await?;
            if let Some(key) = self.lookup_cached_key(kid).await {
                return Ok(key);
            }
        }

        Err(TokenError::Invalid(format!(
            "JWT kid not found in JWKS after refresh: {kid}"
        )))
    }

    async fn lookup_cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let cache = self.jwks_cache.read().await;
        let now = Instant::now();
        cache
            .as_ref()
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| entry.keys_by_kid.get(kid))
            .cloned()
    }

    async fn refresh_jwks(&self, force_refresh: bool) -> Result<(), TokenError> {
        let _guard = self.refresh_lock.lock().await;

        if !force_refresh {
            let cache = self.jwks_cache.read().await;
            if cache
                .as_ref()
                .is_some_and(|entry| entry.expires_at > Instant::now())
            {
                return Ok(());
            }
        }

        tracing::debug!(jwks_url = %self.profile.jwks_url, "Refreshing JWKS cache");

        let response = self
            .http_client
            .get(&self.profile.jwks_url)
            .send()
            .await
            .map_err(|e| TokenError::Transient(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(TokenError::Transient(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_CACHE_TTL);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| TokenError::Transient(format!("invalid JWKS JSON: {e}")))?;

        let keys_by_kid = usable_keys(jwks);
        if keys_by_kid.is_empty() {
            return Err(TokenError::Transient(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        *self.jwks_cache.write().await = Some(JwksCacheEntry {
            keys_by_kid,
            expires_at: Instant::now() + ttl,
        });

        tracing::debug!(ttl_secs = ttl.as_secs(), "JWKS cache refreshed");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

/// RS256 signing keys from a JWKS document, keyed by kid.
fn usable_keys(jwks: Jwks) -> HashMap<String, Arc<DecodingKey>> {
    let mut keys_by_kid = HashMap::new();

    for jwk in jwks.keys {
        if jwk.kty != "RSA" || jwk.kid.trim().is_empty() {
            continue;
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            continue;
        }
        if jwk.use_.as_deref().is_some_and(|use_| use_ != "sig") {
            continue;
        }

        match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => {
                keys_by_kid.insert(jwk.kid, Arc::new(key));
            }
            Err(e) => {
                tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
            }
        }
    }

    keys_by_kid
}

/// Pull the token out of an `Authorization: Bearer ...` value.
pub fn extract_bearer_token(value: Option<&str>) -> Result<&str, TokenError> {
    let value =
        value.ok_or_else(|| TokenError::Invalid("missing Authorization header".to_string()))?;

    let token = value.strip_prefix("Bearer ").ok_or_else(|| {
        TokenError::Invalid("Authorization header must be Bearer token".to_string())
    })?;

    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Invalid("Bearer token is empty".to_string()));
    }

    Ok(token)
}

fn validate_iat(iat: Option<u64>) -> Result<(), TokenError> {
    let Some(iat) = iat else {
        return Err(TokenError::Invalid("missing iat claim".to_string()));
    };

    if iat > now_unix_secs() + CLOCK_SKEW_SECS {
        return Err(TokenError::Invalid("iat claim is in the future".to_string()));
    }

    Ok(())
}

fn cache_ttl_from_headers(headers: &reqwest::header::HeaderMap, fallback: Duration) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    value.split(',').find_map(|directive| {
        directive
            .trim()
            .strip_prefix("max-age=")
            .and_then(|raw| raw.trim_matches('"').parse::<u64>().ok())
    })
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
