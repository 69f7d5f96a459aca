//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SUPABASE_URL` - Project URL (e.g. `https://abcd.supabase.co`)
//! - `SUPABASE_ANON_KEY` - Publishable (anon) API key
//!
//! ## Optional
//! - `CATALOG_PRODUCTS_TABLE` - Products relation name (default: products)
//! - `CATALOG_IMAGE_BUCKET` - Storage bucket for product photos (default: product-images)
//! - `CATALOG_MAX_PRODUCTS_PER_USER` - Cooperative per-user quota (default: 5)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag
//! - `SENTRY_SAMPLE_RATE` - Error sample rate between 0.0 and 1.0 (default: 1.0)

use pocket_catalog_core::MAX_PRODUCTS_PER_USER;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_PRODUCTS_TABLE: &str = "products";
const DEFAULT_IMAGE_BUCKET: &str = "product-images";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Top-level client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hosted backend connection settings
    pub supabase: SupabaseConfig,
    /// Catalog behaviour
    pub catalog: CatalogConfig,
    /// Sentry error tracking
    pub sentry: SentryConfig,
}

/// Hosted backend connection settings.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project base URL without a trailing slash
    pub url: String,
    /// Publishable API key sent as `apikey` on every request
    pub anon_key: SecretString,
    /// Name of the products relation
    pub products_table: String,
    /// Storage bucket holding product photos
    pub image_bucket: String,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .field("products_table", &self.products_table)
            .field("image_bucket", &self.image_bucket)
            .finish()
    }
}

/// Catalog behaviour settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Products a single user may list (enforced by callers, not the backend)
    pub max_products_per_user: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            max_products_per_user: MAX_PRODUCTS_PER_USER,
        }
    }
}

/// Sentry error tracking settings.
#[derive(Debug, Clone, Default)]
pub struct SentryConfig {
    pub dsn: Option<String>,
    pub environment: Option<String>,
    pub sample_rate: f32,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let url = parse_base_url("SUPABASE_URL", &env.required("SUPABASE_URL")?)?;
        let anon_key = SecretString::from(env.required("SUPABASE_ANON_KEY")?);

        let supabase = SupabaseConfig {
            url,
            anon_key,
            products_table: env.or_default("CATALOG_PRODUCTS_TABLE", DEFAULT_PRODUCTS_TABLE),
            image_bucket: env.or_default("CATALOG_IMAGE_BUCKET", DEFAULT_IMAGE_BUCKET),
        };

        let max_products_per_user = match env.optional("CATALOG_MAX_PRODUCTS_PER_USER") {
            Some(raw) => parse_quota("CATALOG_MAX_PRODUCTS_PER_USER", &raw)?,
            None => MAX_PRODUCTS_PER_USER,
        };

        let sample_rate = match env.optional("SENTRY_SAMPLE_RATE") {
            Some(raw) => parse_sample_rate("SENTRY_SAMPLE_RATE", &raw)?,
            None => 1.0,
        };

        Ok(Self {
            supabase,
            catalog: CatalogConfig {
                max_products_per_user,
            },
            sentry: SentryConfig {
                dsn: env.optional("SENTRY_DSN"),
                environment: env.optional("SENTRY_ENVIRONMENT"),
                sample_rate,
            },
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Get a non-empty variable; blank values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }
}

/// Validate the project URL and strip any trailing slash.
fn parse_base_url(key: &str, raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "URL must have a host".to_string(),
        ));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn parse_quota(key: &str, raw: &str) -> Result<usize, ConfigError> {
    let value = raw
        .trim()
        .parse::<usize>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if value == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be at least 1".to_string(),
        ));
    }
    Ok(value)
}

fn parse_sample_rate(key: &str, raw: &str) -> Result<f32, ConfigError> {
    let value = raw
        .trim()
        .parse::<f32>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be between 0.0 and 1.0".to_string(),
        ));
    }
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ClientConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = load(&[
            ("SUPABASE_URL", "https://abcd.supabase.co/"),
            ("SUPABASE_ANON_KEY", "anon-key"),
        ])
        .unwrap();

        assert_eq!(config.supabase.url, "https://abcd.supabase.co");
        assert_eq!(config.supabase.anon_key.expose_secret(), "anon-key");
        assert_eq!(config.supabase.products_table, "products");
        assert_eq!(config.supabase.image_bucket, "product-images");
        assert_eq!(config.catalog.max_products_per_user, 5);
        assert!(config.sentry.dsn.is_none());
        assert!((config.sentry.sample_rate - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_required_vars() {
        let err = load(&[("SUPABASE_ANON_KEY", "k")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "SUPABASE_URL"));

        let err = load(&[("SUPABASE_URL", "https://x.supabase.co"), ("SUPABASE_ANON_KEY", " ")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "SUPABASE_ANON_KEY"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = load(&[("SUPABASE_URL", "not a url"), ("SUPABASE_ANON_KEY", "k")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));

        let err = load(&[("SUPABASE_URL", "ftp://x.co"), ("SUPABASE_ANON_KEY", "k")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_quota_and_sample_rate_bounds() {
        let base = [
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_ANON_KEY", "k"),
        ];

        let mut vars = base.to_vec();
        vars.push(("CATALOG_MAX_PRODUCTS_PER_USER", "0"));
        assert!(load(&vars).is_err());

        let mut vars = base.to_vec();
        vars.push(("CATALOG_MAX_PRODUCTS_PER_USER", "12"));
        assert_eq!(load(&vars).unwrap().catalog.max_products_per_user, 12);

        let mut vars = base.to_vec();
        vars.push(("SENTRY_SAMPLE_RATE", "1.5"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_supabase_config_debug_redacts_key() {
        let config = load(&[
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_ANON_KEY", "super_secret_anon_key"),
        ])
        .unwrap();

        let debug_output = format!("{:?}", config.supabase);
        assert!(debug_output.contains("https://x.supabase.co"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_anon_key"));
    }
}
