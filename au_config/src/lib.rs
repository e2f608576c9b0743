//! ABOUTME: Layered Aura configuration: defaults, optional TOML file, AURA_ env vars
//! ABOUTME: Validates every section and redacts provider secrets in Debug output

use au_core::{Error, Result};
use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct Config {
    /// `production` switches logs to JSON
    pub environment: String,
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub security: SecurityConfig,
    #[validate(nested)]
    pub otp: OtpConfig,
    #[validate(nested)]
    pub upload: UploadConfig,
    #[validate(nested)]
    pub ai: AiSettings,
    #[validate(nested)]
    pub storage: StorageSettings,
    #[validate(nested)]
    pub external: ExternalConfig,
    pub scheduler: SchedulerSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            security: SecurityConfig::default(),
            otp: OtpConfig::default(),
            upload: UploadConfig::default(),
            ai: AiSettings::default(),
            storage: StorageSettings::default(),
            external: ExternalConfig::default(),
            scheduler: SchedulerSettings::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    pub port: u16,
    pub obs_port: u16,
    /// Externally reachable base URL, used to build local media links
    #[validate(url)]
    pub public_base_url: String,
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            obs_port: 9000,
            public_base_url: "http://127.0.0.1:8080".to_string(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Rate limiting for the unauthenticated auth endpoints (per client IP)
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct RateLimitConfig {
    #[validate(range(min = 1, max = 10000))]
    pub requests_per_minute: u32,
    #[validate(range(min = 1, max = 3600))]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            window_seconds: 60,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    #[validate(length(min = 1))]
    pub path: String,
    #[validate(range(min = 1, max = 100))]
    pub pool_size: u32,
    pub sqlite_wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "aura.db".to_string(),
            pool_size: 10,
            sqlite_wal: true,
        }
    }
}

/// Security configuration with secret redaction
#[derive(Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct SecurityConfig {
    #[validate(length(min = 32))]
    pub jwt_secret: String,
    #[validate(range(min = 60, max = 31536000))]
    pub token_ttl_seconds: u64,
}

fn insecure_default_secret() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("INSECURE-RANDOM-{}-CHANGE-IN-PRODUCTION", timestamp)
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: insecure_default_secret(),
            token_ttl_seconds: 7 * 24 * 60 * 60,
        }
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .finish()
    }
}

/// One-time passcode policy
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct OtpConfig {
    #[validate(range(min = 4, max = 8))]
    pub code_length: usize,
    #[validate(range(min = 30, max = 3600))]
    pub ttl_seconds: i64,
    #[validate(range(min = 1, max = 20))]
    pub max_attempts: i64,
    #[validate(range(min = 0, max = 3600))]
    pub resend_cooldown_seconds: i64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            ttl_seconds: 300,
            max_attempts: 5,
            resend_cooldown_seconds: 60,
        }
    }
}

/// Upload limits
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct UploadConfig {
    #[validate(range(min = 1024, max = 104857600))] // 1KB to 100MB
    pub max_bytes: usize,
    #[validate(length(min = 1))]
    pub allowed_content_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            allowed_content_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
            ],
        }
    }
}

/// Which aura generator to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiProviderKind {
    #[default]
    Stub,
    Gemini,
}

/// AI captioning settings
#[derive(Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct AiSettings {
    pub provider: AiProviderKind,
    pub gemini_api_key: Option<String>,
    #[validate(length(min = 1))]
    pub model: String,
    #[validate(url)]
    pub base_url: String,
    #[validate(range(min = 1, max = 300))]
    pub timeout_seconds: u64,
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,
    #[validate(range(max = 60000))]
    pub retry_delay_ms: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: AiProviderKind::Stub,
            gemini_api_key: None,
            model: "gemini-1.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_seconds: 30,
            max_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl fmt::Debug for AiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiSettings")
            .field("provider", &self.provider)
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// Where uploaded images live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageProviderKind {
    #[default]
    Local,
    Cloudinary,
    Supabase,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct StorageSettings {
    pub provider: StorageProviderKind,
    /// Directory for the local provider, served under `/media`
    #[validate(length(min = 1))]
    pub local_dir: String,
    #[validate(nested)]
    pub cloudinary: Option<CloudinaryConfig>,
    #[validate(nested)]
    pub supabase: Option<SupabaseConfig>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            provider: StorageProviderKind::Local,
            local_dir: "./data/media".to_string(),
            cloudinary: None,
            supabase: None,
        }
    }
}

/// Cloudinary account
#[derive(Clone, Deserialize, Serialize, Validate)]
pub struct CloudinaryConfig {
    #[validate(length(min = 1))]
    pub cloud_name: String,
    #[validate(length(min = 1))]
    pub api_key: String,
    #[validate(length(min = 1))]
    pub api_secret: String,
    #[serde(default = "default_cloudinary_folder")]
    pub folder: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_cloudinary_folder() -> String {
    "aura".to_string()
}

impl fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field("folder", &self.folder)
            .finish()
    }
}

/// Supabase storage bucket
#[derive(Clone, Deserialize, Serialize, Validate)]
pub struct SupabaseConfig {
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 1))]
    pub service_key: String,
    #[validate(length(min = 1))]
    pub bucket: String,
}

impl fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("service_key", &"[REDACTED]")
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// External service configuration with secret redaction
#[derive(Clone, Deserialize, Serialize, Validate, Default)]
#[serde(default)]
pub struct ExternalConfig {
    #[validate(nested)]
    pub twilio: Option<TwilioConfig>,
}

impl fmt::Debug for ExternalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalConfig")
            .field("twilio", &self.twilio.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Twilio configuration
#[derive(Clone, Deserialize, Serialize, Validate)]
pub struct TwilioConfig {
    #[validate(length(min = 1))]
    pub account_sid: String,
    #[validate(length(min = 1))]
    pub auth_token: String,
    #[validate(length(min = 1))]
    pub from_number: String,
    /// Overridable for tests against a mock server
    #[serde(default)]
    pub base_url: Option<String>,
}

impl fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &"[REDACTED]")
            .field("auth_token", &"[REDACTED]")
            .field("from_number", &self.from_number)
            .finish()
    }
}

/// Background maintenance schedule (six-field cron, seconds first)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub otp_cleanup_cron: String,
    pub leaderboard_cron: String,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            otp_cleanup_cron: "0 */5 * * * *".to_string(),
            leaderboard_cron: "0 */15 * * * *".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and `AURA_*` env vars
    ///
    /// Nested keys use `__` in env names, e.g. `AURA_SECURITY__JWT_SECRET`.
    pub fn load() -> Result<Self> {
        let defaults = Config::default();
        let mut builder = ConfigBuilder::builder()
            .set_default("environment", defaults.environment.clone())?
            .set_default("server.host", defaults.server.host.clone())?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("server.obs_port", i64::from(defaults.server.obs_port))?
            .set_default("database.path", defaults.database.path.clone())?
            .set_default("database.pool_size", i64::from(defaults.database.pool_size))?
            .set_default("security.jwt_secret", defaults.security.jwt_secret.clone())?
            .set_default("ai.provider", "stub")?
            .set_default("storage.provider", "local")?;

        let file = std::env::var("AURA_CONFIG").unwrap_or_else(|_| "aura.toml".to_string());
        if std::path::Path::new(&file).exists() {
            builder = builder.add_source(File::with_name(&file).required(false));
        }

        // Environment variables have the highest priority
        builder = builder.add_source(
            Environment::with_prefix("AURA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("upload.allowed_content_types"),
        );

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build config: {}", e)))?;

        let parsed: Config = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to deserialize config: {}", e)))?;

        parsed.check()?;
        Ok(parsed)
    }

    /// Field validation plus cross-section rules the derive cannot express
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::Config(format!("Config validation failed: {}", e)))?;

        match self.storage.provider {
            StorageProviderKind::Cloudinary if self.storage.cloudinary.is_none() => {
                return Err(Error::Config(
                    "storage.provider is cloudinary but storage.cloudinary is missing".to_string(),
                ));
            }
            StorageProviderKind::Supabase if self.storage.supabase.is_none() => {
                return Err(Error::Config(
                    "storage.provider is supabase but storage.supabase is missing".to_string(),
                ));
            }
            _ => {}
        }

        if self.ai.provider == AiProviderKind::Gemini && self.ai.gemini_api_key.is_none() {
            return Err(Error::Config(
                "ai.provider is gemini but ai.gemini_api_key is missing".to_string(),
            ));
        }

        for (name, expr) in [
            ("scheduler.otp_cleanup_cron", &self.scheduler.otp_cleanup_cron),
            ("scheduler.leaderboard_cron", &self.scheduler.leaderboard_cron),
        ] {
            cron::Schedule::from_str(expr)
                .map_err(|e| Error::Config(format!("Invalid {} '{}': {}", name, expr, e)))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "AURA_SERVER__HOST",
        "AURA_SERVER__PORT",
        "AURA_DATABASE__POOL_SIZE",
        "AURA_SECURITY__JWT_SECRET",
        "AURA_OTP__TTL_SECONDS",
        "AURA_STORAGE__PROVIDER",
        "AURA_AI__PROVIDER",
        "AURA_UPLOAD__ALLOWED_CONTENT_TYPES",
    ];

    fn clear_env() {
        for key in VARS {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = Config::load().expect("Should load with defaults");

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, "aura.db");
        assert_eq!(config.otp.code_length, 6);
        assert_eq!(config.otp.ttl_seconds, 300);
        assert_eq!(config.storage.provider, StorageProviderKind::Local);
        assert_eq!(config.ai.provider, AiProviderKind::Stub);
        assert_eq!(config.ai.max_attempts, 3);
        assert!(config.external.twilio.is_none());
    }

    #[test]
    fn test_config_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("AURA_SERVER__HOST", "0.0.0.0");
        env::set_var("AURA_SERVER__PORT", "9100");
        env::set_var("AURA_OTP__TTL_SECONDS", "120");
        env::set_var("AURA_SECURITY__JWT_SECRET", "valid32characterjwtsecretfortest");
        env::set_var("AURA_UPLOAD__ALLOWED_CONTENT_TYPES", "image/png,image/gif");

        let config = Config::load().expect("Should load from env");

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.otp.ttl_seconds, 120);
        assert_eq!(
            config.upload.allowed_content_types,
            vec!["image/png".to_string(), "image/gif".to_string()]
        );

        clear_env();
    }

    #[test]
    fn test_config_validation_failure() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("AURA_DATABASE__POOL_SIZE", "200");
        assert!(Config::load().is_err());

        clear_env();
    }

    #[test]
    fn test_jwt_secret_too_short() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("AURA_SECURITY__JWT_SECRET", "short");
        assert!(Config::load().is_err());

        clear_env();
    }

    #[test]
    fn test_provider_sections_required() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("AURA_STORAGE__PROVIDER", "cloudinary");
        let err = Config::load().unwrap_err();
        assert!(err.to_string().contains("storage.cloudinary"));
        env::remove_var("AURA_STORAGE__PROVIDER");

        env::set_var("AURA_AI__PROVIDER", "gemini");
        let err = Config::load().unwrap_err();
        assert!(err.to_string().contains("gemini_api_key"));

        clear_env();
    }

    #[test]
    fn test_invalid_cron_rejected() {
        let mut config = Config::default();
        config.scheduler.otp_cleanup_cron = "every five minutes".to_string();
        assert!(config.check().is_err());
    }

    #[test]
    fn test_secret_redaction() {
        let mut config = Config::default();
        config.external.twilio = Some(TwilioConfig {
            account_sid: "ACsecret".to_string(),
            auth_token: "tok-secret".to_string(),
            from_number: "+15550001111".to_string(),
            base_url: None,
        });
        config.ai.gemini_api_key = Some("gem-secret".to_string());

        let debug_output = format!("{:?}", config);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("INSECURE-RANDOM"));
        assert!(!debug_output.contains("tok-secret"));
        assert!(!debug_output.contains("gem-secret"));
    }
}
