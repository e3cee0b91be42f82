use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat, builder::DefaultState};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use comms_core::SenderIdentity;

/// Errors that keep the gateway from starting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("incomplete cloudinary configuration, missing: {}", .0.join(", "))]
    Incomplete(Vec<&'static str>),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Messaging and storage providers
    pub providers: ProvidersConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 3000)
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub twilio: TwilioConfig,
    pub cloudinary: CloudinaryConfig,
}

/// Twilio provider configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TwilioConfig {
    /// Twilio Account SID
    pub account_sid: String,
    /// Twilio Auth Token
    pub auth_token: String,
    /// Sender number for SMS and calls
    pub phone_number: String,
    /// Sender number for WhatsApp
    pub whatsapp_number: String,
    /// API base URL (default: https://api.twilio.com)
    pub base_url: String,
}

/// Cloudinary signed-upload configuration. Optional as a whole.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Destination folder for `type=audio` uploads
    pub audio_folder: String,
    /// Destination folder for `type=image` uploads
    pub image_folder: String,
}

/// Security configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    /// Origin allowed by CORS; `*` allows any
    pub allowed_origin: String,
    /// Maximum request body size in bytes (default: 1MB)
    pub max_body_size: usize,
    /// Provider request timeout in seconds (default: 30)
    pub request_timeout: u64,
    /// Required prefix for media URLs; empty disables the check
    pub media_url_prefix: String,
    /// Key rate limits on X-Forwarded-For and friends (default: false)
    pub trust_proxy_headers: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: json or pretty (default: json)
    pub format: String,
}

/// Rate limiting configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting (default: true)
    pub enabled: bool,
    /// Requests allowed per client within one window (default: 100)
    pub max_requests: u32,
    /// Window length in seconds (default: 900)
    pub window_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            phone_number: String::new(),
            whatsapp_number: String::new(),
            base_url: "https://api.twilio.com".to_string(),
        }
    }
}

impl Default for CloudinaryConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            audio_folder: comms_cloudinary::DEFAULT_AUDIO_FOLDER.to_string(),
            image_folder: comms_cloudinary::DEFAULT_IMAGE_FOLDER.to_string(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origin: String::new(),
            max_body_size: 1024 * 1024, // 1MB
            request_timeout: 30,
            media_url_prefix: String::new(),
            trust_proxy_headers: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_seconds: 900,
        }
    }
}

impl ServerConfig {
    /// Address to bind, as an IP literal or a resolvable host name.
    pub fn bind_address(&self) -> (&str, u16) {
        (self.host.trim(), self.port)
    }
}

impl CloudinaryConfig {
    /// True when every credential is set.
    pub fn is_configured(&self) -> bool {
        self.missing().is_empty()
    }

    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.cloud_name.trim().is_empty() {
            missing.push("providers.cloudinary.cloud_name");
        }
        if self.api_key.trim().is_empty() {
            missing.push("providers.cloudinary.api_key");
        }
        if self.api_secret.trim().is_empty() {
            missing.push("providers.cloudinary.api_secret");
        }
        missing
    }
}

impl SecurityConfig {
    pub fn media_url_prefix(&self) -> Option<&str> {
        Some(self.media_url_prefix.as_str()).filter(|p| !p.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl AppConfig {
    /// Load configuration from files and environment variables, then validate it
    pub fn load() -> Result<Self, ConfigurationError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config: AppConfig = Self::defaults()?
            // Add configuration file based on environment
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local configuration file (gitignored)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables (prefixed with COMMSKIT__)
            .add_source(Environment::with_prefix("COMMSKIT").separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from an inline TOML document layered
    /// over the defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigurationError> {
        let config: AppConfig = Self::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigurationError> {
        Ok(Config::builder().add_source(Config::try_from(&AppConfig::default())?))
    }

    /// Reject configurations the gateway cannot serve traffic with.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let twilio = &self.providers.twilio;
        let required = [
            ("providers.twilio.account_sid", &twilio.account_sid),
            ("providers.twilio.auth_token", &twilio.auth_token),
            ("providers.twilio.phone_number", &twilio.phone_number),
            ("providers.twilio.whatsapp_number", &twilio.whatsapp_number),
            ("security.allowed_origin", &self.security.allowed_origin),
        ];
        let missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigurationError::Missing(missing));
        }

        let cloudinary_missing = self.providers.cloudinary.missing();
        if !cloudinary_missing.is_empty() && cloudinary_missing.len() < 3 {
            return Err(ConfigurationError::Incomplete(cloudinary_missing));
        }

        if self.rate_limit.enabled
            && (self.rate_limit.max_requests == 0 || self.rate_limit.window_seconds == 0)
        {
            return Err(ConfigurationError::Invalid(
                "rate_limit.max_requests and rate_limit.window_seconds must be positive".into(),
            ));
        }
        if self.security.request_timeout == 0 {
            return Err(ConfigurationError::Invalid(
                "security.request_timeout must be positive".into(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(ConfigurationError::Invalid(format!(
                "logging.format must be json or pretty, got `{}`",
                self.logging.format
            )));
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigurationError::Invalid("server.host must not be empty".into()));
        }
        Ok(())
    }

    pub fn sender_identity(&self) -> SenderIdentity {
        SenderIdentity {
            phone_number: self.providers.twilio.phone_number.clone(),
            whatsapp_number: self.providers.twilio.whatsapp_number.clone(),
        }
    }
}
