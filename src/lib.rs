//! # commskit
//!
//! An HTTP gateway that validates outbound communication requests and hands
//! them to a messaging provider, plus signed direct uploads for media.
//!
//! ## Features
//!
//! - **Channels**: SMS, WhatsApp and voice calls (text-to-speech or audio playback)
//! - **Strict validation**: E.164 recipients, per-channel content rules, media URL checks
//! - **Typed dispatch**: closed enums from request to provider payload
//! - **Signed uploads**: short-lived Cloudinary signatures for client-side uploads
//! - **Rate limiting**: sliding-window limits per client address
//! - **Configuration**: layered files and `COMMSKIT__*` environment variables
//! - **Observability**: structured logging through `tracing`
//!
//! ## Endpoints
//!
//! | Method | Path                | Purpose                                |
//! |--------|---------------------|----------------------------------------|
//! | POST   | `/send`             | Send a message or place a call         |
//! | GET    | `/api/sign-upload`  | Issue a signed upload (`type=audio\|image`) |
//! | GET    | `/`                 | Liveness probe                         |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use commskit::prelude::*;
//! use std::sync::Arc;
//!
//! let config = AppConfig::load()?;
//! let state = server::build_state(&config)?;
//! let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
//! let app = server::build_router(&config, state, limiter)?;
//! ```

pub mod config;
pub mod logging;
pub mod rate_limiter;
pub mod server;

pub use crate::config::*;

/// Common imports for commskit usage
pub mod prelude {
    pub use crate::config::{
        AppConfig, CloudinaryConfig, ConfigurationError, LoggingConfig, ProvidersConfig,
        RateLimitConfig, SecurityConfig, ServerConfig, TwilioConfig,
    };
    pub use crate::rate_limiter::{DefaultKeyGenerator, KeyGenerator, RateLimitResult, RateLimiter};
    pub use crate::server;
    pub use comms_core::*;
}
