//! Assembly of the gateway: providers, processor, middleware and routes.

use axum::{
    Router,
    extract::{ConnectInfo, DefaultBodyLimit, Request, State},
    http::{HeaderValue, Method, header},
    middleware::{self, Next},
    response::Response,
};
use comms_cloudinary::CloudinarySigner;
use comms_core::{Dispatcher, GatewayResponse, HttpStatus, Validator};
use comms_twilio::TwilioClient;
use comms_web_axum::{AppState, AxumHeaderConverter, AxumResponseConverter};
use comms_web_generic::{GatewayProcessor, HeaderConverter, ResponseConverter};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{AppConfig, ConfigurationError, SecurityConfig};
use crate::rate_limiter::{DefaultKeyGenerator, KeyGenerator, RateLimitResult, RateLimiter};

/// Build the shared request state from configuration.
pub fn build_state(config: &AppConfig) -> Result<AppState, ConfigurationError> {
    let twilio = &config.providers.twilio;
    let client = TwilioClient::with_base_url(
        twilio.account_sid.clone(),
        twilio.auth_token.clone(),
        twilio.base_url.clone(),
    )
    .with_timeout(config.security.request_timeout())
    .map_err(|e| ConfigurationError::Invalid(format!("twilio client: {}", e)))?;

    let mut validator = Validator::new();
    if let Some(prefix) = config.security.media_url_prefix() {
        validator = validator.with_media_url_prefix(prefix);
    }

    let mut processor = GatewayProcessor::new(
        validator,
        Dispatcher::new(config.sender_identity()),
        Arc::new(client),
    );

    let cloudinary = &config.providers.cloudinary;
    if cloudinary.is_configured() {
        let signer = CloudinarySigner::new(
            cloudinary.cloud_name.clone(),
            cloudinary.api_key.clone(),
            cloudinary.api_secret.clone(),
        )
        .with_folders(
            cloudinary.audio_folder.clone(),
            cloudinary.image_folder.clone(),
        );
        processor = processor.with_upload_signer(Arc::new(signer));
    } else {
        info!("cloudinary is not configured, signed uploads are disabled");
    }

    Ok(AppState { processor })
}

/// Build the full router: routes, CORS, body limit, tracing and rate limiting.
pub fn build_router(
    config: &AppConfig,
    state: AppState,
    limiter: Arc<RateLimiter>,
) -> Result<Router, ConfigurationError> {
    let rate_limit = RateLimitState {
        limiter,
        trust_proxy_headers: config.security.trust_proxy_headers,
    };
    let api = comms_web_axum::api_routes()
        .route_layer(middleware::from_fn_with_state(rate_limit, enforce_rate_limit));

    Ok(Router::new()
        .merge(api)
        .merge(comms_web_axum::health_routes())
        .fallback(comms_web_axum::not_found)
        .method_not_allowed_fallback(comms_web_axum::method_not_allowed)
        .layer(DefaultBodyLimit::max(config.security.max_body_size))
        .layer(cors_layer(&config.security)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// CORS restricted to the configured origin(s); `*` allows any.
pub fn cors_layer(config: &SecurityConfig) -> Result<CorsLayer, ConfigurationError> {
    let allowed = config.allowed_origin.trim();
    let origin = if allowed == "*" {
        AllowOrigin::any()
    } else {
        let origins = allowed
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(|o| {
                HeaderValue::from_str(o).map_err(|e| {
                    ConfigurationError::Invalid(format!("security.allowed_origin `{}`: {}", o, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]))
}

#[derive(Clone)]
struct RateLimitState {
    limiter: Arc<RateLimiter>,
    trust_proxy_headers: bool,
}

async fn enforce_rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request, state.trust_proxy_headers);
    match state.limiter.check_rate_limit(&key).await {
        RateLimitResult::Allowed { .. } => next.run(request).await,
        RateLimitResult::Limited { retry_after } => {
            let mut response = AxumResponseConverter::from_gateway_response(GatewayResponse::error(
                HttpStatus::TooManyRequests.as_u16(),
                "too many requests, please try again later",
            ));
            let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
            response
        }
    }
}

fn client_key(request: &Request, trust_proxy_headers: bool) -> String {
    let generator = DefaultKeyGenerator;
    let forwarded = if trust_proxy_headers {
        generator.extract_client_ip(&AxumHeaderConverter::to_generic_headers(request.headers()))
    } else {
        None
    };
    let ip = forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());
    generator.generate_key("gateway", &ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn client_key_prefers_socket_address_by_default() {
        let mut request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 2], 5000))));

        assert_eq!(client_key(&request, false), "gateway:10.0.0.2");
        assert_eq!(client_key(&request, true), "gateway:203.0.113.7");
    }

    #[test]
    fn client_key_without_connection_info() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_key(&request, true), "gateway:unknown");
    }

    #[test]
    fn cors_rejects_unparseable_origin() {
        let config = SecurityConfig {
            allowed_origin: "https://ok.example, bad\norigin".into(),
            ..SecurityConfig::default()
        };
        assert!(matches!(
            cors_layer(&config),
            Err(ConfigurationError::Invalid(_))
        ));
    }
}
