use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{BytesRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use bytes::Bytes;
use comms_core::{GatewayResponse, Headers};
use comms_web_generic::{GatewayProcessor, HeaderConverter, ResponseConverter};
use serde::Deserialize;

/// Body served by the liveness probe.
pub const HEALTH_BODY: &str = "commskit gateway is running";

#[derive(Clone)]
pub struct AppState {
    pub processor: GatewayProcessor,
}

/// Axum-specific header converter
pub struct AxumHeaderConverter;

impl HeaderConverter for AxumHeaderConverter {
    type HeaderType = HeaderMap;

    fn to_generic_headers(headers: &Self::HeaderType) -> Headers {
        headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }
}

/// Axum-specific response converter
pub struct AxumResponseConverter;

impl ResponseConverter for AxumResponseConverter {
    type ResponseType = axum::response::Response;

    fn from_gateway_response(response: GatewayResponse) -> Self::ResponseType {
        let status =
            StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(response.body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SignUploadQuery {
    #[serde(rename = "type")]
    pub upload_type: Option<String>,
}

/// POST /send
pub async fn send(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> impl IntoResponse {
    let response = match body {
        Ok(body) => state.processor.process_send(&body).await,
        Err(rejection) => {
            GatewayResponse::error(rejection.status().as_u16(), &rejection.body_text())
        }
    };
    AxumResponseConverter::from_gateway_response(response)
}

/// GET /api/sign-upload?type=audio|image
pub async fn sign_upload(
    State(state): State<AppState>,
    query: Result<Query<SignUploadQuery>, QueryRejection>,
) -> impl IntoResponse {
    let response = match query {
        Ok(Query(query)) => state
            .processor
            .process_sign_upload(query.upload_type.as_deref()),
        Err(rejection) => {
            GatewayResponse::error(rejection.status().as_u16(), &rejection.body_text())
        }
    };
    AxumResponseConverter::from_gateway_response(response)
}

/// GET /
pub async fn health() -> &'static str {
    HEALTH_BODY
}

/// Fallback for unknown routes
pub async fn not_found() -> impl IntoResponse {
    AxumResponseConverter::from_gateway_response(GatewayResponse::error(
        StatusCode::NOT_FOUND.as_u16(),
        "not found",
    ))
}

/// Fallback for known routes hit with the wrong method
pub async fn method_not_allowed() -> impl IntoResponse {
    AxumResponseConverter::from_gateway_response(GatewayResponse::error(
        StatusCode::METHOD_NOT_ALLOWED.as_u16(),
        "method not allowed",
    ))
}

/// Routes that reach a provider; these are the ones worth rate limiting.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/send", post(send))
        .route("/api/sign-upload", get(sign_upload))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use http_body_util::BodyExt;

    #[test]
    fn converts_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let generic = AxumHeaderConverter::to_generic_headers(&headers);
        assert!(generic.contains(&("x-forwarded-for".to_string(), "203.0.113.7".to_string())));
        assert_eq!(generic.len(), 2);
    }

    #[tokio::test]
    async fn converts_provider_status_and_json_body() {
        let response = AxumResponseConverter::from_gateway_response(GatewayResponse::error(
            401,
            "Authenticate",
        ));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()["content-type"],
            HeaderValue::from_static("application/json")
        );

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Authenticate");
    }

    #[test]
    fn out_of_range_status_becomes_internal_error() {
        let response = AxumResponseConverter::from_gateway_response(GatewayResponse::error(
            1000,
            "bogus",
        ));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
