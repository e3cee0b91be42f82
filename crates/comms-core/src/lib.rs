//! # Comms Core
//!
//! Core types and traits for the commskit gateway.
//!
//! This crate provides the building blocks shared by every provider and
//! web adapter:
//! - [`Validator`] turns a raw `POST /send` body into a checked [`SendRequest`]
//! - [`Dispatcher`] turns a [`SendRequest`] into a [`ProviderPayload`]
//! - [`ProviderClient`] delivers payloads, [`UploadSigner`] issues upload credentials
//! - Common errors and a framework-agnostic [`GatewayResponse`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use comms_core::{Dispatcher, RawSendRequest, SenderIdentity, Validator};
//!
//! let raw: RawSendRequest = serde_json::from_slice(body)?;
//! let request = Validator::default().validate(&raw)?;
//! let payload = Dispatcher::new(sender).dispatch(&request);
//! let receipt = client.deliver(&payload).await?;
//! ```

pub mod dispatch;
pub mod validate;

pub use dispatch::{Dispatcher, SenderIdentity, WHATSAPP_PREFIX};
pub use validate::{Validator, validate};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Reasons a send request is rejected before reaching a provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// `channel` or `recipient` was not supplied
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    /// The channel's content rule was not met
    #[error("{0}")]
    MissingContent(&'static str),
    #[error("imageUrl is not supported for calls")]
    ImageNotAllowedForCall,
    #[error("callType must be one of: tts, audio")]
    InvalidCallType,
    #[error("recipient must be an E.164 phone number, e.g. +14155551234")]
    InvalidRecipientFormat,
    #[error("invalid channel `{0}`: expected one of sms, whatsapp, call")]
    InvalidChannel(String),
    #[error("invalid {field}: {reason}")]
    InvalidMediaUrl { field: &'static str, reason: String },
}

/// Errors returned by a messaging/telephony provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider could not be reached
    #[error("http error: {0}")]
    Http(String),
    /// The provider answered with an error document
    #[error("{message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
        more_info: Option<String>,
    },
    #[error("unexpected: {0}")]
    Unexpected(String),
}

impl ProviderError {
    /// HTTP status to surface to the caller.
    ///
    /// Provider error statuses are propagated as-is; anything that is not an
    /// error status becomes a 500.
    pub fn status(&self) -> u16 {
        match self {
            ProviderError::Api { status, .. } if (400..=599).contains(status) => *status,
            ProviderError::Api { .. } => HttpStatus::InternalServerError.as_u16(),
            ProviderError::Http(_) => HttpStatus::BadGateway.as_u16(),
            ProviderError::Unexpected(_) => HttpStatus::InternalServerError.as_u16(),
        }
    }

    /// Message safe to return to the caller. Only errors the provider itself
    /// reported are passed through; local failures stay in the server log.
    pub fn client_message(&self) -> String {
        match self {
            ProviderError::Api { message, .. } => message.clone(),
            ProviderError::Http(_) => "provider unavailable".to_string(),
            ProviderError::Unexpected(_) => "internal error".to_string(),
        }
    }
}

/// HTTP status codes produced by the gateway itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    Ok = 200,
    BadRequest = 400,
    TooManyRequests = 429,
    InternalServerError = 500,
    BadGateway = 502,
    ServiceUnavailable = 503,
}

impl HttpStatus {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Delivery medium of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Sms,
    Whatsapp,
    Call,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Whatsapp => "whatsapp",
            Channel::Call => "call",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sms" => Ok(Channel::Sms),
            "whatsapp" => Ok(Channel::Whatsapp),
            "call" => Ok(Channel::Call),
            other => Err(ValidationError::InvalidChannel(other.to_string())),
        }
    }
}

/// Sub-type of a voice call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallType {
    /// Synthesized speech from the request message
    Tts,
    /// Playback of a hosted audio file
    Audio,
}

impl FromStr for CallType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tts" => Ok(CallType::Tts),
            "audio" => Ok(CallType::Audio),
            _ => Err(ValidationError::InvalidCallType),
        }
    }
}

/// Body of `POST /send` exactly as the client sent it.
///
/// Every field is optional here so that absence is reported by the
/// validator with a precise error instead of a generic decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSendRequest {
    pub channel: Option<String>,
    pub recipient: Option<String>,
    pub message: Option<String>,
    pub image_url: Option<String>,
    pub call_type: Option<String>,
    pub audio_url: Option<String>,
}

/// A phone number known to be in E.164 form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if validate::is_e164(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ValidationError::InvalidRecipientFormat)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Text and/or image for an SMS or WhatsApp message. At least one is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub text: Option<String>,
    pub media_url: Option<String>,
}

/// What a voice call does once answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallScript {
    Speech(String),
    Playback(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Sms(MessageContent),
    Whatsapp(MessageContent),
    Call(CallScript),
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub recipient: PhoneNumber,
    pub body: RequestBody,
}

impl SendRequest {
    pub fn channel(&self) -> Channel {
        match self.body {
            RequestBody::Sms(_) => Channel::Sms,
            RequestBody::Whatsapp(_) => Channel::Whatsapp,
            RequestBody::Call(_) => Channel::Call,
        }
    }
}

/// Outbound message for the provider's messaging API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePayload {
    pub from: String,
    pub to: String,
    pub body: Option<String>,
    pub media_urls: Vec<String>,
}

/// A single step of an outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceInstruction {
    Say(String),
    Play(String),
    Hangup,
}

/// Outbound call for the provider's voice API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPayload {
    pub from: String,
    pub to: String,
    pub instructions: Vec<VoiceInstruction>,
}

/// What gets sent downstream; the variant selects the provider operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderPayload {
    Message(MessagePayload),
    Call(CallPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderReceipt {
    pub id: String,
    /// Name of the backend/provider that produced the receipt, e.g. "twilio".
    pub provider: &'static str,
    /// Raw provider payload for debugging / audit.
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Stable provider key, e.g. "twilio".
    fn provider(&self) -> &'static str;

    /// Send an SMS or WhatsApp message.
    async fn send_message(&self, payload: &MessagePayload)
    -> Result<ProviderReceipt, ProviderError>;

    /// Place an outbound voice call.
    async fn place_call(&self, payload: &CallPayload) -> Result<ProviderReceipt, ProviderError>;

    /// Route a payload to exactly one of the operations above.
    async fn deliver(&self, payload: &ProviderPayload) -> Result<ProviderReceipt, ProviderError> {
        match payload {
            ProviderPayload::Message(message) => self.send_message(message).await,
            ProviderPayload::Call(call) => self.place_call(call).await,
        }
    }
}

/// Kind of media a client wants to upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Image,
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(MediaKind::Audio),
            "image" => Ok(MediaKind::Image),
            other => Err(format!("invalid upload type `{other}`: expected audio or image")),
        }
    }
}

/// Time-limited credentials for a direct client-to-storage upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUpload {
    pub timestamp: i64,
    pub signature: String,
    pub api_key: String,
    pub cloud_name: String,
    pub folder: String,
}

pub trait UploadSigner: Send + Sync {
    /// Stable provider key, e.g. "cloudinary".
    fn provider(&self) -> &'static str;

    fn sign(&self, kind: MediaKind) -> SignedUpload;
}

/// Framework-agnostic response that adapters convert into their own type.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl GatewayResponse {
    pub fn sent(receipt: &ProviderReceipt) -> Self {
        Self::json(
            HttpStatus::Ok,
            serde_json::json!({ "success": true, "id": receipt.id }),
        )
    }

    pub fn json(status: HttpStatus, body: serde_json::Value) -> Self {
        Self {
            status: status.as_u16(),
            body,
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message }),
        }
    }
}

/// Lightweight header representation to avoid tying the core to any HTTP framework.
pub type Headers = Vec<(String, String)>;

/// Utility to create a pseudo id if a provider doesn't return one.
pub fn fallback_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClient {
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl ProviderClient for RecordingClient {
        fn provider(&self) -> &'static str {
            "recording"
        }

        async fn send_message(
            &self,
            _payload: &MessagePayload,
        ) -> Result<ProviderReceipt, ProviderError> {
            self.calls.lock().unwrap().push("message");
            Ok(ProviderReceipt {
                id: "SM1".into(),
                provider: "recording",
                raw: serde_json::Value::Null,
            })
        }

        async fn place_call(&self, _payload: &CallPayload) -> Result<ProviderReceipt, ProviderError> {
            self.calls.lock().unwrap().push("call");
            Ok(ProviderReceipt {
                id: "CA1".into(),
                provider: "recording",
                raw: serde_json::Value::Null,
            })
        }
    }

    #[tokio::test]
    async fn deliver_calls_exactly_one_operation() {
        let client = RecordingClient::default();
        let call = ProviderPayload::Call(CallPayload {
            from: "+15550001111".into(),
            to: "+15550002222".into(),
            instructions: vec![VoiceInstruction::Say("hi".into()), VoiceInstruction::Hangup],
        });

        let receipt = client.deliver(&call).await.unwrap();
        assert_eq!(receipt.id, "CA1");
        assert_eq!(*client.calls.lock().unwrap(), vec!["call"]);
    }

    #[test]
    fn provider_error_status_mapping() {
        let api = |status| ProviderError::Api {
            status,
            code: Some(21211),
            message: "bad number".into(),
            more_info: None,
        };
        assert_eq!(api(400).status(), 400);
        assert_eq!(api(401).status(), 401);
        assert_eq!(api(200).status(), 500);
        assert_eq!(ProviderError::Http("timeout".into()).status(), 502);
        assert_eq!(api(400).to_string(), "bad number");
    }

    #[test]
    fn client_message_hides_local_failures() {
        let api = ProviderError::Api {
            status: 400,
            code: Some(21608),
            message: "unverified number".into(),
            more_info: None,
        };
        assert_eq!(api.client_message(), "unverified number");

        let http = ProviderError::Http(
            "error sending request for url (https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json)"
                .into(),
        );
        assert_eq!(http.client_message(), "provider unavailable");
        assert!(!http.client_message().contains("AC123"));
        assert_eq!(
            ProviderError::Unexpected("builder failed".into()).client_message(),
            "internal error"
        );
    }

    #[test]
    fn raw_request_uses_camel_case() {
        let raw: RawSendRequest = serde_json::from_value(serde_json::json!({
            "channel": "call",
            "recipient": "+14155551234",
            "callType": "audio",
            "audioUrl": "https://example.com/a.mp3"
        }))
        .unwrap();
        assert_eq!(raw.call_type.as_deref(), Some("audio"));
        assert_eq!(raw.audio_url.as_deref(), Some("https://example.com/a.mp3"));
        assert!(raw.image_url.is_none());
    }

    #[test]
    fn error_response_escapes_message() {
        let response = GatewayResponse::error(400, r#"bad "quote""#);
        assert_eq!(response.body["error"], r#"bad "quote""#);
    }

    #[test]
    fn media_kind_parsing() {
        assert_eq!("audio".parse::<MediaKind>(), Ok(MediaKind::Audio));
        assert_eq!("image".parse::<MediaKind>(), Ok(MediaKind::Image));
        assert!("video".parse::<MediaKind>().is_err());
    }
}
