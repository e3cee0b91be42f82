//! Validation of raw `POST /send` bodies.
//!
//! Rules are applied in a fixed order and the first failure wins:
//! required fields, channel content, recipient format, channel name,
//! then media URLs.

use crate::{
    CallScript, CallType, Channel, MessageContent, PhoneNumber, RawSendRequest, RequestBody,
    SendRequest, ValidationError,
};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

// ASCII digits only; `\d` would also accept other Unicode digit classes.
static E164: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9][0-9]{1,14}$").expect("must be valid regex"));

pub(crate) fn is_e164(s: &str) -> bool {
    E164.is_match(s)
}

/// Validate with default options.
pub fn validate(raw: &RawSendRequest) -> Result<SendRequest, ValidationError> {
    Validator::default().validate(raw)
}

/// Stateless request validator. Options are fixed at construction, so the
/// same input always produces the same verdict.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    media_url_prefix: Option<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require every media URL to start with `prefix` (e.g. the storage
    /// provider's delivery host).
    pub fn with_media_url_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.media_url_prefix = Some(prefix.into());
        self
    }

    pub fn validate(&self, raw: &RawSendRequest) -> Result<SendRequest, ValidationError> {
        let channel = present(&raw.channel).ok_or(ValidationError::MissingField("channel"))?;
        let recipient =
            present(&raw.recipient).ok_or(ValidationError::MissingField("recipient"))?;

        // An unknown channel has no content rule; it is reported after the
        // recipient check.
        let body = match channel.parse::<Channel>() {
            Ok(channel) => Ok(body_for(channel, raw)?),
            Err(invalid) => Err(invalid),
        };

        let recipient = PhoneNumber::parse(recipient)?;
        let body = body?;
        self.check_media(&body)?;

        Ok(SendRequest { recipient, body })
    }

    fn check_media(&self, body: &RequestBody) -> Result<(), ValidationError> {
        match body {
            RequestBody::Sms(content) | RequestBody::Whatsapp(content) => match &content.media_url
            {
                Some(url) => self.check_media_url("imageUrl", url),
                None => Ok(()),
            },
            RequestBody::Call(CallScript::Playback(url)) => self.check_media_url("audioUrl", url),
            RequestBody::Call(CallScript::Speech(_)) => Ok(()),
        }
    }

    fn check_media_url(&self, field: &'static str, value: &str) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidMediaUrl { field, reason };

        let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("must be an http or https URL".to_string()));
        }
        if let Some(prefix) = &self.media_url_prefix {
            if !value.starts_with(prefix.as_str()) {
                return Err(invalid(format!("must start with {prefix}")));
            }
        }
        Ok(())
    }
}

fn body_for(channel: Channel, raw: &RawSendRequest) -> Result<RequestBody, ValidationError> {
    let message = present(&raw.message);
    let image_url = present(&raw.image_url);

    match channel {
        Channel::Sms => message_content(message, image_url).map(RequestBody::Sms),
        Channel::Whatsapp => message_content(message, image_url).map(RequestBody::Whatsapp),
        Channel::Call => {
            if image_url.is_some() {
                return Err(ValidationError::ImageNotAllowedForCall);
            }
            let call_type = present(&raw.call_type)
                .ok_or(ValidationError::InvalidCallType)?
                .parse::<CallType>()?;
            let script = match call_type {
                CallType::Tts => CallScript::Speech(
                    message
                        .ok_or(ValidationError::MissingContent(
                            "message is required for tts calls",
                        ))?
                        .to_string(),
                ),
                CallType::Audio => CallScript::Playback(
                    present(&raw.audio_url)
                        .ok_or(ValidationError::MissingContent(
                            "audioUrl is required for audio calls",
                        ))?
                        .to_string(),
                ),
            };
            Ok(RequestBody::Call(script))
        }
    }
}

fn message_content(
    message: Option<&str>,
    image_url: Option<&str>,
) -> Result<MessageContent, ValidationError> {
    if message.is_none() && image_url.is_none() {
        return Err(ValidationError::MissingContent(
            "message or imageUrl is required for sms and whatsapp",
        ));
    }
    Ok(MessageContent {
        text: message.map(str::to_string),
        media_url: image_url.map(str::to_string),
    })
}

/// Blank strings count as absent.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}
