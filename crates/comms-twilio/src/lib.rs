use async_trait::async_trait;
use comms_core::{
    CallPayload, MessagePayload, ProviderClient, ProviderError, ProviderReceipt, VoiceInstruction,
};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

const PROVIDER: &str = "twilio";
const API_BASE: &str = "https://api.twilio.com";

/// Twilio REST client for the Messages and Calls resources.
#[derive(Clone)]
pub struct TwilioClient {
    /// Twilio Account SID (username for Basic auth).
    pub account_sid: String,
    auth_token: String,
    /// API base URL; override for testing/mocking.
    pub base_url: String,
    http: reqwest::Client,
}

impl fmt::Debug for TwilioClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwilioClient")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl TwilioClient {
    pub fn new<S: Into<String>>(account_sid: S, auth_token: S) -> Self {
        Self::with_base_url(account_sid, auth_token, API_BASE.to_string())
    }

    pub fn with_base_url<S: Into<String>>(account_sid: S, auth_token: S, base_url: String) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Bound every provider round-trip by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ProviderError> {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unexpected(e.to_string()))?;
        Ok(self)
    }

    fn endpoint(&self, resource: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/{}.json",
            self.base_url.trim_end_matches('/'),
            self.account_sid,
            resource
        )
    }

    async fn post_form(
        &self,
        resource: &str,
        form: &[(&str, &str)],
    ) -> Result<ProviderReceipt, ProviderError> {
        let res = self
            .http
            .post(self.endpoint(resource))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = res.status();
        let raw_text = res
            .text()
            .await
            .map_err(transport_error)?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<TwilioApiError>(&raw_text) {
                Ok(err) => ProviderError::Api {
                    status: status.as_u16(),
                    code: err.code,
                    message: err.message,
                    more_info: err.more_info,
                },
                Err(_) => ProviderError::Api {
                    status: status.as_u16(),
                    code: None,
                    message: format!("HTTP {}: {}", status, raw_text),
                    more_info: None,
                },
            });
        }

        let raw_json: serde_json::Value = serde_json::from_str(&raw_text)
            .unwrap_or_else(|_| serde_json::json!({ "raw": raw_text }));

        let id = raw_json
            .get("sid")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(comms_core::fallback_id);
        debug!("twilio accepted {} request, sid {}", resource, id);

        Ok(ProviderReceipt {
            id,
            provider: PROVIDER,
            raw: raw_json,
        })
    }
}

/// The request URL embeds the account SID, so it is logged here and stripped
/// from the error handed back to callers.
fn transport_error(e: reqwest::Error) -> ProviderError {
    warn!(error = ?e, "twilio request failed");
    ProviderError::Http(e.without_url().to_string())
}

/// Error document returned by the Twilio API on non-2xx responses.
#[derive(Debug, Deserialize)]
struct TwilioApiError {
    code: Option<i64>,
    message: String,
    more_info: Option<String>,
}

#[async_trait]
impl ProviderClient for TwilioClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send_message(
        &self,
        payload: &MessagePayload,
    ) -> Result<ProviderReceipt, ProviderError> {
        let mut form = vec![("To", payload.to.as_str()), ("From", payload.from.as_str())];
        if let Some(body) = &payload.body {
            form.push(("Body", body.as_str()));
        }
        for url in &payload.media_urls {
            form.push(("MediaUrl", url.as_str()));
        }
        self.post_form("Messages", &form).await
    }

    async fn place_call(&self, payload: &CallPayload) -> Result<ProviderReceipt, ProviderError> {
        let twiml = render_twiml(&payload.instructions);
        let form = [
            ("To", payload.to.as_str()),
            ("From", payload.from.as_str()),
            ("Twiml", twiml.as_str()),
        ];
        self.post_form("Calls", &form).await
    }
}

/// Render call instructions as a TwiML document.
pub fn render_twiml(instructions: &[VoiceInstruction]) -> String {
    let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);
    for instruction in instructions {
        match instruction {
            VoiceInstruction::Say(text) => {
                out.push_str("<Say>");
                out.push_str(&escape_xml(text));
                out.push_str("</Say>");
            }
            VoiceInstruction::Play(url) => {
                out.push_str("<Play>");
                out.push_str(&escape_xml(url));
                out.push_str("</Play>");
            }
            VoiceInstruction::Hangup => out.push_str("<Hangup/>"),
        }
    }
    out.push_str("</Response>");
    out
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> TwilioClient {
        TwilioClient::with_base_url("AC123", "secret", server.uri())
    }

    #[test]
    fn twiml_escapes_text() {
        let twiml = render_twiml(&[
            VoiceInstruction::Say("Tom & Jerry <3".into()),
            VoiceInstruction::Hangup,
        ]);
        assert!(twiml.ends_with("<Response><Say>Tom &amp; Jerry &lt;3</Say><Hangup/></Response>"));
    }

    #[test]
    fn twiml_play() {
        let twiml = render_twiml(&[
            VoiceInstruction::Play("https://example.com/a.mp3?x=1&y=2".into()),
            VoiceInstruction::Hangup,
        ]);
        assert!(twiml.contains("<Play>https://example.com/a.mp3?x=1&amp;y=2</Play><Hangup/>"));
    }

    #[test]
    fn debug_redacts_auth_token() {
        let client = TwilioClient::new("AC123", "super-secret-token");
        let debug_output = format!("{:?}", client);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super-secret-token"));
    }

    #[tokio::test]
    async fn sends_whatsapp_message_with_media() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
            .and(header("authorization", "Basic QUMxMjM6c2VjcmV0"))
            .and(body_string_contains("To=whatsapp%3A%2B14155551234"))
            .and(body_string_contains("From=whatsapp%3A%2B14155238886"))
            .and(body_string_contains("Body=hello"))
            .and(body_string_contains(
                "MediaUrl=https%3A%2F%2Fexample.com%2Fimg.png",
            ))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "sid": "SM123",
                "status": "queued"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = client(&server)
            .send_message(&MessagePayload {
                from: "whatsapp:+14155238886".into(),
                to: "whatsapp:+14155551234".into(),
                body: Some("hello".into()),
                media_urls: vec!["https://example.com/img.png".into()],
            })
            .await
            .unwrap();

        assert_eq!(receipt.id, "SM123");
        assert_eq!(receipt.provider, "twilio");
        assert_eq!(receipt.raw["status"], "queued");
    }

    #[tokio::test]
    async fn places_call_with_twiml() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC123/Calls.json"))
            .and(body_string_contains("To=%2B14155551234"))
            .and(body_string_contains("Twiml="))
            .and(body_string_contains("%3CHangup%2F%3E"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({ "sid": "CA123" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipt = client(&server)
            .place_call(&CallPayload {
                from: "+15005550006".into(),
                to: "+14155551234".into(),
                instructions: vec![VoiceInstruction::Say("hi".into()), VoiceInstruction::Hangup],
            })
            .await
            .unwrap();

        assert_eq!(receipt.id, "CA123");
    }

    #[tokio::test]
    async fn maps_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": 21211,
                "message": "The 'To' number is not a valid phone number.",
                "more_info": "https://www.twilio.com/docs/errors/21211",
                "status": 400
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .send_message(&MessagePayload {
                from: "+15005550006".into(),
                to: "+14155551234".into(),
                body: Some("hello".into()),
                media_urls: vec![],
            })
            .await
            .unwrap_err();

        match err {
            ProviderError::Api {
                status,
                code,
                message,
                more_info,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, Some(21211));
                assert!(message.contains("not a valid phone number"));
                assert!(more_info.is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn maps_non_json_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let err = client(&server)
            .place_call(&CallPayload {
                from: "+15005550006".into(),
                to: "+14155551234".into(),
                instructions: vec![VoiceInstruction::Hangup],
            })
            .await
            .unwrap_err();

        assert_eq!(err.status(), 503);
        assert!(err.to_string().contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn missing_sid_falls_back_to_generated_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let receipt = client(&server)
            .send_message(&MessagePayload {
                from: "+15005550006".into(),
                to: "+14155551234".into(),
                body: Some("hello".into()),
                media_urls: vec![],
            })
            .await
            .unwrap();

        assert!(!receipt.id.is_empty());
        assert_eq!(receipt.raw["raw"], "ok");
    }

    #[tokio::test]
    async fn unreachable_provider_is_http_error() {
        let client = TwilioClient::with_base_url("AC123", "secret", "http://127.0.0.1:1".into())
            .with_timeout(Duration::from_secs(2))
            .unwrap();

        let err = client
            .send_message(&MessagePayload {
                from: "+15005550006".into(),
                to: "+14155551234".into(),
                body: Some("hello".into()),
                media_urls: vec![],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Http(_)));
        assert_eq!(err.status(), 502);
        let message = err.to_string();
        assert!(!message.contains("AC123"), "{message}");
        assert!(!message.contains("127.0.0.1"), "{message}");
    }
}
