//! Mapping of validated requests onto provider payloads.

use crate::{
    CallPayload, CallScript, MessageContent, MessagePayload, ProviderPayload, RequestBody,
    SendRequest, VoiceInstruction,
};

/// Address prefix the provider uses for the WhatsApp channel.
pub const WHATSAPP_PREFIX: &str = "whatsapp:";

/// Sender addresses issued by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    /// Used for SMS and voice calls
    pub phone_number: String,
    /// Used for WhatsApp, with or without the channel prefix
    pub whatsapp_number: String,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    sender: SenderIdentity,
}

impl Dispatcher {
    pub fn new(sender: SenderIdentity) -> Self {
        Self { sender }
    }

    /// Build the single provider operation for `request`.
    pub fn dispatch(&self, request: &SendRequest) -> ProviderPayload {
        let to = request.recipient.as_str();
        match &request.body {
            RequestBody::Sms(content) => ProviderPayload::Message(message(
                self.sender.phone_number.clone(),
                to.to_string(),
                content,
            )),
            RequestBody::Whatsapp(content) => ProviderPayload::Message(message(
                whatsapp_address(&self.sender.whatsapp_number),
                whatsapp_address(to),
                content,
            )),
            RequestBody::Call(script) => ProviderPayload::Call(CallPayload {
                from: self.sender.phone_number.clone(),
                to: to.to_string(),
                instructions: instructions(script),
            }),
        }
    }
}

fn message(from: String, to: String, content: &MessageContent) -> MessagePayload {
    MessagePayload {
        from,
        to,
        body: content.text.clone(),
        media_urls: content.media_url.iter().cloned().collect(),
    }
}

fn instructions(script: &CallScript) -> Vec<VoiceInstruction> {
    let first = match script {
        CallScript::Speech(text) => VoiceInstruction::Say(text.clone()),
        CallScript::Playback(url) => VoiceInstruction::Play(url.clone()),
    };
    vec![first, VoiceInstruction::Hangup]
}

fn whatsapp_address(number: &str) -> String {
    if number.starts_with(WHATSAPP_PREFIX) {
        number.to_string()
    } else {
        format!("{WHATSAPP_PREFIX}{number}")
    }
}
