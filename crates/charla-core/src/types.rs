// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Charla pipeline.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

/// Messaging channel a conversation arrived on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Whatsapp,
    Telegram,
    Sms,
    Web,
}

/// Identity of one conversation thread: (channel type, channel id, channel-user id).
///
/// At most one session exists per key. The [`group_hash`](SessionKey::group_hash)
/// is the grouping key used by the message buffer and follow-up queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub channel: ChannelKind,
    pub channel_id: String,
    pub user_id: String,
}

impl SessionKey {
    pub fn new(
        channel: ChannelKind,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            channel_id: channel_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Stable hex-encoded SHA-256 of the identity tuple.
    pub fn group_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.channel.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(self.channel_id.as_bytes());
        hasher.update(b":");
        hasher.update(self.user_id.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.channel, self.channel_id, self.user_id)
    }
}

/// Kind of media attached to an inbound message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Image,
}

/// Media attachment awaiting enrichment (transcription or vision analysis).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMedia {
    pub kind: MediaKind,
    pub url: String,
}

/// Normalized inbound message payload as buffered and replayed into the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub key: SessionKey,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<InboundMedia>,
    /// Display name reported by the channel, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
}

impl InboundMessage {
    pub fn text(key: SessionKey, text: impl Into<String>) -> Self {
        Self {
            key,
            text: text.into(),
            media: None,
            sender_name: None,
        }
    }
}

/// One turn handed to the LLM provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Token accounting reported by a provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Full (non-streaming) reply from an LLM provider.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub content: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
}

/// Result of transcribing an audio attachment.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub confidence: f32,
    pub duration_secs: f32,
}

/// Result of analyzing an image attachment.
#[derive(Debug, Clone)]
pub struct ImageAnalysis {
    pub description: String,
}

/// Payload of a human-handoff alert sent to a configured channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationAlert {
    pub reason: String,
    pub user_name: Option<String>,
    pub user_phone: Option<String>,
    pub summary: String,
}

/// One cost/latency accounting entry for a model or embedding call.
///
/// Previews are truncated by the emitter; entries are fire-and-forget and
/// never block the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEntry {
    pub session_id: String,
    pub model: String,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub input_preview: String,
    pub output_preview: String,
    pub latency_ms: u64,
    pub finish_reason: Option<String>,
}

/// Truncate a preview string to `max` characters on a char boundary.
pub fn truncate_preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn session_key_hash_is_stable_and_distinct() {
        let a = SessionKey::new(ChannelKind::Whatsapp, "biz-1", "+5511999");
        let b = SessionKey::new(ChannelKind::Whatsapp, "biz-1", "+5511999");
        let c = SessionKey::new(ChannelKind::Whatsapp, "biz-1", "+5511000");

        assert_eq!(a.group_hash(), b.group_hash());
        assert_ne!(a.group_hash(), c.group_hash());
        assert_eq!(a.group_hash().len(), 64);
    }

    #[test]
    fn channel_kind_round_trips() {
        for kind in [
            ChannelKind::Whatsapp,
            ChannelKind::Telegram,
            ChannelKind::Sms,
            ChannelKind::Web,
        ] {
            let s = kind.to_string();
            assert_eq!(ChannelKind::from_str(&s).unwrap(), kind);
        }
    }

    #[test]
    fn inbound_message_serde_round_trips() {
        let msg = InboundMessage {
            key: SessionKey::new(ChannelKind::Whatsapp, "biz", "user"),
            text: "hola".to_string(),
            media: Some(InboundMedia {
                kind: MediaKind::Audio,
                url: "https://cdn/x.ogg".to_string(),
            }),
            sender_name: Some("Ana".to_string()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: InboundMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.text, "hola");
        assert_eq!(back.media.unwrap().kind, MediaKind::Audio);
    }

    #[test]
    fn truncate_preview_respects_char_boundaries() {
        assert_eq!(truncate_preview("hello", 10), "hello");
        assert_eq!(truncate_preview("héllo wörld", 5), "héllo");
    }
}
