//! Direct Line v3 wire shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
/// Public struct `ChannelAccount` used across vox-bridge components.
pub struct ChannelAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Conversation handle returned by start and reconnect calls.
pub struct DirectLineConversation {
    pub conversation_id: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Utterance activity submitted to the bot.
pub struct OutboundActivity {
    #[serde(rename = "type")]
    pub activity_type: String,
    pub text: String,
    pub from: ChannelAccount,
    pub locale: String,
    pub timestamp: String,
    #[serde(default)]
    pub channel_data: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResourceResponse {
    #[serde(default)]
    pub(crate) id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Raw attachment as sent by the bot.
pub struct DirectLineAttachment {
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Raw activity as delivered on the stream.
pub struct DirectLineActivity {
    #[serde(rename = "type", default)]
    pub activity_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub from: ChannelAccount,
    #[serde(default)]
    pub reply_to_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub speak: Option<String>,
    #[serde(default)]
    pub input_hint: Option<String>,
    #[serde(default)]
    pub attachments: Vec<DirectLineAttachment>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
/// One stream frame: a batch of activities plus the resume watermark.
pub struct ActivitySet {
    #[serde(default)]
    pub activities: Vec<DirectLineActivity>,
    #[serde(default)]
    pub watermark: Option<String>,
}
