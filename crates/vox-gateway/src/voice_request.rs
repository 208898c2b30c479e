//! Voice-platform request schema and routing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::voice_bridge::BridgeError;

pub const INTENT_REQUEST_TYPE: &str = "IntentRequest";
pub const SESSION_ENDED_REQUEST_TYPE: &str = "SessionEndedRequest";
pub const UTTERANCE_SLOT_NAME: &str = "phrase";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// One inbound voice request, as posted to `/messages`.
pub struct VoiceRequestEnvelope {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub session: Option<VoiceSession>,
    #[serde(default)]
    pub context: Option<VoiceContext>,
    pub request: VoiceRequestBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Public struct `VoiceSession` used across vox-bridge components.
pub struct VoiceSession {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user: Option<VoiceUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Public struct `VoiceUser` used across vox-bridge components.
pub struct VoiceUser {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub permissions: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Public struct `VoiceContext` used across vox-bridge components.
pub struct VoiceContext {
    #[serde(rename = "System", default)]
    pub system: Option<VoiceSystem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Public struct `VoiceSystem` used across vox-bridge components.
pub struct VoiceSystem {
    #[serde(default)]
    pub api_access_token: Option<String>,
    #[serde(default)]
    pub api_endpoint: Option<String>,
    #[serde(default)]
    pub device: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Public struct `VoiceRequestBody` used across vox-bridge components.
pub struct VoiceRequestBody {
    #[serde(rename = "type", default)]
    pub request_type: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub intent: Option<VoiceIntent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Public struct `VoiceIntent` used across vox-bridge components.
pub struct VoiceIntent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slots: BTreeMap<String, VoiceSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Public struct `VoiceSlot` used across vox-bridge components.
pub struct VoiceSlot {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `VoiceRoute` values.
pub enum VoiceRoute {
    Utterance(String),
    SessionEnded,
}

/// Canonical phrase sent to the bot in place of a platform built-in intent.
pub fn builtin_intent_phrase(intent_name: &str) -> Option<&'static str> {
    match intent_name {
        "AMAZON.HelpIntent" => Some("Help"),
        "AMAZON.CancelIntent" => Some("Cancel"),
        "AMAZON.StopIntent" => Some("Stop"),
        _ => None,
    }
}

impl VoiceRequestEnvelope {
    pub fn route(&self) -> Result<VoiceRoute, BridgeError> {
        match self.request.request_type.as_str() {
            INTENT_REQUEST_TYPE => {
                let intent = self.request.intent.as_ref().ok_or_else(|| {
                    BridgeError::InvalidRequest("intent request carries no intent".to_string())
                })?;
                if let Some(phrase) = builtin_intent_phrase(&intent.name) {
                    return Ok(VoiceRoute::Utterance(phrase.to_string()));
                }
                let utterance = intent
                    .slots
                    .get(UTTERANCE_SLOT_NAME)
                    .and_then(|slot| slot.value.as_deref())
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .ok_or_else(|| {
                        BridgeError::InvalidRequest(format!(
                            "intent '{}' has no '{UTTERANCE_SLOT_NAME}' slot value",
                            intent.name
                        ))
                    })?;
                Ok(VoiceRoute::Utterance(utterance.to_string()))
            }
            SESSION_ENDED_REQUEST_TYPE => Ok(VoiceRoute::SessionEnded),
            other => Err(BridgeError::InvalidRequest(format!(
                "unhandled request type '{other}'"
            ))),
        }
    }

    fn user(&self) -> Option<&VoiceUser> {
        self.session.as_ref().and_then(|session| session.user.as_ref())
    }

    fn system(&self) -> Option<&VoiceSystem> {
        self.context.as_ref().and_then(|context| context.system.as_ref())
    }

    /// Raw platform user id. Only its keyed hash is forwarded to the bot.
    pub fn user_id(&self) -> Option<&str> {
        self.user()
            .and_then(|user| user.user_id.as_deref())
            .filter(|value| !value.trim().is_empty())
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request.request_id.as_deref()
    }

    pub fn api_endpoint(&self) -> Option<&str> {
        self.system()
            .and_then(|system| system.api_endpoint.as_deref())
            .filter(|value| !value.trim().is_empty())
    }

    pub fn api_access_token(&self) -> Option<&str> {
        self.system()
            .and_then(|system| system.api_access_token.as_deref())
            .filter(|value| !value.trim().is_empty())
    }

    /// Conversation metadata forwarded to the bot. Absent fields are `null`;
    /// `user_userId` carries the hashed id, never the raw one.
    pub fn channel_data(&self, hashed_user_id: &str) -> Value {
        let user = self.user();
        let system = self.system();
        json!({
            "session_sessionId": self.session.as_ref().and_then(|session| session.session_id.clone()),
            "user_userId": hashed_user_id,
            "user_accessToken": user.and_then(|user| user.access_token.clone()),
            "user_permissions": user.and_then(|user| user.permissions.clone()),
            "alexa_apiAccessToken": system.and_then(|system| system.api_access_token.clone()),
            "alexa_apiEndpoint": system.and_then(|system| system.api_endpoint.clone()),
            "device": system.and_then(|system| system.device.clone()),
            "alexa_requestId": self.request.request_id.clone(),
        })
    }
}
