//! Renders composed replies into voice-platform response documents.

use serde::{Deserialize, Serialize};
use vox_core::HeroCard;
use vox_correlation::ComposedReply;

pub const VOICE_RESPONSE_VERSION: &str = "1.0";
pub const DEFAULT_REPROMPT_PHRASE: &str = "Can I help you with anything else?";
pub const DEFAULT_PROGRESS_PHRASE: &str = "Working on it";
const STANDARD_CARD_TYPE: &str = "Standard";
const SPEAK_DIRECTIVE_TYPE: &str = "VoicePlayer.Speak";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
/// Enumerates supported `OutputSpeechType` values.
pub enum OutputSpeechType {
    PlainText,
    #[serde(rename = "SSML")]
    Ssml,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Public struct `OutputSpeech` used across vox-bridge components.
pub struct OutputSpeech {
    #[serde(rename = "type")]
    pub speech_type: OutputSpeechType,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssml: Option<String>,
}

impl OutputSpeech {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            speech_type: OutputSpeechType::PlainText,
            text: text.into(),
            ssml: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Public struct `Reprompt` used across vox-bridge components.
pub struct Reprompt {
    pub output_speech: OutputSpeech,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Public struct `CardImage` used across vox-bridge components.
pub struct CardImage {
    pub small_image_url: String,
    pub large_image_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Public struct `VoiceCard` used across vox-bridge components.
pub struct VoiceCard {
    #[serde(rename = "type")]
    pub card_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<CardImage>,
}

impl From<&HeroCard> for VoiceCard {
    fn from(card: &HeroCard) -> Self {
        Self {
            card_type: STANDARD_CARD_TYPE.to_string(),
            title: card.title.clone(),
            text: card.text.clone(),
            image: card.image_url.as_ref().map(|url| CardImage {
                small_image_url: url.clone(),
                large_image_url: url.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Public struct `VoiceResponseBody` used across vox-bridge components.
pub struct VoiceResponseBody {
    pub output_speech: OutputSpeech,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reprompt: Option<Reprompt>,
    pub should_end_session: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<VoiceCard>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Response document returned to the voice platform.
pub struct VoiceResponse {
    pub version: String,
    pub response: VoiceResponseBody,
}

/// Builds the response for a finalized reply. Speech is wrapped as SSML only
/// when some part supplied its own spoken form.
pub fn compose_voice_response(reply: &ComposedReply, reprompt_phrase: &str) -> VoiceResponse {
    let output_speech = if reply.speech_is_ssml {
        OutputSpeech {
            speech_type: OutputSpeechType::Ssml,
            text: reply.text.clone(),
            ssml: Some(format!("<speak>{}</speak>", reply.speech)),
        }
    } else {
        OutputSpeech::plain(reply.text.clone())
    };
    VoiceResponse {
        version: VOICE_RESPONSE_VERSION.to_string(),
        response: VoiceResponseBody {
            output_speech,
            reprompt: Some(Reprompt {
                output_speech: OutputSpeech::plain(reprompt_phrase),
            }),
            should_end_session: reply.should_end_session,
            card: reply.card.as_ref().map(VoiceCard::from),
        },
    }
}

/// Terminal reply for a platform session-end signal.
pub fn compose_session_end_response() -> VoiceResponse {
    VoiceResponse {
        version: VOICE_RESPONSE_VERSION.to_string(),
        response: VoiceResponseBody {
            output_speech: OutputSpeech::plain(""),
            reprompt: None,
            should_end_session: true,
            card: None,
        },
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Public struct `ProgressDirectiveHeader` used across vox-bridge components.
pub struct ProgressDirectiveHeader {
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Public struct `SpeakDirective` used across vox-bridge components.
pub struct SpeakDirective {
    #[serde(rename = "type")]
    pub directive_type: String,
    pub speech: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Out-of-band "working on it" notice body.
pub struct ProgressDirective {
    pub header: ProgressDirectiveHeader,
    pub directive: SpeakDirective,
}

pub fn compose_progress_directive(request_id: Option<&str>, phrase: &str) -> ProgressDirective {
    ProgressDirective {
        header: ProgressDirectiveHeader {
            request_id: request_id.map(str::to_string),
        },
        directive: SpeakDirective {
            directive_type: SPEAK_DIRECTIVE_TYPE.to_string(),
            speech: phrase.to_string(),
        },
    }
}
