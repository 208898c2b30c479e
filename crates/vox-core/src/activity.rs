use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Content type carried by Bot Framework hero card attachments.
pub const HERO_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.hero";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Enumerates supported `InputHint` values.
pub enum InputHint {
    ExpectingInput,
    AcceptingInput,
    IgnoringInput,
}

impl InputHint {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExpectingInput => "expectingInput",
            Self::AcceptingInput => "acceptingInput",
            Self::IgnoringInput => "ignoringInput",
        }
    }

    /// Parses the wire spelling of a hint. Unknown hints map to `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "expectingInput" => Some(Self::ExpectingInput),
            "acceptingInput" => Some(Self::AcceptingInput),
            "ignoringInput" => Some(Self::IgnoringInput),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Attachment carried by a bot activity.
pub struct Attachment {
    pub content_type: String,
    #[serde(default)]
    pub content: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
/// Card fields lifted out of a hero card attachment.
pub struct HeroCard {
    pub title: Option<String>,
    pub text: Option<String>,
    pub image_url: Option<String>,
}

impl Attachment {
    pub fn is_hero_card(&self) -> bool {
        self.content_type == HERO_CARD_CONTENT_TYPE
    }

    /// Returns the hero card view of this attachment, if it is one.
    pub fn hero_card(&self) -> Option<HeroCard> {
        if !self.is_hero_card() {
            return None;
        }
        let string_field = |name: &str| {
            self.content
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let image_url = self
            .content
            .get("images")
            .and_then(Value::as_array)
            .and_then(|images| images.first())
            .and_then(|image| image.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(HeroCard {
            title: string_field("title"),
            text: string_field("text"),
            image_url,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// One unit of bot output, already filtered to bot-authored replies.
pub struct Activity {
    pub reply_to_id: String,
    pub from_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub speech: Option<String>,
    #[serde(default)]
    pub input_hint: Option<InputHint>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub timestamp: DateTime<Utc>,
}

impl Activity {
    /// Builds a plain-text bot reply stamped with the current time.
    pub fn reply(
        reply_to_id: impl Into<String>,
        from_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            reply_to_id: reply_to_id.into(),
            from_id: from_id.into(),
            text: text.into(),
            speech: None,
            input_hint: None,
            attachments: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_speech(mut self, speech: impl Into<String>) -> Self {
        self.speech = Some(speech.into());
        self
    }

    pub fn with_input_hint(mut self, hint: InputHint) -> Self {
        self.input_hint = Some(hint);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// True when the bot is prompting the user, meaning its turn is complete.
    pub fn is_expecting_input(&self) -> bool {
        self.input_hint == Some(InputHint::ExpectingInput)
    }

    /// Spoken form of this part, falling back to its text.
    pub fn spoken(&self) -> &str {
        self.speech.as_deref().unwrap_or(&self.text)
    }

    /// First hero card carried by this activity.
    pub fn hero_card(&self) -> Option<HeroCard> {
        self.attachments.iter().find_map(Attachment::hero_card)
    }
}
