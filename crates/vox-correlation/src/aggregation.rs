//! Finalization of buffered bot activities into one composed reply.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use vox_core::{Activity, HeroCard, InputHint};

use crate::correlation_config::CorrelationConfig;

/// Separator appended after every finalized part.
pub const PART_DELIMITER: &str = ".  ";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Everything the reply composer needs to render one voice response.
pub struct ComposedReply {
    pub key: String,
    pub text: String,
    pub speech: String,
    /// True when at least one finalized part carried its own spoken form.
    pub speech_is_ssml: bool,
    pub input_hint: Option<InputHint>,
    pub card: Option<HeroCard>,
    pub should_end_session: bool,
    pub parts: usize,
}

/// Collapses `parts` into one reply.
///
/// Parts are deduplicated by `text`, keeping the first occurrence. The card
/// comes from the first part that carries a hero card, before deduplication,
/// and only when card translation is enabled.
pub fn finalize(parts: &[Activity], config: &CorrelationConfig) -> ComposedReply {
    let key = parts
        .first()
        .map(|part| part.reply_to_id.clone())
        .unwrap_or_default();
    let distinct = dedupe_by_text(parts);

    let mut text = String::new();
    let mut speech = String::new();
    for part in &distinct {
        text.push_str(&part.text);
        text.push_str(PART_DELIMITER);
        speech.push_str(part.spoken());
        speech.push_str(PART_DELIMITER);
    }

    let expecting_input = parts.iter().any(Activity::is_expecting_input);
    let input_hint = if expecting_input {
        Some(InputHint::ExpectingInput)
    } else {
        parts.iter().rev().find_map(|part| part.input_hint)
    };
    let card = if config.enable_card_translation {
        parts.iter().find_map(Activity::hero_card)
    } else {
        None
    };

    ComposedReply {
        key,
        speech_is_ssml: distinct.iter().any(|part| part.speech.is_some()),
        text,
        speech,
        input_hint,
        card,
        should_end_session: resolve_should_end_session(
            expecting_input,
            config.leave_session_open_default,
        ),
        parts: distinct.len(),
    }
}

/// First applicable rule wins: a prompting bot keeps the session open, then
/// the configured default, then close.
pub fn resolve_should_end_session(expecting_input: bool, leave_session_open_default: bool) -> bool {
    if expecting_input {
        return false;
    }
    if leave_session_open_default {
        return false;
    }
    true
}

fn dedupe_by_text(parts: &[Activity]) -> Vec<&Activity> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut distinct = Vec::with_capacity(parts.len());
    for part in parts {
        if seen.insert(part.text.as_str()) {
            distinct.push(part);
        }
    }
    distinct
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use vox_core::{Attachment, HERO_CARD_CONTENT_TYPE};

    use super::*;

    fn part(text: &str) -> Activity {
        Activity::reply("key-1", "bot", text)
    }

    fn hero(title: &str) -> Attachment {
        Attachment {
            content_type: HERO_CARD_CONTENT_TYPE.to_string(),
            content: json!({"title": title, "text": "body", "images": [{"url": "https://img/a.png"}]}),
        }
    }

    #[test]
    fn unit_finalize_dedupes_by_text_preserving_first_seen_order() {
        let parts = vec![part("A"), part("A"), part("B")];
        let reply = finalize(&parts, &CorrelationConfig::default());
        assert_eq!(reply.text, "A.  B.  ");
        assert_eq!(reply.speech, "A.  B.  ");
        assert_eq!(reply.parts, 2);
        assert_eq!(reply.key, "key-1");
    }

    #[test]
    fn unit_finalize_speech_falls_back_to_text_per_part() {
        let parts = vec![part("Hi").with_speech("<b>Hi</b>"), part("Bye")];
        let reply = finalize(&parts, &CorrelationConfig::default());
        assert_eq!(reply.text, "Hi.  Bye.  ");
        assert_eq!(reply.speech, "<b>Hi</b>.  Bye.  ");
        assert!(reply.speech_is_ssml);
    }

    #[test]
    fn unit_finalize_plain_parts_are_not_ssml() {
        let reply = finalize(&[part("Hi")], &CorrelationConfig::default());
        assert!(!reply.speech_is_ssml);
    }

    #[test]
    fn unit_should_end_session_tie_break_prefers_expecting_input() {
        assert!(!resolve_should_end_session(true, false));
        assert!(!resolve_should_end_session(true, true));
        assert!(!resolve_should_end_session(false, true));
        assert!(resolve_should_end_session(false, false));
    }

    #[test]
    fn functional_expecting_input_keeps_session_open_despite_close_default() {
        let config = CorrelationConfig {
            leave_session_open_default: false,
            ..CorrelationConfig::default()
        };
        let parts = vec![
            part("Which city?").with_input_hint(InputHint::ExpectingInput),
        ];
        let reply = finalize(&parts, &config);
        assert!(!reply.should_end_session);
        assert_eq!(reply.input_hint, Some(InputHint::ExpectingInput));
    }

    #[test]
    fn functional_leave_session_open_default_applies_without_prompt() {
        let config = CorrelationConfig {
            leave_session_open_default: true,
            ..CorrelationConfig::default()
        };
        let reply = finalize(&[part("Done")], &config);
        assert!(!reply.should_end_session);
        let closing = finalize(&[part("Done")], &CorrelationConfig::default());
        assert!(closing.should_end_session);
    }

    #[test]
    fn functional_card_translation_uses_first_hero_card_when_enabled() {
        let parts = vec![
            part("one"),
            part("two").with_attachment(hero("First")),
            part("three").with_attachment(hero("Second")),
        ];
        let disabled = finalize(&parts, &CorrelationConfig::default());
        assert!(disabled.card.is_none());

        let config = CorrelationConfig {
            enable_card_translation: true,
            ..CorrelationConfig::default()
        };
        let enabled = finalize(&parts, &config);
        let card = enabled.card.expect("card");
        assert_eq!(card.title.as_deref(), Some("First"));
        assert_eq!(card.image_url.as_deref(), Some("https://img/a.png"));
    }

    #[test]
    fn regression_duplicate_typing_parts_do_not_repeat_output() {
        let parts = vec![part(""), part(""), part("Result")];
        let reply = finalize(&parts, &CorrelationConfig::default());
        assert_eq!(reply.text, ".  Result.  ");
    }
}
