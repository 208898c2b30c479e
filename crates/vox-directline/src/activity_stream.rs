//! Activity stream: websocket pump from the bot conversation into the
//! correlation engine.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use vox_core::{Activity, Attachment, InputHint};
use vox_correlation::{CorrelationError, CorrelationHandle};

use crate::directline_client::{retry_delay, DirectLineClient};
use crate::directline_types::{ActivitySet, DirectLineActivity, DirectLineConversation};

const MESSAGE_ACTIVITY_TYPE: &str = "message";
const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Filters raw stream activities down to bot replies and maps them into the
/// correlation model.
pub struct ActivityStreamAdapter {
    bot_id: String,
}

impl ActivityStreamAdapter {
    pub fn new(bot_id: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into().trim().to_string(),
        }
    }

    /// Returns `None` for anything that is not a message authored by the bot
    /// in reply to a known activity.
    pub fn normalize(&self, raw: DirectLineActivity, received_at: DateTime<Utc>) -> Option<Activity> {
        if raw.activity_type != MESSAGE_ACTIVITY_TYPE || raw.from.id != self.bot_id {
            return None;
        }
        let reply_to_id = raw.reply_to_id.filter(|id| !id.trim().is_empty())?;
        let timestamp = raw
            .timestamp
            .as_deref()
            .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
            .map(|value| value.with_timezone(&Utc))
            .unwrap_or(received_at);
        Some(Activity {
            reply_to_id,
            from_id: raw.from.id,
            text: raw.text.unwrap_or_default(),
            speech: raw.speak.filter(|speak| !speak.trim().is_empty()),
            input_hint: raw.input_hint.as_deref().and_then(InputHint::parse),
            attachments: raw
                .attachments
                .into_iter()
                .map(|attachment| Attachment {
                    content_type: attachment.content_type,
                    content: attachment.content,
                })
                .collect(),
            timestamp,
        })
    }
}

/// Parses one websocket message. Keep-alive frames and control frames yield
/// `None`.
pub fn parse_stream_frame(message: WsMessage) -> Result<Option<ActivitySet>> {
    match message {
        WsMessage::Text(text) => parse_frame_text(text.as_str()),
        WsMessage::Binary(bytes) => {
            let text =
                String::from_utf8(bytes.to_vec()).context("invalid utf-8 activity stream payload")?;
            parse_frame_text(&text)
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) => Ok(None),
        WsMessage::Close(_) => Ok(None),
        WsMessage::Frame(_) => Ok(None),
    }
}

fn parse_frame_text(text: &str) -> Result<Option<ActivitySet>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let set = serde_json::from_str::<ActivitySet>(text)
        .context("failed to parse activity stream frame")?;
    Ok(Some(set))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Public struct `ActivityStreamConfig` used across vox-bridge components.
pub struct ActivityStreamConfig {
    pub reconnect_base_delay_ms: u64,
}

impl Default for ActivityStreamConfig {
    fn default() -> Self {
        Self {
            reconnect_base_delay_ms: DEFAULT_RECONNECT_BASE_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Disconnected,
}

/// Pumps the conversation's activity stream into `engine` until `shutdown`
/// flips to true or the engine stops. Dropped sockets are re-opened through
/// the reconnect endpoint, resuming from the last watermark.
pub async fn run_activity_stream(
    client: Arc<DirectLineClient>,
    conversation: DirectLineConversation,
    adapter: ActivityStreamAdapter,
    engine: CorrelationHandle,
    config: ActivityStreamConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let conversation_id = conversation.conversation_id.clone();
    let mut stream_url = conversation.stream_url;
    let mut watermark: Option<String> = None;
    let mut failure_streak = 0_usize;

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }
        if let Some(url) = stream_url.take() {
            match run_stream_session(&url, &adapter, &engine, &mut watermark, &mut shutdown).await {
                Ok(SessionEnd::Shutdown) => return Ok(()),
                Ok(SessionEnd::Disconnected) => {
                    tracing::info!(conversation_id = %conversation_id, "activity stream disconnected");
                    failure_streak = 0;
                }
                Err(error) => {
                    if matches!(
                        error.downcast_ref::<CorrelationError>(),
                        Some(CorrelationError::EngineStopped)
                    ) {
                        tracing::info!("activity stream stopping with correlation engine");
                        return Ok(());
                    }
                    failure_streak = failure_streak.saturating_add(1);
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        failure_streak,
                        error = %error,
                        "activity stream session failed"
                    );
                }
            }
        }

        let delay = retry_delay(config.reconnect_base_delay_ms, failure_streak.max(1), None);
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                continue;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        match client.reconnect(&conversation_id, watermark.as_deref()).await {
            Ok(refreshed) => {
                if refreshed.stream_url.is_none() {
                    failure_streak = failure_streak.saturating_add(1);
                    tracing::warn!(conversation_id = %conversation_id, "reconnect returned no stream url");
                }
                stream_url = refreshed.stream_url;
            }
            Err(error) => {
                failure_streak = failure_streak.saturating_add(1);
                tracing::warn!(
                    conversation_id = %conversation_id,
                    failure_streak,
                    error = %error,
                    "activity stream reconnect failed"
                );
            }
        }
    }
}

async fn run_stream_session(
    stream_url: &str,
    adapter: &ActivityStreamAdapter,
    engine: &CorrelationHandle,
    watermark: &mut Option<String>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd> {
    let (mut stream, _response) = connect_async(stream_url)
        .await
        .context("failed to connect activity stream websocket")?;
    tracing::info!("activity stream connected");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = stream.close(None).await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
            message = stream.next() => {
                let Some(message) = message else {
                    return Ok(SessionEnd::Disconnected);
                };
                let message = message.context("activity stream read failed")?;
                if matches!(message, WsMessage::Close(_)) {
                    return Ok(SessionEnd::Disconnected);
                }
                let set = match parse_stream_frame(message) {
                    Ok(Some(set)) => set,
                    Ok(None) => continue,
                    Err(error) => {
                        tracing::warn!(error = %error, "dropping malformed activity stream frame");
                        continue;
                    }
                };
                forward_activity_set(set, adapter, engine, watermark)?;
            }
        }
    }
}

fn forward_activity_set(
    set: ActivitySet,
    adapter: &ActivityStreamAdapter,
    engine: &CorrelationHandle,
    watermark: &mut Option<String>,
) -> Result<()> {
    let received_at = Utc::now();
    for raw in set.activities {
        if let Some(activity) = adapter.normalize(raw, received_at) {
            tracing::debug!(key = %activity.reply_to_id, "bot activity received");
            engine.on_activity(activity)?;
        }
    }
    if let Some(next) = set.watermark.filter(|value| !value.trim().is_empty()) {
        *watermark = Some(next);
    }
    Ok(())
}
