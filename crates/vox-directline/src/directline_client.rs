//! Direct Line REST client and the bot backend capability it implements.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::directline_types::{DirectLineConversation, OutboundActivity, ResourceResponse};

pub const DEFAULT_DIRECT_LINE_DOMAIN: &str = "https://directline.botframework.com/v3/directline";
const RETRY_ATTEMPT_HEADER: &str = "x-vox-retry-attempt";
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Error)]
/// Enumerates supported `BotBackendError` values.
pub enum BotBackendError {
    #[error("bot backend transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("bot backend returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("bot backend returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("bot backend still failing after {attempts} attempts")]
    Retry { attempts: usize },
}

#[async_trait]
/// Trait contract for `BotBackend` behavior.
pub trait BotBackend: Send + Sync {
    /// Submits one activity and returns the backend-assigned id that bot
    /// replies will carry as `replyToId`.
    async fn post_activity(&self, activity: &OutboundActivity) -> Result<String, BotBackendError>;
}

#[derive(Debug, Clone)]
/// Public struct `DirectLineClientConfig` used across vox-bridge components.
pub struct DirectLineClientConfig {
    pub domain: String,
    pub secret: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl DirectLineClientConfig {
    pub fn new(domain: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            secret: secret.into(),
            request_timeout_ms: 5_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 200,
        }
    }
}

#[derive(Clone)]
/// Public struct `DirectLineClient` used across vox-bridge components.
pub struct DirectLineClient {
    http: reqwest::Client,
    domain: String,
    secret: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl std::fmt::Debug for DirectLineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectLineClient")
            .field("domain", &self.domain)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl DirectLineClient {
    pub fn new(config: DirectLineClientConfig) -> Result<Self, BotBackendError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("vox-bridge"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            http,
            domain: config.domain.trim_end_matches('/').to_string(),
            secret: config.secret.trim().to_string(),
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub async fn start_conversation(&self) -> Result<DirectLineConversation, BotBackendError> {
        let conversation: DirectLineConversation = self
            .request_json("start conversation", RetryPolicy::Idempotent, || {
                self.http
                    .post(format!("{}/conversations", self.domain))
                    .bearer_auth(&self.secret)
            })
            .await?;
        if conversation.conversation_id.trim().is_empty() {
            return Err(BotBackendError::InvalidResponse(
                "conversation id missing from start response".to_string(),
            ));
        }
        Ok(conversation)
    }

    /// Requests a fresh stream URL for an existing conversation, resuming
    /// after `watermark` when one is known.
    pub async fn reconnect(
        &self,
        conversation_id: &str,
        watermark: Option<&str>,
    ) -> Result<DirectLineConversation, BotBackendError> {
        let mut url = format!("{}/conversations/{conversation_id}", self.domain);
        if let Some(watermark) = watermark.filter(|value| !value.trim().is_empty()) {
            url.push_str("?watermark=");
            url.push_str(watermark.trim());
        }
        self.request_json("reconnect", RetryPolicy::Idempotent, || {
            self.http.get(&url).bearer_auth(&self.secret)
        })
        .await
    }

    /// Posts one activity. A timed-out post may already have been delivered,
    /// so it is never resent.
    pub async fn post_to_conversation(
        &self,
        conversation_id: &str,
        activity: &OutboundActivity,
    ) -> Result<String, BotBackendError> {
        let url = format!("{}/conversations/{conversation_id}/activities", self.domain);
        let response: ResourceResponse = self
            .request_json("post activity", RetryPolicy::NonIdempotent, || {
                self.http
                    .post(&url)
                    .bearer_auth(&self.secret)
                    .json(activity)
            })
            .await?;
        response
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                BotBackendError::InvalidResponse("activity id missing from post response".to_string())
            })
    }

    async fn request_json<T, F>(
        &self,
        operation: &str,
        policy: RetryPolicy,
        mut builder: F,
    ) -> Result<T, BotBackendError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder()
                .header(RETRY_ATTEMPT_HEADER, attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .map_err(|error| BotBackendError::InvalidResponse(error.to_string()));
                    }
                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if policy.retries_status(status.as_u16()) {
                        if attempt < self.retry_max_attempts {
                            tracing::debug!(
                                operation,
                                attempt,
                                status = status.as_u16(),
                                "direct line request retrying"
                            );
                            tokio::time::sleep(retry_delay(
                                self.retry_base_delay_ms,
                                attempt,
                                retry_after,
                            ))
                            .await;
                            continue;
                        }
                        return Err(BotBackendError::Retry { attempts: attempt });
                    }
                    return Err(BotBackendError::HttpStatus {
                        status: status.as_u16(),
                        body: truncate_for_error(&body, MAX_ERROR_BODY_CHARS),
                    });
                }
                Err(error) => {
                    if policy.retries_transport(&error) && attempt < self.retry_max_attempts {
                        tracing::debug!(operation, attempt, error = %error, "direct line transport retrying");
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(BotBackendError::Transport(error));
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
/// Bot backend bound to one Direct Line conversation.
pub struct DirectLineBackend {
    client: Arc<DirectLineClient>,
    conversation_id: String,
}

impl DirectLineBackend {
    pub fn new(client: Arc<DirectLineClient>, conversation_id: impl Into<String>) -> Self {
        Self {
            client,
            conversation_id: conversation_id.into(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

#[async_trait]
impl BotBackend for DirectLineBackend {
    async fn post_activity(&self, activity: &OutboundActivity) -> Result<String, BotBackendError> {
        self.client
            .post_to_conversation(&self.conversation_id, activity)
            .await
    }
}

pub(crate) fn retry_delay(
    base_delay_ms: u64,
    attempt: usize,
    retry_after_seconds: Option<u64>,
) -> Duration {
    if let Some(retry_after_seconds) = retry_after_seconds {
        return Duration::from_secs(retry_after_seconds);
    }
    let exponent = attempt.saturating_sub(1).min(6) as u32;
    let scale = 2_u64.pow(exponent);
    Duration::from_millis(base_delay_ms.max(1).saturating_mul(scale))
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryPolicy {
    /// Resending cannot duplicate work.
    Idempotent,
    /// Resent only when the server cannot have processed the request.
    NonIdempotent,
}

impl RetryPolicy {
    fn retries_status(self, status: u16) -> bool {
        match self {
            Self::Idempotent => status == 429 || (500..600).contains(&status),
            Self::NonIdempotent => status == 429 || status == 503,
        }
    }

    fn retries_transport(self, error: &reqwest::Error) -> bool {
        match self {
            Self::Idempotent => error.is_timeout() || error.is_connect(),
            Self::NonIdempotent => error.is_connect(),
        }
    }
}

fn truncate_for_error(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
