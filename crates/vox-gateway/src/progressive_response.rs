//! Out-of-band progress notices pushed while the bot is still working.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::reply_composer::compose_progress_directive;
use crate::voice_request::VoiceRequestEnvelope;

const DIRECTIVES_PATH: &str = "/v1/directives";
const PROGRESS_REQUEST_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Where a progress notice for one accepted utterance is delivered.
pub struct ProgressTarget {
    pub api_endpoint: String,
    pub api_access_token: String,
    pub request_id: Option<String>,
}

impl ProgressTarget {
    /// Returns `None` when the request carries no endpoint or token.
    pub fn from_request(request: &VoiceRequestEnvelope) -> Option<Self> {
        Some(Self {
            api_endpoint: request.api_endpoint()?.trim_end_matches('/').to_string(),
            api_access_token: request.api_access_token()?.to_string(),
            request_id: request.request_id().map(str::to_string),
        })
    }
}

#[async_trait]
/// Trait contract for `ProgressNotifier` behavior.
pub trait ProgressNotifier: Send + Sync {
    async fn notify(&self, target: &ProgressTarget) -> Result<()>;
}

#[derive(Debug, Clone)]
/// Posts a speak directive to the platform's directives endpoint.
pub struct DirectiveProgressNotifier {
    http: reqwest::Client,
    phrase: String,
}

impl DirectiveProgressNotifier {
    pub fn new(phrase: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(PROGRESS_REQUEST_TIMEOUT_MS))
            .build()
            .context("failed to build progress directive http client")?;
        Ok(Self {
            http,
            phrase: phrase.into(),
        })
    }
}

#[async_trait]
impl ProgressNotifier for DirectiveProgressNotifier {
    async fn notify(&self, target: &ProgressTarget) -> Result<()> {
        let url = format!("{}{DIRECTIVES_PATH}", target.api_endpoint);
        let body = compose_progress_directive(target.request_id.as_deref(), &self.phrase);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&target.api_access_token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to post progress directive to {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("progress directive rejected with status {}", status.as_u16());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn request_with_system(system: serde_json::Value) -> VoiceRequestEnvelope {
        serde_json::from_value(json!({
            "context": {"System": system},
            "request": {"type": "IntentRequest", "requestId": "req-1"}
        }))
        .expect("envelope")
    }

    #[test]
    fn unit_progress_target_requires_endpoint_and_token() {
        let full = request_with_system(json!({
            "apiEndpoint": "https://api.example/",
            "apiAccessToken": "token"
        }));
        let target = ProgressTarget::from_request(&full).expect("target");
        assert_eq!(target.api_endpoint, "https://api.example");
        assert_eq!(target.request_id.as_deref(), Some("req-1"));

        let no_token = request_with_system(json!({"apiEndpoint": "https://api.example"}));
        assert!(ProgressTarget::from_request(&no_token).is_none());
    }

    #[tokio::test]
    async fn functional_directive_notifier_posts_speak_directive_with_bearer_token() {
        let server = MockServer::start();
        let directive = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/directives")
                .header("authorization", "Bearer api-token")
                .json_body(json!({
                    "header": {"requestId": "req-1"},
                    "directive": {"type": "VoicePlayer.Speak", "speech": "Hang on"}
                }));
            then.status(204);
        });
        let notifier = DirectiveProgressNotifier::new("Hang on").expect("notifier");
        notifier
            .notify(&ProgressTarget {
                api_endpoint: server.base_url(),
                api_access_token: "api-token".to_string(),
                request_id: Some("req-1".to_string()),
            })
            .await
            .expect("notify");
        directive.assert();
    }

    #[tokio::test]
    async fn regression_rejected_directive_is_reported_as_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/directives");
            then.status(403);
        });
        let notifier = DirectiveProgressNotifier::new("Hang on").expect("notifier");
        let error = notifier
            .notify(&ProgressTarget {
                api_endpoint: server.base_url(),
                api_access_token: "bad".to_string(),
                request_id: None,
            })
            .await
            .expect_err("should fail");
        assert!(error.to_string().contains("403"));
    }
}
