//! Per-request orchestration: route, hash, submit, register, wait.

use chrono::{SecondsFormat, Utc};

use super::*;

const MESSAGE_ACTIVITY_TYPE: &str = "message";

/// Drives one voice request from routing to its composed response.
pub struct BridgeController {
    config: VoiceBridgeConfig,
    backend: Arc<dyn BotBackend>,
    engine: CorrelationHandle,
    hasher: IdentityHasher,
    progress: Option<Arc<dyn ProgressNotifier>>,
}

impl BridgeController {
    pub fn new(
        config: VoiceBridgeConfig,
        backend: Arc<dyn BotBackend>,
        engine: CorrelationHandle,
        hasher: IdentityHasher,
    ) -> Self {
        Self {
            config,
            backend,
            engine,
            hasher,
            progress: None,
        }
    }

    /// Enables the progress notice fired once per accepted utterance.
    pub fn with_progress_notifier(mut self, notifier: Arc<dyn ProgressNotifier>) -> Self {
        self.progress = Some(notifier);
        self
    }

    pub fn engine(&self) -> &CorrelationHandle {
        &self.engine
    }

    pub async fn handle(&self, request: VoiceRequestEnvelope) -> Result<VoiceResponse, BridgeError> {
        match request.route()? {
            VoiceRoute::SessionEnded => {
                tracing::info!(request_id = ?request.request_id(), "closing voice session");
                Ok(compose_session_end_response())
            }
            VoiceRoute::Utterance(utterance) => self.handle_utterance(&request, utterance).await,
        }
    }

    pub async fn status(&self) -> Result<VoiceBridgeStatus, CorrelationError> {
        let snapshot = self.engine.snapshot().await?;
        Ok(VoiceBridgeStatus {
            aggregation_mode: snapshot.aggregation_mode,
            pending_requests: snapshot.pending_requests,
            buffered_keys: snapshot.buffered_keys,
            dispatched_total: snapshot.dispatched_total,
            missed_total: snapshot.missed_total,
        })
    }

    /// Builds the activity submitted to the bot. The raw platform user id is
    /// replaced by its keyed hash.
    pub fn build_outbound_activity(
        &self,
        request: &VoiceRequestEnvelope,
        utterance: String,
    ) -> Result<OutboundActivity, BridgeError> {
        let raw_user_id = request.user_id().ok_or_else(|| {
            BridgeError::InvalidRequest("request carries no session user id".to_string())
        })?;
        let hashed_user_id = self
            .hasher
            .hash(raw_user_id)
            .map_err(|error| BridgeError::InvalidRequest(error.to_string()))?;
        Ok(OutboundActivity {
            activity_type: MESSAGE_ACTIVITY_TYPE.to_string(),
            text: utterance,
            channel_data: request.channel_data(&hashed_user_id),
            from: vox_directline::ChannelAccount {
                id: hashed_user_id,
                name: None,
            },
            locale: self.config.locale.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    /// Submission and reply wait share one deadline measured from arrival.
    async fn handle_utterance(
        &self,
        request: &VoiceRequestEnvelope,
        utterance: String,
    ) -> Result<VoiceResponse, BridgeError> {
        let started = Instant::now();
        let deadline = started + self.config.response_deadline;
        tracing::info!(utterance = %utterance, "voice utterance received");
        let activity = self.build_outbound_activity(request, utterance)?;

        let key = match tokio::time::timeout_at(deadline, self.backend.post_activity(&activity)).await
        {
            Ok(Ok(key)) => key,
            Ok(Err(error)) => {
                tracing::warn!(error = %error, "failed to submit utterance to bot");
                return Err(BridgeError::SubmissionFailed(error));
            }
            Err(_) => {
                let waited_ms = elapsed_ms(started);
                tracing::warn!(waited_ms, "bot did not accept utterance before response deadline");
                return Err(BridgeError::ReplyTimedOut { waited_ms });
            }
        };
        tracing::info!(
            key = %key,
            connector_response_ms = elapsed_ms(started),
            "utterance accepted by bot"
        );

        let (responder, receiver) = reply_channel();
        let mut guard = PendingRequestGuard::new(self.engine.clone(), key.clone(), receiver.ticket());
        self.engine.register_pending_request(key.clone(), responder)?;
        self.spawn_progress_notice(request);
        tracing::debug!(
            key = %key,
            intent_handling_ms = elapsed_ms(started),
            "pending request registered"
        );

        match receiver.wait_until(deadline).await {
            Ok(reply) => {
                guard.disarm();
                Ok(compose_voice_response(&reply, &self.config.reprompt_phrase))
            }
            Err(ReplyWaitError::TimedOut { .. }) => {
                let waited_ms = elapsed_ms(started);
                tracing::warn!(key = %key, waited_ms, "no bot reply before response deadline");
                Err(BridgeError::ReplyTimedOut { waited_ms })
            }
            Err(ReplyWaitError::ResponderDropped) => {
                guard.disarm();
                Err(BridgeError::Correlation(CorrelationError::EngineStopped))
            }
        }
    }

    fn spawn_progress_notice(&self, request: &VoiceRequestEnvelope) {
        let Some(notifier) = self.progress.clone() else {
            return;
        };
        let Some(target) = ProgressTarget::from_request(request) else {
            tracing::debug!("progress notice skipped: request has no api endpoint or token");
            return;
        };
        tokio::spawn(async move {
            if let Err(error) = notifier.notify(&target).await {
                tracing::warn!(error = %error, "progress notice failed");
            }
        });
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Abandons the registered request when the handler gives up on it, either by
/// hitting the response deadline or by being dropped on client disconnect.
pub(super) struct PendingRequestGuard {
    engine: CorrelationHandle,
    key: String,
    ticket: u64,
    armed: bool,
}

impl PendingRequestGuard {
    pub(super) fn new(engine: CorrelationHandle, key: String, ticket: u64) -> Self {
        Self {
            engine,
            key,
            ticket,
            armed: true,
        }
    }

    pub(super) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingRequestGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(error) = self.engine.abandon(std::mem::take(&mut self.key), self.ticket) {
            tracing::debug!(error = %error, "pending request abandon skipped");
        }
    }
}
