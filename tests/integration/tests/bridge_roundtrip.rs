use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use httpmock::prelude::*;
use serde_json::{json, Value};
use tokio::{
    net::TcpListener,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use vox_core::IdentityHasher;
use vox_correlation::{
    CorrelationConfig, CorrelationEngine, CorrelationEvent, CorrelationHandle, MemoryEventSink,
    MissedReason,
};
use vox_directline::{
    run_activity_stream, ActivityStreamAdapter, ActivityStreamConfig, DirectLineBackend,
    DirectLineClient, DirectLineClientConfig,
};
use vox_gateway::{build_voice_bridge_router, BridgeController, VoiceBridgeConfig, VoiceBridgeState};

const BOT_ID: &str = "weather-bot";
const REPLY_KEY: &str = "conv-1|0000001";

/// Fake activity stream: pushes whatever frames the test hands it.
async fn spawn_stream_server() -> (SocketAddr, mpsc::UnboundedSender<Value>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stream");
    let addr = listener.local_addr().expect("stream addr");
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<Value>();
    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept stream");
        let mut socket = tokio_tungstenite::accept_async(tcp)
            .await
            .expect("stream handshake");
        loop {
            tokio::select! {
                frame = frames_rx.recv() => {
                    let Some(frame) = frame else { break };
                    socket
                        .send(WsMessage::Text(frame.to_string().into()))
                        .await
                        .expect("send frame");
                }
                incoming = socket.next() => {
                    match incoming {
                        Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    });
    (addr, frames_tx, handle)
}

struct LiveBridge {
    addr: SocketAddr,
    http: reqwest::Client,
    engine: CorrelationHandle,
    sink: Arc<MemoryEventSink>,
    frames: mpsc::UnboundedSender<Value>,
    shutdown: watch::Sender<bool>,
    pump: JoinHandle<Result<(), String>>,
    server: JoinHandle<()>,
    _direct_line: MockServer,
}

impl LiveBridge {
    async fn start(correlation: CorrelationConfig) -> Self {
        let (stream_addr, frames, _stream_server) = spawn_stream_server().await;
        let direct_line = MockServer::start();
        direct_line.mock(|when, then| {
            when.method(POST)
                .path("/v3/directline/conversations")
                .header("authorization", "Bearer dl-secret");
            then.status(201).json_body(json!({
                "conversationId": "conv-1",
                "streamUrl": format!("ws://{stream_addr}")
            }));
        });
        direct_line.mock(|when, then| {
            when.method(POST)
                .path("/v3/directline/conversations/conv-1/activities")
                .header("authorization", "Bearer dl-secret");
            then.status(200).json_body(json!({"id": REPLY_KEY}));
        });

        let client = Arc::new(
            DirectLineClient::new(DirectLineClientConfig::new(
                format!("{}/v3/directline", direct_line.base_url()),
                "dl-secret",
            ))
            .expect("direct line client"),
        );
        let conversation = client.start_conversation().await.expect("conversation");

        let sink = Arc::new(MemoryEventSink::default());
        let engine = CorrelationEngine::spawn(correlation, sink.clone());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let pump_client = Arc::clone(&client);
        let pump_conversation = conversation.clone();
        let pump_engine = engine.clone();
        let pump = tokio::spawn(async move {
            run_activity_stream(
                pump_client,
                pump_conversation,
                ActivityStreamAdapter::new(BOT_ID),
                pump_engine,
                ActivityStreamConfig::default(),
                shutdown_rx,
            )
            .await
            .map_err(|error| error.to_string())
        });

        let controller = BridgeController::new(
            VoiceBridgeConfig {
                response_deadline: Duration::from_secs(3),
                ..VoiceBridgeConfig::default()
            },
            Arc::new(DirectLineBackend::new(client, conversation.conversation_id)),
            engine.clone(),
            IdentityHasher::default(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind bridge");
        let addr = listener.local_addr().expect("bridge addr");
        let app = build_voice_bridge_router(Arc::new(VoiceBridgeState::new(controller)));
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            addr,
            http: reqwest::Client::new(),
            engine,
            sink,
            frames,
            shutdown,
            pump,
            server,
            _direct_line: direct_line,
        }
    }

    fn push_frame(&self, activities: Value, watermark: &str) {
        self.frames
            .send(json!({"activities": activities, "watermark": watermark}))
            .expect("push frame");
    }

    async fn ask(&self, phrase: &str) -> (u16, Value) {
        let response = self
            .http
            .post(format!("http://{}/messages", self.addr))
            .json(&json!({
                "version": "1.0",
                "session": {"sessionId": "s-1", "user": {"userId": "amzn1.ask.account.raw"}},
                "context": {"System": {"device": {"deviceId": "d-1"}}},
                "request": {
                    "type": "IntentRequest",
                    "requestId": "req-1",
                    "intent": {"name": "Ask", "slots": {"phrase": {"name": "phrase", "value": phrase}}}
                }
            }))
            .send()
            .await
            .expect("send voice request");
        let status = response.status().as_u16();
        (status, response.json::<Value>().await.expect("voice response"))
    }

    async fn wait_for_buffered(&self, expected: usize) {
        for _ in 0..200 {
            let snapshot = self.engine.snapshot().await.expect("snapshot");
            if snapshot.buffered_keys == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("engine never buffered {expected} keys");
    }

    async fn stop(self) {
        self.shutdown.send(true).expect("signal shutdown");
        let pumped = self.pump.await.expect("pump join");
        assert_eq!(pumped, Ok(()));
        self.engine.shutdown().await;
        self.server.abort();
    }
}

fn bot_reply(text: &str) -> Value {
    json!({
        "type": "message",
        "id": "conv-1|0000002",
        "from": {"id": BOT_ID},
        "replyToId": REPLY_KEY,
        "text": text,
        "timestamp": "2026-03-01T10:00:00Z"
    })
}

#[tokio::test]
async fn integration_bot_reply_streamed_after_request_reaches_voice_response() {
    let bridge = LiveBridge::start(CorrelationConfig::default()).await;

    let pending = {
        let http = bridge.http.clone();
        let url = format!("http://{}/messages", bridge.addr);
        tokio::spawn(async move {
            http.post(url)
                .json(&json!({
                    "session": {"sessionId": "s-1", "user": {"userId": "raw"}},
                    "request": {
                        "type": "IntentRequest",
                        "requestId": "req-1",
                        "intent": {"name": "Ask", "slots": {"phrase": {"value": "weather"}}}
                    }
                }))
                .send()
                .await
                .expect("send")
                .json::<Value>()
                .await
                .expect("json")
        })
    };
    for _ in 0..200 {
        if bridge.engine.snapshot().await.expect("snapshot").pending_requests == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bridge.push_frame(
        json!([
            {"type": "message", "from": {"id": "hashed-user"}, "id": REPLY_KEY, "text": "weather"},
            bot_reply("Sunny in Oslo")
        ]),
        "2",
    );

    let body = pending.await.expect("join");
    assert_eq!(body["response"]["outputSpeech"]["text"], "Sunny in Oslo.  ");
    assert_eq!(body["response"]["shouldEndSession"], true);
    assert!(bridge.sink.missed().is_empty());
    bridge.stop().await;
}

#[tokio::test]
async fn integration_multi_part_reply_streamed_before_registration_is_aggregated() {
    let bridge = LiveBridge::start(CorrelationConfig::default()).await;
    bridge.push_frame(
        json!([bot_reply("A"), bot_reply("A"), bot_reply("B")]),
        "3",
    );
    bridge.wait_for_buffered(1).await;

    let (status, body) = bridge.ask("letters").await;
    assert_eq!(status, 200);
    assert_eq!(body["response"]["outputSpeech"]["text"], "A.  B.  ");

    let snapshot = bridge.engine.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.buffered_keys, 0);
    assert_eq!(snapshot.armed_deadlines, 0);
    assert_eq!(snapshot.dispatched_total, 1);
    bridge.stop().await;
}

#[tokio::test]
async fn regression_unclaimed_stream_reply_expires_as_missed_message() {
    let bridge = LiveBridge::start(CorrelationConfig {
        aggregation_timeout: Duration::from_millis(100),
        ..CorrelationConfig::default()
    })
    .await;
    bridge.push_frame(json!([bot_reply("nobody asked")]), "1");
    for _ in 0..200 {
        if !bridge.sink.missed().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bridge.wait_for_buffered(0).await;

    let missed = bridge.sink.missed();
    assert_eq!(missed.len(), 1);
    assert!(matches!(
        &missed[0],
        CorrelationEvent::Missed { reason: MissedReason::WindowExpired, texts, .. }
            if texts == &vec!["nobody asked".to_string()]
    ));
    bridge.stop().await;
}
