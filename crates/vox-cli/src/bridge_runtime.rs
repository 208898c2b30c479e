//! Wires the backend client, correlation engine, stream pump and HTTP server.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use vox_core::IdentityHasher;
use vox_correlation::{CorrelationEngine, TracingEventSink};
use vox_directline::{
    run_activity_stream, ActivityStreamAdapter, ActivityStreamConfig, DirectLineBackend,
    DirectLineClient,
};
use vox_gateway::{
    run_voice_bridge_server, BridgeController, DirectiveProgressNotifier, VoiceBridgeState,
};

use crate::bootstrap_helpers::wait_for_ctrl_c;
use crate::cli_args::Cli;

pub(crate) async fn run_bridge(cli: Cli) -> Result<()> {
    let client = Arc::new(
        DirectLineClient::new(cli.direct_line_config())
            .context("failed to build direct line client")?,
    );
    let conversation = client
        .start_conversation()
        .await
        .context("failed to start direct line conversation")?;
    tracing::info!(
        conversation_id = %conversation.conversation_id,
        domain = client.domain(),
        "direct line conversation started"
    );

    let engine = CorrelationEngine::spawn(cli.correlation_config(), Arc::new(TracingEventSink));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stream_task = tokio::spawn(run_activity_stream(
        Arc::clone(&client),
        conversation.clone(),
        ActivityStreamAdapter::new(&cli.bot_id),
        engine.clone(),
        ActivityStreamConfig::default(),
        shutdown_rx.clone(),
    ));

    let backend = Arc::new(DirectLineBackend::new(
        client,
        conversation.conversation_id.clone(),
    ));
    let mut controller = BridgeController::new(
        cli.bridge_config(),
        backend,
        engine.clone(),
        IdentityHasher::new(&cli.identity_hash_key),
    );
    if cli.progressive_response {
        controller = controller.with_progress_notifier(Arc::new(DirectiveProgressNotifier::new(
            &cli.progressive_response_phrase,
        )?));
    }
    let state = Arc::new(VoiceBridgeState::new(controller));

    tokio::spawn(wait_for_ctrl_c(shutdown_tx));
    let mut server_shutdown = shutdown_rx;
    let serve_result = run_voice_bridge_server(&cli.bind, state, async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    })
    .await;

    engine.shutdown().await;
    if serve_result.is_err() {
        stream_task.abort();
    } else {
        match stream_task.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::warn!(error = %error, "activity stream ended with error"),
            Err(error) => tracing::warn!(error = %error, "activity stream task failed"),
        }
    }
    serve_result
}
