//! Voice bridge server bootstrap and router wiring.

use super::*;

pub fn build_voice_bridge_router(state: Arc<VoiceBridgeState>) -> Router {
    Router::new()
        .route(MESSAGES_ENDPOINT, post(handle_messages))
        .route(STATUS_ENDPOINT, get(handle_status))
        .with_state(state)
}

/// Serves the bridge on `bind` until `shutdown` resolves.
pub async fn run_voice_bridge_server<F>(
    bind: &str,
    state: Arc<VoiceBridgeState>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_addr = bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --bind '{bind}'"))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind voice bridge server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound voice bridge address")?;
    tracing::info!(
        endpoint = MESSAGES_ENDPOINT,
        addr = %local_addr,
        aggregation_mode = state.controller.engine().mode().as_str(),
        "voice bridge listening"
    );

    let app = build_voice_bridge_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("voice bridge server exited unexpectedly")?;
    tracing::info!("voice bridge server stopped");
    Ok(())
}
