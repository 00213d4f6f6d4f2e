//! WebSocket transport for web front-ends.
//!
//! Every socket gets its own engine and session.

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use toplevel_core::{Engine, ShellConfig};

use crate::{
    handler::{ShellHandler, TransportError, run_shell},
    protocol::{ClientMessage, ServerMessage},
};

type EngineFactory<E> = Arc<dyn Fn() -> E + Send + Sync>;

/// WebSocket handler state.
pub struct WsState<E> {
    factory: EngineFactory<E>,
    config: Arc<ShellConfig>,
}

impl<E> Clone for WsState<E> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            config: Arc::clone(&self.config),
        }
    }
}

impl<E: Engine + 'static> WsState<E> {
    /// Create WebSocket state from an engine factory.
    #[must_use]
    pub fn new(factory: impl Fn() -> E + Send + Sync + 'static, config: ShellConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            config: Arc::new(config),
        }
    }
}

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler<E: Engine + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<WsState<E>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

fn parse_message(msg: Message) -> Option<Result<ClientMessage, TransportError>> {
    let text = match msg {
        Message::Text(text) => text.as_str().to_owned(),
        Message::Binary(data) => String::from_utf8(data.to_vec()).ok()?,
        _ => return None,
    };
    Some(serde_json::from_str(&text).map_err(TransportError::from))
}

async fn handle_socket<E: Engine + 'static>(socket: WebSocket, state: WsState<E>) {
    let (mut sender, mut receiver) = socket.split();
    let session_id = Uuid::new_v4().to_string();

    // Channel for sending messages to the client
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<ClientMessage>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let _ = out_tx.send(ServerMessage::SessionStarted {
        session_id: session_id.clone(),
    });
    tracing::info!(%session_id, "session started");

    let handler = ShellHandler::new((state.factory)(), ShellConfig::clone(&state.config));
    let shell_task = tokio::spawn(run_shell(handler, in_rx, out_tx.clone()));

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Close(_)) => break,
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        match parse_message(msg) {
            Some(Ok(client_msg)) => {
                if in_tx.send(client_msg).is_err() {
                    break;
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Invalid client message: {e}");
                let _ = out_tx.send(ServerMessage::Error {
                    message: e.to_string(),
                });
            }
            None => {}
        }
    }

    drop(in_tx);
    match shell_task.await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::error!(%session_id, "shell failed: {e}"),
        Err(e) => tracing::error!(%session_id, "shell task panicked: {e}"),
    }
    tracing::info!(%session_id, "session ended");
    send_task.abort();
}

/// Create WebSocket router.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_ws_router(WsState::new(DemoEngine::new, config)));
/// ```
#[must_use]
pub fn create_ws_router<E: Engine + 'static>(state: WsState<E>) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler::<E>))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message() {
        let msg = Message::Text(r#"{"type":"abort"}"#.into());
        assert!(matches!(parse_message(msg), Some(Ok(ClientMessage::Abort))));

        let msg = Message::Text("{".into());
        assert!(matches!(
            parse_message(msg),
            Some(Err(TransportError::InvalidMessage(_)))
        ));

        assert!(parse_message(Message::Ping(Vec::new().into())).is_none());
    }
}
