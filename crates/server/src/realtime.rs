use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use outpass_core::realtime::admit;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::state::AppState;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_connection(socket, state))
}

/// Join handshake, then push deliveries until either side goes away.
async fn serve_connection(mut socket: WebSocket, state: AppState) {
    let raw = match tokio::time::timeout(state.join_timeout, first_text_frame(&mut socket)).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!(event_name = "realtime.join.abandoned", "connection closed before join");
            return;
        }
        Err(_) => {
            warn!(event_name = "realtime.join.timeout", "no join frame before timeout");
            close(&mut socket, "join_timeout").await;
            return;
        }
    };

    let admission = match admit(state.identity.as_ref(), &raw).await {
        Ok(admission) => admission,
        Err(rejection) => {
            warn!(
                event_name = "realtime.join.rejected",
                reason = rejection.reason(),
                error = %rejection,
                "realtime join rejected"
            );
            close(&mut socket, rejection.reason()).await;
            return;
        }
    };

    let rooms: Vec<String> = admission.rooms.iter().map(ToString::to_string).collect();
    let mut subscription = state.notifier.bus().subscribe(admission.rooms);
    let joined = json!({ "event": "joined", "data": { "rooms": rooms } });
    if socket.send(Message::Text(joined.to_string().into())).await.is_err() {
        return;
    }
    info!(
        event_name = "realtime.join.accepted",
        connection_id = subscription.id(),
        principal_id = %admission.principal.id,
        role = %admission.principal.role,
        rooms = ?rooms,
        "realtime connection joined"
    );

    loop {
        tokio::select! {
            delivery = subscription.recv() => {
                let Some(envelope) = delivery else { break };
                let text = match serde_json::to_string(envelope.as_ref()) {
                    Ok(text) => text,
                    Err(error) => {
                        warn!(event_name = "realtime.deliver.encode_failed", error = %error, "event not encodable");
                        continue;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!(
        event_name = "realtime.connection.closed",
        connection_id = subscription.id(),
        "realtime connection closed"
    );
}

async fn first_text_frame(socket: &mut WebSocket) -> Option<String> {
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => return Some(text.as_str().to_owned()),
            Message::Binary(bytes) => return Some(String::from_utf8_lossy(&bytes).into_owned()),
            Message::Close(_) => return None,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
    None
}

async fn close(socket: &mut WebSocket, reason: &'static str) {
    let frame = CloseFrame { code: close_code::POLICY, reason: Utf8Bytes::from_static(reason) };
    let _ = socket.send(Message::Close(Some(frame))).await;
}
