//! WebSocket handler for the operator push channel (§4.J).
//!
//! On connect, replays the `state` and `rooms_control` snapshots, then
//! forwards every subsequent broadcaster message until the client
//! disconnects or the server force-closes during shutdown.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;

use crate::api::AppState;
use crate::events::BroadcastEvent;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let guard = state.ws_manager.register();
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.event_bridge.subscribe();

    if send_event(
        &mut sender,
        &BroadcastEvent::State {
            devices: state.state.get_all_device_status(),
        },
    )
    .await
    .is_err()
    {
        return;
    }
    if send_event(
        &mut sender,
        &BroadcastEvent::RoomsControl {
            rooms: state.state.get_all_room_control_status(),
        },
    )
    .await
    .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            _ = guard.cancel_token().cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Inbound commands mirror the POST endpoints; this channel is
                        // push-only for now, unrecognized frames are ignored.
                    }
                    Some(Err(e)) => {
                        log::warn!("[ws] receive error on {}: {e}", guard.id());
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if send_event(&mut sender, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("[ws] {} lagged, skipped {skipped} broadcast(s)", guard.id());
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    log::debug!("[ws] connection {} closed", guard.id());
}

async fn send_event(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    event: &BroadcastEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).unwrap_or_default();
    sender.send(Message::Text(text.into())).await
}
