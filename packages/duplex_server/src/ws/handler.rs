//! Room socket endpoint: upgrade, then relay.
//!
//! Inbound frames are `{body, attachment?}`; each one is validated,
//! persisted, stamped with id/sender/timestamp, and broadcast to every
//! subscriber of the room. Outbound frames are full `Message` objects, so
//! the sender sees its own message come back as the echo.

use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message as WsFrame, WebSocket},
    },
    response::{IntoResponse, Response},
};
use chrono::Utc;
use duplex_core::{Message, OutboundFrame};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

pub async fn room_socket(
    Path(room_id): Path<Uuid>,
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    if state.repository.get_room(room_id).await?.is_none() {
        return Err(ApiError::NotFound("room not found".into()));
    }
    if !state.repository.is_participant(room_id, session.id).await? {
        return Err(ApiError::Forbidden(
            "you are not a participant of this room".into(),
        ));
    }

    Ok(ws
        .on_upgrade(move |socket| handle_room_socket(socket, room_id, session.id, state))
        .into_response())
}

async fn handle_room_socket(socket: WebSocket, room_id: Uuid, user_id: Uuid, state: AppState) {
    info!(%room_id, %user_id, "room socket connected");

    let mut room_rx = state.channels.subscribe(room_id).await;
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending frames to the WebSocket
    let (tx, mut rx) = mpsc::channel::<Message>(64);

    // Forward room broadcasts to this socket
    let tx_room = tx.clone();
    let room_task = async move {
        loop {
            match room_rx.recv().await {
                Ok(message) => {
                    if tx_room.send(message).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(%room_id, "room broadcast lagged by {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    // Serialize and write frames out
    let sender_task = async move {
        while let Some(message) = rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(WsFrame::Text(json.into())).await.is_err() {
                break;
            }
        }
    };

    // Parse, persist, and fan out inbound frames
    let repository = state.repository.clone();
    let channels = state.channels.clone();
    let input_task = async move {
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(WsFrame::Text(text)) => {
                    let outbound = match serde_json::from_str::<OutboundFrame>(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(%room_id, "dropping unparseable frame: {}", e);
                            continue;
                        }
                    };
                    if outbound.body.trim().is_empty() {
                        warn!(%room_id, "dropping empty message body");
                        continue;
                    }

                    let message = Message {
                        id: Uuid::new_v4(),
                        room_id,
                        sender_id: user_id,
                        body: outbound.body,
                        attachment: outbound.attachment,
                        created_at: Utc::now(),
                    };

                    if let Err(e) = repository.insert_message(&message).await {
                        error!(%room_id, "failed to persist message: {e:#}");
                        continue;
                    }

                    let reached = channels.publish(room_id, message).await;
                    debug!(%room_id, "message fanned out to {} sockets", reached);
                }
                Ok(WsFrame::Close(_)) => {
                    debug!(%room_id, %user_id, "client closed room socket");
                    break;
                }
                Err(e) => {
                    debug!(%room_id, %user_id, "room socket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = room_task => debug!("room broadcast task ended"),
        _ = sender_task => debug!("sender task ended"),
        _ = input_task => debug!("input task ended"),
    }

    state.channels.prune(room_id).await;
    info!(%room_id, %user_id, "room socket closed");
}
