//! The per-room socket: exactly one live connection for the room being
//! viewed.
//!
//! State machine: `Idle -> Connecting -> Open -> (Closing) -> Closed`, with
//! any state collapsing to `Closed` on transport error. `send` is gated on
//! `Open` and otherwise a logged no-op, so callers can fire without first
//! checking for a live connection. `close` is idempotent.
//!
//! Inbound frames (each a JSON-encoded `Message`) are queued into a channel
//! and handed to exactly one subscriber; frames received before the
//! subscriber starts draining are buffered, not dropped.

use duplex_core::{Credential, Message, OutboundFrame, protocol};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ClientError;

/// Room for frames to pile up while history seeding is still in flight.
const INBOUND_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, tungstenite::Message>;

pub struct RoomSocket {
    room_id: Uuid,
    url: String,
    state: watch::Sender<ConnectionState>,
    sink: Option<WsSink>,
    inbound: Option<mpsc::Receiver<Message>>,
    reader: Option<JoinHandle<()>>,
}

impl RoomSocket {
    /// Create the socket in `Idle`; no network happens until `connect`.
    pub fn new(ws_base_url: &str, room_id: Uuid, credential: &Credential) -> Self {
        let url = format!("{ws_base_url}/rooms/{room_id}?token={credential}");
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            room_id,
            url,
            state,
            sink: None,
            inbound: None,
            reader: None,
        }
    }

    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions (e.g. to disable the send affordance).
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Open the connection. Only meaningful from `Idle`; calling in any
    /// other state is a logged no-op.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Idle {
            debug!(state = ?self.state(), "connect ignored: socket already used");
            return Ok(());
        }
        self.state.send_replace(ConnectionState::Connecting);

        let (stream, _) = match connect_async(&self.url).await {
            Ok(ok) => ok,
            Err(err) => {
                self.state.send_replace(ConnectionState::Closed);
                return Err(ClientError::Transport(err.to_string()));
            }
        };

        let (sink, mut read) = stream.split();
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        let state = self.state.clone();
        let room_id = self.room_id;

        // Open before the reader starts: an immediate server-side close must
        // land as Open -> Closed, not get clobbered back to Open.
        self.state.send_replace(ConnectionState::Open);

        let reader = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(tungstenite::Message::Text(text)) => {
                        match protocol::decode_inbound(&text) {
                            Ok(message) => {
                                // Queue for the subscriber; block rather than drop
                                if tx.send(message).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                warn!(%room_id, "dropping unparseable inbound frame: {err}");
                            }
                        }
                    }
                    Ok(tungstenite::Message::Close(_)) => {
                        debug!(%room_id, "room socket closed by server");
                        break;
                    }
                    Err(err) => {
                        debug!(%room_id, "room socket transport error: {err}");
                        break;
                    }
                    _ => {}
                }
            }
            state.send_replace(ConnectionState::Closed);
        });

        self.sink = Some(sink);
        self.inbound = Some(rx);
        self.reader = Some(reader);
        Ok(())
    }

    /// Take the inbound message stream. There is exactly one handler per
    /// socket: the second call returns `None`.
    pub fn subscribe(&mut self) -> Option<mpsc::Receiver<Message>> {
        self.inbound.take()
    }

    /// Transmit a payload. Valid only while `Open`: in any other state this
    /// logs and returns without error and without transmitting, so callers
    /// never trip over a closed connection.
    pub async fn send(&mut self, frame: &OutboundFrame) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Open {
            debug!(state = ?self.state(), "send ignored: socket not open");
            return Ok(());
        }
        let Some(sink) = self.sink.as_mut() else {
            debug!("send ignored: no live sink");
            return Ok(());
        };

        let json = serde_json::to_string(frame)
            .map_err(|err| ClientError::Validation(format!("unencodable payload: {err}")))?;

        if let Err(err) = sink.send(tungstenite::Message::Text(json.into())).await {
            self.state.send_replace(ConnectionState::Closed);
            return Err(ClientError::Transport(err.to_string()));
        }
        Ok(())
    }

    /// Close the connection. Safe to call in any state, any number of
    /// times; an already-closed socket is left alone.
    pub async fn close(&mut self) {
        match self.state() {
            ConnectionState::Idle | ConnectionState::Closed => return,
            _ => {}
        }
        self.state.send_replace(ConnectionState::Closing);

        if let Some(mut sink) = self.sink.take() {
            let _ = sink.send(tungstenite::Message::Close(None)).await;
            let _ = sink.close().await;
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.state.send_replace(ConnectionState::Closed);
        debug!(room_id = %self.room_id, "room socket closed");
    }
}

impl Drop for RoomSocket {
    fn drop(&mut self) {
        // Teardown must happen on every exit path; the reader task does not
        // outlive the socket.
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
