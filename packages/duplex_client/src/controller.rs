//! Room lifecycle orchestration.
//!
//! Entering a room runs the history fetch and the socket connect
//! concurrently: early inbound frames queue inside the socket channel and
//! are drained into the timeline only after seeding resolves, so the seed
//! always lands before the first live append and nothing is dropped.
//!
//! Every exit path (room switch, leave, logout, drop) cancels the
//! conversation's token and closes its socket; a departed room's late
//! fetch results die with the token instead of touching the new room.

use duplex_core::{Credential, Message, OutboundFrame, Session};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::history::{DEFAULT_HISTORY_LIMIT, HistoryFetcher};
use crate::socket::RoomSocket;
use crate::timeline::MessageTimeline;

/// What the conversation surfaces to the front end between renders.
#[derive(Debug)]
pub enum ConversationEvent {
    /// A message arrived (or an echo of our own send) and is now in the
    /// timeline.
    Received(Message),
    /// The transport dropped; sending is disabled until reconnected.
    ConnectionLost,
    /// A reconnect attempt succeeded. `history_refreshed` is false when the
    /// catch-up fetch failed (the live feed still works).
    Reconnected { history_refreshed: bool },
}

pub struct ConversationController {
    config: ClientConfig,
    fetcher: HistoryFetcher,
    credential: Credential,
    session: Session,
    active: Option<Conversation>,
}

impl std::fmt::Debug for ConversationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationController")
            .field("session", &self.session)
            .field("active", &self.active.is_some())
            .finish_non_exhaustive()
    }
}

impl ConversationController {
    /// Decode the identity out of the credential and set up the REST
    /// collaborator. An undecodable credential is an auth failure up front.
    pub fn new(config: ClientConfig, credential: Credential) -> Result<Self, ClientError> {
        let session = credential.session().map_err(|err| {
            warn!("credential payload did not decode: {err}");
            ClientError::Auth
        })?;
        let fetcher = HistoryFetcher::new(&config)?;
        Ok(Self {
            config,
            fetcher,
            credential,
            session,
            active: None,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Enter a room: tear down whatever room was active, fetch history and
    /// open the socket, seed the timeline, start relaying.
    ///
    /// A nil room id means the caller has not resolved the room yet; that
    /// is a validation error, not a connection attempt.
    pub async fn enter(&mut self, room_id: Uuid) -> Result<(), ClientError> {
        if room_id.is_nil() {
            return Err(ClientError::Validation(
                "room id is not resolved yet".into(),
            ));
        }

        // The previous room goes away before the new one can deliver
        self.leave().await;

        let conversation = Conversation::open(
            &self.config,
            self.fetcher.clone(),
            self.credential.clone(),
            room_id,
        )
        .await;
        self.active = Some(conversation);
        Ok(())
    }

    /// The active conversation, if any.
    pub fn conversation(&mut self) -> Option<&mut Conversation> {
        self.active.as_mut()
    }

    /// Leave the active room: close the socket, discard the timeline.
    /// Safe to call with no room active.
    pub async fn leave(&mut self) {
        if let Some(mut conversation) = self.active.take() {
            conversation.close().await;
        }
    }

    /// Logout is leave plus forgetting the identity; the controller is
    /// consumed.
    pub async fn logout(mut self) {
        self.leave().await;
        info!(username = %self.session.username, "logged out");
    }
}

pub struct Conversation {
    room_id: Uuid,
    timeline: MessageTimeline,
    socket: RoomSocket,
    inbound: mpsc::Receiver<Message>,
    /// History fetch failed at entry; the timeline started empty.
    history_degraded: bool,
    /// Transport is down; sends are rejected until a reconnect succeeds.
    send_disabled: bool,
    cancel: CancellationToken,
    config: ClientConfig,
    fetcher: HistoryFetcher,
    credential: Credential,
}

impl Conversation {
    /// Fetch history and connect the socket concurrently, then seed.
    ///
    /// Neither failure is fatal: a failed fetch seeds an empty timeline
    /// with the degraded indicator set, and a failed connect leaves the
    /// conversation in the reconnecting path with sends disabled. The
    /// already-rendered timeline never gets cleared by a transport problem.
    async fn open(
        config: &ClientConfig,
        fetcher: HistoryFetcher,
        credential: Credential,
        room_id: Uuid,
    ) -> Self {
        let mut socket = RoomSocket::new(&config.ws_base_url, room_id, &credential);

        let (connect_result, history_result) = tokio::join!(
            socket.connect(),
            fetcher.fetch(&credential, room_id, DEFAULT_HISTORY_LIMIT)
        );

        let mut timeline = MessageTimeline::new(room_id);
        let history_degraded = match history_result {
            Ok(history) => {
                timeline.seed(history);
                false
            }
            Err(err) => {
                warn!(%room_id, "history fetch failed, starting empty: {err}");
                timeline.seed(Vec::new());
                true
            }
        };

        let send_disabled = match connect_result {
            Ok(()) => false,
            Err(err) => {
                warn!(%room_id, "room socket failed to open: {err}");
                true
            }
        };

        // Frames that arrived while the fetch was in flight are sitting in
        // this channel; the event loop drains them into the seeded timeline.
        let inbound = socket.subscribe().unwrap_or_else(closed_channel);

        Self {
            room_id,
            timeline,
            socket,
            inbound,
            history_degraded,
            send_disabled,
            cancel: CancellationToken::new(),
            config: config.clone(),
            fetcher,
            credential,
        }
    }

    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    pub fn timeline(&self) -> &MessageTimeline {
        &self.timeline
    }

    /// True when entry-time history retrieval failed (non-fatal indicator).
    pub fn history_degraded(&self) -> bool {
        self.history_degraded
    }

    /// True while the transport is down and sends are rejected.
    pub fn send_disabled(&self) -> bool {
        self.send_disabled
    }

    /// Submit a message. An empty or whitespace body is rejected locally —
    /// no socket traffic happens. The message itself shows up via the
    /// server echo, not by local insertion.
    pub async fn send(
        &mut self,
        body: &str,
        attachment: Option<String>,
    ) -> Result<(), ClientError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ClientError::Validation(
                "message body must not be empty".into(),
            ));
        }
        if self.send_disabled {
            return Err(ClientError::Transport(
                "room channel is down, reconnecting".into(),
            ));
        }

        let frame = OutboundFrame {
            body: body.to_string(),
            attachment,
        };
        match self.socket.send(&frame).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.send_disabled = true;
                Err(err)
            }
        }
    }

    /// Drive the conversation: the next inbound append, connection-loss
    /// notice, or reconnect outcome. Returns `None` once the conversation
    /// is closed.
    pub async fn next_event(&mut self) -> Option<ConversationEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        // Scope the select so its borrows end before the reconnect path
        // needs the whole conversation again.
        let received = {
            let cancel = self.cancel.clone();
            tokio::select! {
                _ = cancel.cancelled() => return None,
                maybe = self.inbound.recv() => maybe,
            }
        };

        match received {
            Some(message) => {
                self.timeline.append(message.clone());
                Some(ConversationEvent::Received(message))
            }
            None => {
                if !self.send_disabled {
                    // Surface the loss once; reconnect on the next poll
                    self.send_disabled = true;
                    return Some(ConversationEvent::ConnectionLost);
                }
                match self.reconnect().await {
                    Some(history_refreshed) => {
                        Some(ConversationEvent::Reconnected { history_refreshed })
                    }
                    None => None,
                }
            }
        }
    }

    /// Reopen the socket with exponential backoff, then catch up on history.
    /// Returns `None` if the conversation was closed while waiting.
    async fn reconnect(&mut self) -> Option<bool> {
        let policy = self.config.reconnect;
        let mut delay = policy.initial;

        loop {
            debug!(room_id = %self.room_id, "reconnecting in {:?}", delay);
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let mut socket = RoomSocket::new(&self.config.ws_base_url, self.room_id, &self.credential);
            match socket.connect().await {
                Ok(()) => {
                    let Some(inbound) = socket.subscribe() else {
                        delay = policy.next(delay);
                        continue;
                    };

                    // Catch up on whatever we missed; id-dedup makes the
                    // merge safe even where the live feed overlaps.
                    let history_refreshed = match self
                        .fetcher
                        .fetch(&self.credential, self.room_id, DEFAULT_HISTORY_LIMIT)
                        .await
                    {
                        Ok(history) => {
                            for message in history {
                                self.timeline.append(message);
                            }
                            true
                        }
                        Err(err) => {
                            debug!(room_id = %self.room_id, "catch-up fetch failed: {err}");
                            false
                        }
                    };

                    // A late catch-up for a room we already left is discarded
                    if self.cancel.is_cancelled() {
                        socket.close().await;
                        return None;
                    }

                    self.socket = socket;
                    self.inbound = inbound;
                    self.send_disabled = false;
                    info!(room_id = %self.room_id, "room socket reconnected");
                    return Some(history_refreshed);
                }
                Err(err) => {
                    debug!(room_id = %self.room_id, "reconnect attempt failed: {err}");
                    delay = policy.next(delay);
                }
            }
        }
    }

    /// Tear down: cancel pending work, close the socket (idempotent),
    /// discard the timeline.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        self.socket.close().await;
        self.timeline.clear();
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        // Guarantees the reconnect loop and late fetches die even when the
        // conversation is dropped without an explicit close.
        self.cancel.cancel();
    }
}

/// A pre-closed channel for the no-connection case: `recv` yields `None`
/// immediately, which routes the event loop into the reconnect path.
fn closed_channel() -> mpsc::Receiver<Message> {
    let (tx, rx) = mpsc::channel(1);
    drop(tx);
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_controller() -> ConversationController {
        let config = ClientConfig::for_base_urls("http://127.0.0.1:1", "ws://127.0.0.1:1");
        let payload = {
            use base64::Engine;
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(
                serde_json::json!({
                    "id": Uuid::new_v4(),
                    "firstName": "Ada",
                    "username": "ada",
                    "email": "ada@example.com",
                })
                .to_string(),
            )
        };
        let credential = Credential::new(format!("h.{payload}.s"));
        ConversationController::new(config, credential).unwrap()
    }

    #[tokio::test]
    async fn entering_an_unresolved_room_is_a_validation_error() {
        let mut controller = test_controller();
        let err = controller.enter(Uuid::nil()).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert!(controller.conversation().is_none());
    }

    #[test]
    fn garbage_credential_is_an_auth_error() {
        let config = ClientConfig::for_base_urls("http://127.0.0.1:1", "ws://127.0.0.1:1");
        let err = ConversationController::new(config, Credential::new("garbage")).unwrap_err();
        assert!(matches!(err, ClientError::Auth));
    }

    #[test]
    fn session_is_decoded_from_credential() {
        let controller = test_controller();
        assert_eq!(controller.session().username, "ada");
    }

    #[tokio::test]
    async fn leave_without_active_room_is_fine() {
        let mut controller = test_controller();
        controller.leave().await;
        controller.logout().await;
    }
}
