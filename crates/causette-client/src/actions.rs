//! Optimistic mutation coordinator.
//!
//! Translates user intents into outbound transport events.  Sends are pure
//! fire-and-forget: no local placeholder message is fabricated, the
//! authoritative copy arrives when the server echoes it back.  Deletes are
//! optimistic: the message is hidden locally at the same time the request
//! goes out, and the later server confirmation is idempotent against the
//! already-removed entry.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{info, warn};

use causette_net::TransportCommand;
use causette_shared::protocol::{
    ClientEvent, ConversationRequest, DeleteRequest, OutgoingMessage, TypingState,
};
use causette_shared::types::{MessageId, UserId};

use crate::api::ApiClient;
use crate::state::StateEvent;

pub struct MutationCoordinator {
    transport: mpsc::Sender<TransportCommand>,
    api: ApiClient,
    me: UserId,
    events_tx: mpsc::Sender<StateEvent>,
}

impl MutationCoordinator {
    pub fn new(
        transport: mpsc::Sender<TransportCommand>,
        api: ApiClient,
        me: UserId,
        events_tx: mpsc::Sender<StateEvent>,
    ) -> Self {
        Self {
            transport,
            api,
            me,
            events_tx,
        }
    }

    /// Send a text message.  Blank input is ignored.
    pub async fn send_text(&self, to: UserId, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        self.emit(ClientEvent::SendMessage(OutgoingMessage::text(to, trimmed)))
            .await;
    }

    /// Notify the peer of the local typing state.
    pub async fn send_typing(&self, to: UserId, typing: bool) {
        self.emit(ClientEvent::SendTyping(TypingState { to, typing }))
            .await;
    }

    /// Request the conversation snapshot for a peer.
    pub async fn request_conversation(&self, with: UserId) {
        self.emit(ClientEvent::GetConversation(ConversationRequest {
            with_user_id: with,
        }))
        .await;
    }

    /// Delete a message: emit the request and return the optimistic local
    /// removal for the dispatch loop to apply in parallel.
    pub async fn delete_message(&self, id: MessageId) -> StateEvent {
        self.emit(ClientEvent::DeleteMessage(DeleteRequest { id: id.clone() }))
            .await;
        StateEvent::MessageHidden(id)
    }

    /// Upload an attachment, then send it as a file-typed message.  The
    /// upload runs off-loop; failures resolve into the error state field.
    pub fn send_file(&self, to: UserId, path: PathBuf) {
        let api = self.api.clone();
        let me = self.me.clone();
        let transport = self.transport.clone();
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("attachment")
                .to_string();

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = events_tx
                        .send(StateEvent::ErrorRaised(format!(
                            "Failed to read {}: {e}",
                            path.display()
                        )))
                        .await;
                    return;
                }
            };

            match api.upload(&me, &to, file_name, bytes).await {
                Ok(descriptor) => {
                    info!(url = %descriptor.file_url, "Attachment uploaded");
                    let event = ClientEvent::SendMessage(OutgoingMessage::file(to, descriptor));
                    if transport.send(TransportCommand::Emit(event)).await.is_err() {
                        warn!("Transport closed, file message not sent");
                    }
                }
                Err(e) => {
                    let _ = events_tx
                        .send(StateEvent::ErrorRaised(format!("Upload failed: {e}")))
                        .await;
                }
            }
        });
    }

    async fn emit(&self, event: ClientEvent) {
        if self.transport.send(TransportCommand::Emit(event)).await.is_err() {
            warn!("Transport closed, outbound event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causette_shared::constants::CHANNEL_CAPACITY;

    use crate::config::ClientConfig;

    fn coordinator() -> (
        MutationCoordinator,
        mpsc::Receiver<TransportCommand>,
        mpsc::Receiver<StateEvent>,
    ) {
        let (transport_tx, transport_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let api = ApiClient::new(&ClientConfig::default()).unwrap();
        (
            MutationCoordinator::new(transport_tx, api, "me".into(), events_tx),
            transport_rx,
            events_rx,
        )
    }

    #[tokio::test]
    async fn send_text_emits_without_a_local_placeholder() {
        let (coordinator, mut transport_rx, _events_rx) = coordinator();

        coordinator.send_text("bob".into(), "  salut  ").await;

        match transport_rx.recv().await.unwrap() {
            TransportCommand::Emit(ClientEvent::SendMessage(out)) => {
                assert_eq!(out.to, "bob".into());
                assert_eq!(out.text.as_deref(), Some("salut"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_text_is_ignored() {
        let (coordinator, mut transport_rx, _events_rx) = coordinator();

        coordinator.send_text("bob".into(), "   ").await;

        assert!(transport_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn delete_emits_and_hides_in_parallel() {
        let (coordinator, mut transport_rx, _events_rx) = coordinator();

        let event = coordinator.delete_message("m1".into()).await;
        assert!(matches!(event, StateEvent::MessageHidden(id) if id == "m1".into()));

        match transport_rx.recv().await.unwrap() {
            TransportCommand::Emit(ClientEvent::DeleteMessage(req)) => {
                assert_eq!(req.id, "m1".into());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_surfaces_as_state_error() {
        let (coordinator, _transport_rx, mut events_rx) = coordinator();

        coordinator.send_file("bob".into(), PathBuf::from("/no/such/file.png"));

        match events_rx.recv().await.unwrap() {
            StateEvent::ErrorRaised(message) => assert!(message.contains("file.png")),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
