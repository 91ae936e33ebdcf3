//! Session wiring: one dispatch loop per authenticated session.
//!
//! [`ChatSession::spawn`] seeds the state from the local cache, starts the
//! transport task, and runs the loop that serializes every state transition:
//! transport signals, internal events (timer expiries, resolved HTTP calls),
//! and user intents all funnel through [`ChatState::apply`] here, one at a
//! time.  Consumers watch read-only snapshots; nothing mutates state from
//! outside the loop.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use causette_net::{spawn_connection, ConnectionConfig, TransportCommand, TransportSignal};
use causette_shared::constants::{CHANNEL_CAPACITY, TYPING_TTL_MS};
use causette_shared::protocol::ServerEvent;
use causette_shared::types::{Message, MessageId, User, UserId};
use causette_store::Database;

use crate::actions::MutationCoordinator;
use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::history::HistoryController;
use crate::state::{ChatState, Effects, StateEvent};

/// User intents accepted by a running session.
#[derive(Debug)]
pub enum SessionCommand {
    /// Select a conversation peer and request its snapshot.
    SelectPeer(User),
    /// Send a text message to a peer.
    SendText { to: UserId, text: String },
    /// Upload a file and send it as an attachment message.
    SendFile { to: UserId, path: PathBuf },
    /// Notify a peer of the local typing state.
    SendTyping { to: UserId, typing: bool },
    /// Optimistically delete a message.
    DeleteMessage(MessageId),
    /// Load the next older page of history.
    LoadMore,
    /// Search the active conversation; an empty query clears the search.
    Search(String),
    /// Tear the session down (logout / component teardown).
    Shutdown,
}

/// Handle to a running [`ChatSession`].
///
/// Cloneable; dropping every handle shuts the session down.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<ChatState>,
}

impl SessionHandle {
    /// Queue a user intent.  Fails only once the session has shut down.
    pub async fn send(&self, command: SessionCommand) -> Result<(), SessionClosed> {
        self.commands.send(command).await.map_err(|_| SessionClosed)
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> ChatState {
        self.snapshots.borrow().clone()
    }

    /// Watch channel for consumers that want change notifications.
    pub fn watch(&self) -> watch::Receiver<ChatState> {
        self.snapshots.clone()
    }
}

/// The session ended (shutdown or crash) before the command was accepted.
#[derive(Debug, thiserror::Error)]
#[error("chat session is closed")]
pub struct SessionClosed;

pub struct ChatSession;

impl ChatSession {
    /// Start a session for the local user `me`.
    ///
    /// Opens the snapshot cache (best-effort: a broken cache logs a warning
    /// and the session runs without persistence), seeds state from it, spawns
    /// the transport, and starts the dispatch loop.
    pub fn spawn(config: ClientConfig, me: User) -> anyhow::Result<SessionHandle> {
        let api = ApiClient::new(&config)
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

        let db = match Database::new() {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(error = %e, "Cache unavailable, running without persistence");
                None
            }
        };

        let mut state = ChatState::new();
        seed_from_cache(&db, &mut state);

        let (transport_tx, transport_rx) = spawn_connection(ConnectionConfig::new(
            config.websocket_url(),
            config.token.clone(),
        ));

        let (events_tx, events_rx) = mpsc::channel::<StateEvent>(CHANNEL_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(state.clone());

        let coordinator = MutationCoordinator::new(
            transport_tx.clone(),
            api.clone(),
            me.id.clone(),
            events_tx.clone(),
        );
        let history = HistoryController::new(api, me.id.clone(), events_tx.clone());

        tokio::spawn(run_loop(
            state,
            db,
            transport_tx,
            transport_rx,
            events_tx,
            events_rx,
            cmd_rx,
            coordinator,
            history,
            snapshot_tx,
        ));

        info!(user = %me.id, "Chat session started");

        Ok(SessionHandle {
            commands: cmd_tx,
            snapshots: snapshot_rx,
        })
    }
}

/// Seed in-memory state from the durable cache before the live connection
/// comes up.  Read errors are non-fatal: the server re-syncs everything.
fn seed_from_cache(db: &Option<Database>, state: &mut ChatState) {
    let Some(db) = db else { return };

    match db.load_active_peer() {
        Ok(Some(peer)) => {
            info!(peer = %peer.id, "Seeded active peer from cache");
            state.active_peer = Some(peer);
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Failed to read cached peer"),
    }

    match db.load_messages() {
        Ok(Some(messages)) => {
            info!(count = messages.len(), "Seeded messages from cache");
            state.messages = messages;
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Failed to read cached messages"),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    mut state: ChatState,
    db: Option<Database>,
    transport_tx: mpsc::Sender<TransportCommand>,
    mut transport_rx: mpsc::Receiver<TransportSignal>,
    events_tx: mpsc::Sender<StateEvent>,
    mut events_rx: mpsc::Receiver<StateEvent>,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    coordinator: MutationCoordinator,
    history: HistoryController,
    snapshot_tx: watch::Sender<ChatState>,
) {
    // The cache connection is `!Sync`, so it cannot be shared by reference
    // across the `.await` points of the spawned dispatch task.  Guard it with
    // a `Mutex` (never contended — only this task touches it) so the helpers
    // can hold a `Send + Sync` handle and lock for each synchronous access.
    let db = Mutex::new(db);
    loop {
        tokio::select! {
            signal = transport_rx.recv() => {
                let Some(signal) = signal else { break };
                handle_signal(signal, &mut state, &db, &events_tx, &snapshot_tx, &coordinator).await;
            }

            event = events_rx.recv() => {
                // The loop holds its own sender, so this channel never closes
                // before shutdown.
                let Some(event) = event else { break };
                apply_event(event, &mut state, &db.lock().unwrap(), &events_tx, &snapshot_tx);
            }

            command = cmd_rx.recv() => {
                match command {
                    Some(SessionCommand::Shutdown) | None => {
                        info!("Session shutting down");
                        let _ = transport_tx.send(TransportCommand::Shutdown).await;
                        break;
                    }
                    Some(command) => {
                        handle_command(command, &mut state, &db, &events_tx, &snapshot_tx, &coordinator, &history).await;
                    }
                }
            }
        }
    }
}

async fn handle_signal(
    signal: TransportSignal,
    state: &mut ChatState,
    db: &Mutex<Option<Database>>,
    events_tx: &mpsc::Sender<StateEvent>,
    snapshot_tx: &watch::Sender<ChatState>,
    coordinator: &MutationCoordinator,
) {
    match signal {
        TransportSignal::Up => {
            apply_event(
                StateEvent::ConnectionUp,
                state,
                &db.lock().unwrap(),
                events_tx,
                snapshot_tx,
            );
            // Refresh the active conversation to fill any gap; the server
            // pushes the roster and pending messages on its own.
            if let Some(peer) = state.active_peer.clone() {
                debug!(peer = %peer.id, "Reconnected, refreshing conversation");
                coordinator.request_conversation(peer.id).await;
            }
        }
        TransportSignal::Down => {
            apply_event(
                StateEvent::ConnectionDown,
                state,
                &db.lock().unwrap(),
                events_tx,
                snapshot_tx,
            );
        }
        TransportSignal::Error(message) => {
            apply_event(
                StateEvent::ErrorRaised(message),
                state,
                &db.lock().unwrap(),
                events_tx,
                snapshot_tx,
            );
        }
        TransportSignal::Event(event) => {
            apply_event(
                map_server_event(event),
                state,
                &db.lock().unwrap(),
                events_tx,
                snapshot_tx,
            );
        }
    }
}

async fn handle_command(
    command: SessionCommand,
    state: &mut ChatState,
    db: &Mutex<Option<Database>>,
    events_tx: &mpsc::Sender<StateEvent>,
    snapshot_tx: &watch::Sender<ChatState>,
    coordinator: &MutationCoordinator,
    history: &HistoryController,
) {
    match command {
        SessionCommand::SelectPeer(peer) => {
            let peer_id = peer.id.clone();
            apply_event(
                StateEvent::PeerSelected(peer),
                state,
                &db.lock().unwrap(),
                events_tx,
                snapshot_tx,
            );
            coordinator.request_conversation(peer_id).await;
        }
        SessionCommand::SendText { to, text } => {
            coordinator.send_text(to, &text).await;
        }
        SessionCommand::SendFile { to, path } => {
            coordinator.send_file(to, path);
        }
        SessionCommand::SendTyping { to, typing } => {
            coordinator.send_typing(to, typing).await;
        }
        SessionCommand::DeleteMessage(id) => {
            let hidden = coordinator.delete_message(id).await;
            apply_event(hidden, state, &db.lock().unwrap(), events_tx, snapshot_tx);
        }
        SessionCommand::LoadMore => {
            if let Some(event) = history.load_more(state) {
                apply_event(event, state, &db.lock().unwrap(), events_tx, snapshot_tx);
            }
        }
        SessionCommand::Search(query) => {
            if let Some(event) = history.search(state, &query) {
                apply_event(event, state, &db.lock().unwrap(), events_tx, snapshot_tx);
            }
        }
        SessionCommand::Shutdown => unreachable!("handled by the dispatch loop"),
    }
}

/// Map a transport event onto its reducer transition.
fn map_server_event(event: ServerEvent) -> StateEvent {
    match event {
        ServerEvent::UsersUpdated(users) => StateEvent::Roster(users),
        ServerEvent::Message(message) => StateEvent::MessageReceived(message),
        ServerEvent::Conversation(messages) => StateEvent::ConversationLoaded(messages),
        ServerEvent::MessagesPending(messages) => StateEvent::PendingMessages(messages),
        ServerEvent::MessageDeleted(deleted) => {
            debug!(id = %deleted.id, by = %deleted.deleted_by, "Server confirmed deletion");
            StateEvent::MessageDeleted { id: deleted.id }
        }
        ServerEvent::Typing(payload) => StateEvent::Typing(payload),
        ServerEvent::Error(payload) => StateEvent::ErrorRaised(payload.message),
    }
}

/// Reduce one event, run its effects, publish the new snapshot.
fn apply_event(
    event: StateEvent,
    state: &mut ChatState,
    db: &Option<Database>,
    events_tx: &mpsc::Sender<StateEvent>,
    snapshot_tx: &watch::Sender<ChatState>,
) {
    let effects = state.apply(event);
    run_effects(effects, state, db, events_tx);
    let _ = snapshot_tx.send(state.clone());
}

/// Cache writes are best-effort and must never fail the in-memory mutation.
fn run_effects(
    effects: Effects,
    state: &ChatState,
    db: &Option<Database>,
    events_tx: &mpsc::Sender<StateEvent>,
) {
    if effects.persist_messages {
        persist_messages(db, &state.messages);
    }

    if effects.persist_peer {
        persist_peer(db, state.active_peer.as_ref());
    }

    if let Some(generation) = effects.schedule_typing_expiry {
        let tx = events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(TYPING_TTL_MS)).await;
            let _ = tx.send(StateEvent::TypingExpired { generation }).await;
        });
    }
}

fn persist_messages(db: &Option<Database>, messages: &[Message]) {
    let Some(db) = db else { return };
    if let Err(e) = db.save_messages(messages) {
        warn!(error = %e, "Failed to persist message snapshot");
    }
}

fn persist_peer(db: &Option<Database>, peer: Option<&User>) {
    let Some(db) = db else { return };
    let result = match peer {
        Some(peer) => db.save_active_peer(peer),
        None => db.clear_active_peer(),
    };
    if let Err(e) = result {
        warn!(error = %e, "Failed to persist active peer");
    }
}
