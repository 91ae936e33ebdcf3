//! The conversation state machine.
//!
//! [`ChatState`] is the canonical, session-owned conversation view.  Every
//! change goes through [`ChatState::apply`]: a deterministic reduction of one
//! [`StateEvent`] into the next state, returning the [`Effects`] the caller
//! must perform (cache persistence, typing-expiry scheduling).  The dispatch
//! loop in [`crate::session`] is the only caller, which keeps the state
//! single-writer; everyone else reads cloned snapshots.

use std::collections::HashSet;

use tracing::debug;

use causette_shared::constants::PAGE_SIZE;
use causette_shared::types::{Message, MessageId, TypingPayload, User, UserId};

/// Captures which peer selection a request/response call was issued under.
///
/// The generation is bumped on every peer selection; a response whose token
/// no longer matches is stale and discarded wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestToken {
    pub peer: UserId,
    pub generation: u64,
}

/// Every event the reducer understands, from the transport, from local
/// intents, and from resolved request/response calls.
#[derive(Debug, Clone)]
pub enum StateEvent {
    /// Authoritative roster replacement.
    Roster(Vec<User>),
    /// A single live message arrived.
    MessageReceived(Message),
    /// Conversation snapshot (initial load or reconnect refresh).
    ConversationLoaded(Vec<Message>),
    /// Burst of messages queued while this client was offline.
    PendingMessages(Vec<Message>),
    /// Server-confirmed durable deletion.
    MessageDeleted { id: MessageId },
    /// Optimistic local removal, ahead of server confirmation.
    MessageHidden(MessageId),
    /// A peer started typing.
    Typing(TypingPayload),
    /// A previously scheduled typing expiry fired.
    TypingExpired { generation: u64 },
    /// The transport came up.
    ConnectionUp,
    /// The transport went down.
    ConnectionDown,
    /// A non-fatal error to surface.
    ErrorRaised(String),
    /// The user selected a conversation peer.
    PeerSelected(User),
    /// A history page request went out.
    PageRequested,
    /// A history page resolved.
    PageLoaded { token: RequestToken, page: Vec<Message> },
    /// A history page request failed.
    PageFailed { token: RequestToken, error: String },
    /// A search request went out.
    SearchRequested { query: String },
    /// A search resolved.
    SearchLoaded { token: RequestToken, hits: Vec<Message> },
    /// A search request failed.
    SearchFailed { token: RequestToken, error: String },
    /// The user cleared the search query.
    SearchCleared,
}

/// Side effects the caller must carry out after a reduction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Effects {
    /// The message snapshot changed and should be persisted.
    pub persist_messages: bool,
    /// The active-peer snapshot changed and should be persisted.
    pub persist_peer: bool,
    /// Schedule a typing expiry carrying this generation.
    pub schedule_typing_expiry: Option<u64>,
}

impl Effects {
    const NONE: Effects = Effects {
        persist_messages: false,
        persist_peer: false,
        schedule_typing_expiry: None,
    };

    const MESSAGES: Effects = Effects {
        persist_messages: true,
        persist_peer: false,
        schedule_typing_expiry: None,
    };
}

/// Canonical conversation state for one session.
#[derive(Debug, Clone)]
pub struct ChatState {
    /// All known messages of the active conversation, oldest first.
    pub messages: Vec<Message>,
    /// The selected conversation peer, if any.
    pub active_peer: Option<User>,
    /// Contact roster, replaced wholesale on roster updates.
    pub roster: Vec<User>,
    /// At most one live typing signal.
    pub typing: Vec<TypingPayload>,
    /// Whether the event stream is currently up.
    pub is_connected: bool,
    /// Last surfaced non-fatal error.
    pub error: Option<String>,
    /// A history page fetch is in flight.
    pub is_loading_more: bool,
    /// The server may still hold older history.
    pub has_more_messages: bool,
    /// Current search query, empty when no search is active.
    pub search_query: String,
    /// Search hits; always a subset of `messages` by id.
    pub search_results: Vec<Message>,
    /// A search request is in flight.
    pub is_searching: bool,

    typing_generation: u64,
    request_generation: u64,
}

impl ChatState {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            active_peer: None,
            roster: Vec::new(),
            typing: Vec::new(),
            is_connected: false,
            error: None,
            is_loading_more: false,
            has_more_messages: true,
            search_query: String::new(),
            search_results: Vec::new(),
            is_searching: false,
            typing_generation: 0,
            request_generation: 0,
        }
    }

    /// Token for a request/response call issued right now, or `None` when no
    /// peer is selected.
    pub fn request_token(&self) -> Option<RequestToken> {
        self.active_peer.as_ref().map(|peer| RequestToken {
            peer: peer.id.clone(),
            generation: self.request_generation,
        })
    }

    /// Whether a resolving request still belongs to the current selection.
    pub fn token_is_current(&self, token: &RequestToken) -> bool {
        token.generation == self.request_generation
            && self
                .active_peer
                .as_ref()
                .is_some_and(|peer| peer.id == token.peer)
    }

    /// Reduce one event into the next state.
    pub fn apply(&mut self, event: StateEvent) -> Effects {
        match event {
            StateEvent::Roster(users) => {
                self.roster = users;
                Effects::NONE
            }

            StateEvent::MessageReceived(message) => {
                if self.contains(&message.id) {
                    debug!(id = %message.id, "duplicate delivery ignored");
                    return Effects::NONE;
                }
                self.messages.push(message);
                Effects::MESSAGES
            }

            StateEvent::ConversationLoaded(batch) | StateEvent::PendingMessages(batch) => {
                self.merge_append(batch)
            }

            StateEvent::MessageDeleted { id } => self.remove_message(&id),

            StateEvent::MessageHidden(id) => self.remove_message(&id),

            StateEvent::Typing(payload) => {
                self.typing_generation += 1;
                self.typing = vec![payload];
                Effects {
                    schedule_typing_expiry: Some(self.typing_generation),
                    ..Effects::NONE
                }
            }

            StateEvent::TypingExpired { generation } => {
                // A stale timer must not clear a newer signal.
                if generation == self.typing_generation {
                    self.typing.clear();
                }
                Effects::NONE
            }

            StateEvent::ConnectionUp => {
                self.is_connected = true;
                self.error = None;
                Effects::NONE
            }

            StateEvent::ConnectionDown => {
                self.is_connected = false;
                Effects::NONE
            }

            StateEvent::ErrorRaised(message) => {
                self.error = Some(message);
                Effects::NONE
            }

            StateEvent::PeerSelected(peer) => {
                self.active_peer = Some(peer);
                self.messages.clear();
                self.typing.clear();
                self.search_query.clear();
                self.search_results.clear();
                self.is_searching = false;
                self.is_loading_more = false;
                self.has_more_messages = true;
                self.request_generation += 1;
                Effects {
                    persist_messages: true,
                    persist_peer: true,
                    schedule_typing_expiry: None,
                }
            }

            StateEvent::PageRequested => {
                self.is_loading_more = true;
                Effects::NONE
            }

            StateEvent::PageLoaded { token, page } => {
                if !self.token_is_current(&token) {
                    debug!(peer = %token.peer, "discarding stale history page");
                    return Effects::NONE;
                }
                self.is_loading_more = false;
                // Exhaustion is judged on the raw page, before dedup.
                self.has_more_messages = page.len() as u32 == PAGE_SIZE;

                let known: HashSet<MessageId> =
                    self.messages.iter().map(|m| m.id.clone()).collect();
                let fresh: Vec<Message> = page
                    .into_iter()
                    .filter(|m| !known.contains(&m.id))
                    .collect();
                if fresh.is_empty() {
                    return Effects::NONE;
                }
                self.messages.splice(0..0, fresh);
                Effects::MESSAGES
            }

            StateEvent::PageFailed { token, error } => {
                if !self.token_is_current(&token) {
                    return Effects::NONE;
                }
                self.is_loading_more = false;
                self.error = Some(error);
                Effects::NONE
            }

            StateEvent::SearchRequested { query } => {
                self.search_query = query;
                self.is_searching = true;
                Effects::NONE
            }

            StateEvent::SearchLoaded { token, hits } => {
                if !self.token_is_current(&token) {
                    debug!(peer = %token.peer, "discarding stale search result");
                    return Effects::NONE;
                }
                self.is_searching = false;
                // Only surface hits that still exist locally.
                let known: HashSet<MessageId> =
                    self.messages.iter().map(|m| m.id.clone()).collect();
                self.search_results = hits
                    .into_iter()
                    .filter(|hit| known.contains(&hit.id))
                    .collect();
                Effects::NONE
            }

            StateEvent::SearchFailed { token, error } => {
                if !self.token_is_current(&token) {
                    return Effects::NONE;
                }
                self.is_searching = false;
                self.error = Some(error);
                Effects::NONE
            }

            StateEvent::SearchCleared => {
                self.search_query.clear();
                self.search_results.clear();
                self.is_searching = false;
                Effects::NONE
            }
        }
    }

    fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| m.id == *id)
    }

    /// Append only messages not already present; existing entries are never
    /// overwritten, so a live-stream version always wins over older fetches.
    fn merge_append(&mut self, batch: Vec<Message>) -> Effects {
        let mut appended = false;
        for message in batch {
            if !self.contains(&message.id) {
                self.messages.push(message);
                appended = true;
            }
        }
        if appended {
            Effects::MESSAGES
        } else {
            Effects::NONE
        }
    }

    /// Remove a message from the canonical list and from search results.
    /// Idempotent: removing an absent id changes nothing.
    fn remove_message(&mut self, id: &MessageId) -> Effects {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != *id);
        self.search_results.retain(|m| m.id != *id);
        if self.messages.len() == before {
            Effects::NONE
        } else {
            Effects::MESSAGES
        }
    }
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, minute, 0).unwrap()
    }

    fn msg(id: &str, minute: u32) -> Message {
        Message::new_text(id, "bob", "me", format!("message {id}"), ts(minute))
    }

    fn peer(id: &str) -> User {
        User {
            id: id.into(),
            username: id.to_string(),
            avatar: None,
            online: true,
            last_seen: None,
            created_at: None,
        }
    }

    fn state_with_peer() -> ChatState {
        let mut state = ChatState::new();
        state.apply(StateEvent::PeerSelected(peer("bob")));
        state
    }

    fn page_of(ids: &[&str]) -> Vec<Message> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| msg(id, i as u32))
            .collect()
    }

    #[test]
    fn incoming_message_is_idempotent() {
        let mut state = state_with_peer();

        let effects = state.apply(StateEvent::MessageReceived(msg("m1", 0)));
        assert!(effects.persist_messages);
        assert_eq!(state.messages.len(), 1);

        let effects = state.apply(StateEvent::MessageReceived(msg("m1", 0)));
        assert!(!effects.persist_messages);
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn snapshot_merge_is_non_destructive() {
        let mut state = state_with_peer();
        state.apply(StateEvent::ConversationLoaded(page_of(&["m1", "m2"])));
        assert_eq!(state.messages.len(), 2);

        // Overlapping snapshot: never shrinks, never duplicates.
        state.apply(StateEvent::ConversationLoaded(page_of(&["m2", "m3"])));
        assert_eq!(state.messages.len(), 3);

        let ids: Vec<&str> = state.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn snapshot_never_overwrites_live_version() {
        let mut state = state_with_peer();

        let mut live = msg("m1", 0);
        live.text = Some("live version".into());
        state.apply(StateEvent::MessageReceived(live));

        let mut fetched = msg("m1", 0);
        fetched.text = Some("older fetched version".into());
        state.apply(StateEvent::ConversationLoaded(vec![fetched]));

        assert_eq!(state.messages[0].text.as_deref(), Some("live version"));
    }

    #[test]
    fn pending_burst_uses_the_same_dedup() {
        let mut state = state_with_peer();
        state.apply(StateEvent::MessageReceived(msg("m1", 0)));
        state.apply(StateEvent::PendingMessages(page_of(&["m1", "m2"])));
        assert_eq!(state.messages.len(), 2);
    }

    #[test]
    fn optimistic_delete_then_server_confirmation() {
        let mut state = state_with_peer();
        state.apply(StateEvent::ConversationLoaded(page_of(&["m1", "m2", "m3"])));

        // Optimistic removal is synchronously observable.
        let effects = state.apply(StateEvent::MessageHidden("m2".into()));
        assert!(effects.persist_messages);
        let ids: Vec<&str> = state.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m3"]);

        // The later server confirmation is a no-op.
        let snapshot = state.messages.clone();
        let effects = state.apply(StateEvent::MessageDeleted { id: "m2".into() });
        assert!(!effects.persist_messages);
        assert_eq!(state.messages, snapshot);
    }

    #[test]
    fn durable_delete_also_purges_search_results() {
        let mut state = state_with_peer();
        state.apply(StateEvent::ConversationLoaded(page_of(&["m1", "m2"])));
        let token = state.request_token().unwrap();
        state.apply(StateEvent::SearchLoaded {
            token,
            hits: page_of(&["m1", "m2"]),
        });
        assert_eq!(state.search_results.len(), 2);

        state.apply(StateEvent::MessageDeleted { id: "m1".into() });
        assert_eq!(state.search_results.len(), 1);
        assert_eq!(state.search_results[0].id, "m2".into());
    }

    #[test]
    fn short_page_exhausts_pagination() {
        let mut state = state_with_peer();
        state.apply(StateEvent::PageRequested);
        assert!(state.is_loading_more);

        let token = state.request_token().unwrap();
        let short: Vec<Message> = (0..10).map(|i| msg(&format!("p{i}"), i)).collect();
        state.apply(StateEvent::PageLoaded { token, page: short });

        assert!(!state.is_loading_more);
        assert!(!state.has_more_messages);
        assert_eq!(state.messages.len(), 10);
    }

    #[test]
    fn full_page_keeps_pagination_open() {
        let mut state = state_with_peer();
        state.apply(StateEvent::PageRequested);

        let token = state.request_token().unwrap();
        let full: Vec<Message> = (0..PAGE_SIZE).map(|i| msg(&format!("p{i}"), i)).collect();
        state.apply(StateEvent::PageLoaded { token, page: full });

        assert!(state.has_more_messages);
        assert_eq!(state.messages.len(), PAGE_SIZE as usize);
    }

    #[test]
    fn page_is_prepended_without_duplicating_live_messages() {
        let mut state = state_with_peer();
        state.apply(StateEvent::MessageReceived(msg("m9", 9)));

        let token = state.request_token().unwrap();
        state.apply(StateEvent::PageLoaded {
            token,
            page: page_of(&["m1", "m2", "m9"]),
        });

        let ids: Vec<&str> = state.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m9"]);
    }

    #[test]
    fn stale_page_is_discarded_after_peer_switch() {
        let mut state = state_with_peer();
        state.apply(StateEvent::PageRequested);
        let token = state.request_token().unwrap();

        // The user switches peers while the page is in flight.
        state.apply(StateEvent::PeerSelected(peer("carol")));

        state.apply(StateEvent::PageLoaded {
            token,
            page: page_of(&["old1", "old2"]),
        });
        assert!(state.messages.is_empty());

        // Same selection, later generation: a re-selected peer also
        // invalidates earlier in-flight requests.
        state.apply(StateEvent::PageRequested);
        let stale = RequestToken {
            peer: "carol".into(),
            generation: 0,
        };
        state.apply(StateEvent::PageLoaded {
            token: stale,
            page: page_of(&["old3"]),
        });
        assert!(state.messages.is_empty());
    }

    #[test]
    fn page_failure_clears_the_flag_and_surfaces_the_error() {
        let mut state = state_with_peer();
        state.apply(StateEvent::PageRequested);
        let token = state.request_token().unwrap();

        state.apply(StateEvent::PageFailed {
            token,
            error: "boom".into(),
        });
        assert!(!state.is_loading_more);
        assert_eq!(state.error.as_deref(), Some("boom"));
    }

    #[test]
    fn search_results_are_contained_in_messages() {
        let mut state = state_with_peer();
        state.apply(StateEvent::ConversationLoaded(page_of(&["m1", "m2"])));

        let token = state.request_token().unwrap();
        // The server also returns a hit we no longer hold locally.
        state.apply(StateEvent::SearchLoaded {
            token,
            hits: page_of(&["m1", "gone"]),
        });

        assert_eq!(state.search_results.len(), 1);
        assert_eq!(state.search_results[0].id, "m1".into());
        for hit in &state.search_results {
            assert!(state.messages.iter().any(|m| m.id == hit.id));
        }
    }

    #[test]
    fn stale_search_is_discarded() {
        let mut state = state_with_peer();
        state.apply(StateEvent::SearchRequested { query: "salut".into() });
        let token = state.request_token().unwrap();

        state.apply(StateEvent::PeerSelected(peer("carol")));
        state.apply(StateEvent::SearchLoaded {
            token,
            hits: page_of(&["m1"]),
        });
        assert!(state.search_results.is_empty());
    }

    #[test]
    fn typing_expiry_is_generation_guarded() {
        let mut state = ChatState::new();

        let effects = state.apply(StateEvent::Typing(TypingPayload {
            from: "a".into(),
            username: "alice".into(),
        }));
        let gen_a = effects.schedule_typing_expiry.unwrap();

        let effects = state.apply(StateEvent::Typing(TypingPayload {
            from: "b".into(),
            username: "bob".into(),
        }));
        let gen_b = effects.schedule_typing_expiry.unwrap();
        assert!(gen_b > gen_a);

        // A's stale timer fires: B's signal must survive.
        state.apply(StateEvent::TypingExpired { generation: gen_a });
        assert_eq!(state.typing.len(), 1);
        assert_eq!(state.typing[0].from, "b".into());

        // B's own timer clears it.
        state.apply(StateEvent::TypingExpired { generation: gen_b });
        assert!(state.typing.is_empty());
    }

    #[test]
    fn reconnect_clears_the_error() {
        let mut state = ChatState::new();
        state.apply(StateEvent::ErrorRaised("connection lost".into()));
        state.apply(StateEvent::ConnectionDown);
        assert!(!state.is_connected);

        state.apply(StateEvent::ConnectionUp);
        assert!(state.is_connected);
        assert!(state.error.is_none());
    }

    #[test]
    fn roster_is_replaced_wholesale() {
        let mut state = ChatState::new();
        state.apply(StateEvent::Roster(vec![peer("a"), peer("b")]));
        assert_eq!(state.roster.len(), 2);

        state.apply(StateEvent::Roster(vec![peer("c")]));
        assert_eq!(state.roster.len(), 1);
        assert_eq!(state.roster[0].id, "c".into());
    }

    #[test]
    fn peer_selection_resets_conversation_substate() {
        let mut state = state_with_peer();
        state.apply(StateEvent::ConversationLoaded(page_of(&["m1"])));
        state.apply(StateEvent::SearchRequested { query: "q".into() });
        state.apply(StateEvent::Typing(TypingPayload {
            from: "bob".into(),
            username: "bob".into(),
        }));

        let effects = state.apply(StateEvent::PeerSelected(peer("carol")));
        assert!(effects.persist_messages);
        assert!(effects.persist_peer);
        assert!(state.messages.is_empty());
        assert!(state.search_query.is_empty());
        assert!(state.typing.is_empty());
        assert!(!state.is_searching);
        assert!(state.has_more_messages);
    }

    // The end-to-end reducer scenario: snapshot, duplicate delivery,
    // optimistic delete, server confirmation.
    #[test]
    fn conversation_lifecycle_scenario() {
        let mut state = state_with_peer();

        state.apply(StateEvent::ConversationLoaded(page_of(&["m1", "m2", "m3"])));
        let ids: Vec<&str> = state.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);

        state.apply(StateEvent::MessageReceived(msg("m2", 1)));
        assert_eq!(state.messages.len(), 3);

        state.apply(StateEvent::MessageHidden("m2".into()));
        let ids: Vec<&str> = state.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m3"]);

        let snapshot = state.messages.clone();
        state.apply(StateEvent::MessageDeleted { id: "m2".into() });
        assert_eq!(state.messages, snapshot);
    }
}
