//! Pagination and search controller.
//!
//! Issues the two request/response calls against the HTTP API, independently
//! of the live event stream.  Each call guards against overlapping itself and
//! resolves back into the dispatch loop as a [`StateEvent`] carrying the
//! request token captured at dispatch time, so stale responses can be
//! discarded after a peer switch.

use tokio::sync::mpsc;
use tracing::debug;

use causette_shared::constants::{PAGE_SIZE, SEARCH_LIMIT};
use causette_shared::types::UserId;

use crate::api::ApiClient;
use crate::state::{ChatState, StateEvent};

pub struct HistoryController {
    api: ApiClient,
    me: UserId,
    events_tx: mpsc::Sender<StateEvent>,
}

impl HistoryController {
    pub fn new(api: ApiClient, me: UserId, events_tx: mpsc::Sender<StateEvent>) -> Self {
        Self { api, me, events_tx }
    }

    /// Request the next older page of history.
    ///
    /// Preconditions: a peer is selected, the server may still hold older
    /// messages, and no load is already in flight.  Returns the event the
    /// dispatch loop must apply now, or `None` when the call is refused.
    pub fn load_more(&self, state: &ChatState) -> Option<StateEvent> {
        let Some(token) = state.request_token() else {
            debug!("load more refused: no active peer");
            return None;
        };
        if state.is_loading_more || !state.has_more_messages {
            debug!(
                in_flight = state.is_loading_more,
                exhausted = !state.has_more_messages,
                "load more refused"
            );
            return None;
        }

        let skip = state.messages.len() as u32;
        let api = self.api.clone();
        let me = self.me.clone();
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let event = match api.fetch_page(&me, &token.peer, PAGE_SIZE, skip).await {
                Ok(page) => StateEvent::PageLoaded { token, page },
                Err(e) => StateEvent::PageFailed {
                    token,
                    error: format!("Failed to load older messages: {e}"),
                },
            };
            let _ = tx.send(event).await;
        });

        Some(StateEvent::PageRequested)
    }

    /// Run a conversation search.
    ///
    /// An empty trimmed query clears the query and results locally without a
    /// network call.
    pub fn search(&self, state: &ChatState, query: &str) -> Option<StateEvent> {
        let Some(token) = state.request_token() else {
            debug!("search refused: no active peer");
            return None;
        };

        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Some(StateEvent::SearchCleared);
        }
        if state.is_searching {
            debug!("search refused: already in flight");
            return None;
        }

        let query = trimmed.to_string();
        let api = self.api.clone();
        let me = self.me.clone();
        let tx = self.events_tx.clone();

        let spawned_query = query.clone();
        tokio::spawn(async move {
            let event = match api
                .search(&me, &token.peer, &spawned_query, SEARCH_LIMIT)
                .await
            {
                Ok(hits) => StateEvent::SearchLoaded { token, hits },
                Err(e) => StateEvent::SearchFailed {
                    token,
                    error: format!("Search failed: {e}"),
                },
            };
            let _ = tx.send(event).await;
        });

        Some(StateEvent::SearchRequested { query })
    }
}
