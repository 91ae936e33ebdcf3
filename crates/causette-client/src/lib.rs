//! # causette-client
//!
//! Synchronization core of the Causette chat client: the session-owned
//! conversation state machine, the optimistic mutation coordinator, the
//! pagination/search controller, and the HTTP request/response client.
//!
//! A rendering layer drives a session through [`SessionHandle`]: intents go
//! in as [`SessionCommand`]s, state comes back as [`ChatState`] snapshots
//! over a watch channel.

pub mod actions;
pub mod api;
pub mod config;
pub mod history;
pub mod session;
pub mod state;

use tracing_subscriber::{fmt, EnvFilter};

pub use api::{ApiClient, ApiError};
pub use config::ClientConfig;
pub use session::{ChatSession, SessionCommand, SessionHandle};
pub use state::{ChatState, StateEvent};

/// Install the global tracing subscriber for a client process.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("causette_client=debug,causette_net=debug,causette_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
