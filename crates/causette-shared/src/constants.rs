/// Application name
pub const APP_NAME: &str = "Causette";

/// Number of messages requested per history page
pub const PAGE_SIZE: u32 = 50;

/// Maximum number of results returned by a conversation search
pub const SEARCH_LIMIT: u32 = 100;

/// How long a typing indicator stays visible without being refreshed (ms)
pub const TYPING_TTL_MS: u64 = 2_000;

/// Bounded capacity of the command / event channels between tasks
pub const CHANNEL_CAPACITY: usize = 256;

/// Delay between WebSocket reconnection attempts (ms)
pub const RECONNECT_DELAY_MS: u64 = 3_000;

/// Default base URL of the chat server (HTTP API + WebSocket upgrade)
pub const DEFAULT_SERVER_URL: &str = "http://localhost:4000";

/// Default timeout for request/response HTTP calls (ms)
pub const REQUEST_TIMEOUT_MS: u64 = 15_000;
