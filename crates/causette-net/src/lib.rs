// WebSocket transport layer for the chat event stream.

pub mod connection;

pub use connection::{
    spawn_connection, ConnectionConfig, NetError, TransportCommand, TransportSignal,
};
