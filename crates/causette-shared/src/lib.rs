//! # causette-shared
//!
//! Domain types and the typed wire protocol shared by every Causette crate.
//!
//! The wire protocol mirrors the chat server's JSON event stream: one JSON
//! object per frame, tagged with the event name.  All structs here derive
//! `Serialize`/`Deserialize` so they can travel both the event stream and the
//! local snapshot cache unchanged.

pub mod constants;
pub mod protocol;
pub mod types;
