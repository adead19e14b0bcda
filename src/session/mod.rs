//! Off-chain session protocol client.
//!
//! Layered bottom-up: the pending-request map correlates responses, the
//! connection manager owns the transport lifecycle, the handshake proves
//! wallet ownership, and the state machine owns the one `Session`
//! aggregate. `SessionClient` is the public handle tying them together.

mod client;
mod connection;
mod handshake;
mod pending;
mod state;

pub use client::SessionClient;
pub use state::{Session, SessionStatus};
