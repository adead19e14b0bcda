//! Client for the ClearNode off-chain session coordinator.
//!
//! The crate covers the gas-free session surface of the assistant: a
//! persistent WebSocket session with challenge/response wallet
//! authentication ([`session::SessionClient`]), the JSON-RPC-style wire
//! codec ([`protocol`]), and the pure calldata builders that fund or drain
//! the custody contract backing a channel ([`custody`]).
//!
//! A session's state is observable but never directly mutable from outside:
//! consumers hold a watch receiver of [`Session`] snapshots while the
//! session task applies every transition.

pub mod config;
pub mod custody;
pub mod error;
pub mod protocol;
pub mod session;
pub mod wallet;

pub use config::{ClearNodeConfig, ClearNodeNetwork};
pub use custody::{TransactionStep, build_deposit, build_withdraw};
pub use error::Error;
pub use session::{Session, SessionClient, SessionStatus};
pub use wallet::{LocalWalletSigner, WalletContext, WalletSigner};
