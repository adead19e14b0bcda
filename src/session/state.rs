//! The session aggregate and its transition rules.
//!
//! `Session` is owned exclusively by the session task; every mutation goes
//! through the transition methods here, and consumers only ever see watch
//! snapshots. `channel_id` and `balance` are meaningful only while the
//! status is `Active` — every transition out of `Active` clears them so no
//! stale value can be read as current.

use serde::{Deserialize, Serialize};

use crate::protocol::PushMessage;

const ZERO_BALANCE: &str = "0";

/// Connection status of the session. Mutually exclusive, always exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Authenticating,
    Active,
    Error,
}

/// The sole mutable aggregate: one instance per connected wallet/chain pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub status: SessionStatus,
    /// Identifier of the funded state channel; present only once a channel
    /// exists.
    pub channel_id: Option<String>,
    /// Latest known off-chain balance in the settlement token's smallest
    /// unit; authoritative only while `Active`.
    pub balance: String,
    /// Display metadata for the settlement asset, fixed for the session's
    /// life.
    pub token_symbol: String,
    pub token_decimals: u8,
    /// Last failure reason; present only in the `Error` state.
    pub error: Option<String>,
}

impl Session {
    pub fn new(token_symbol: impl Into<String>, token_decimals: u8) -> Self {
        Self {
            status: SessionStatus::Disconnected,
            channel_id: None,
            balance: ZERO_BALANCE.to_string(),
            token_symbol: token_symbol.into(),
            token_decimals,
            error: None,
        }
    }

    /// A new connect() attempt begins: clears any prior error and stale
    /// channel state.
    pub fn begin_connect(&mut self) {
        self.reset();
        self.status = SessionStatus::Connecting;
    }

    /// The transport opened; the handshake takes over.
    pub fn connection_opened(&mut self) {
        if self.status == SessionStatus::Connecting {
            self.status = SessionStatus::Authenticating;
        }
    }

    /// Handshake success: adopt the confirmed channel id and balance,
    /// defaulting balance to zero and channel id to absent.
    pub fn handshake_succeeded(
        &mut self,
        channel_id: Option<String>,
        balance: Option<String>,
    ) {
        self.status = SessionStatus::Active;
        self.channel_id = channel_id;
        self.balance = balance.unwrap_or_else(|| ZERO_BALANCE.to_string());
        self.error = None;
    }

    /// Terminal failure: precondition, transport, or handshake. The error is
    /// sticky until the next explicit connect().
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = SessionStatus::Error;
        self.channel_id = None;
        self.balance = ZERO_BALANCE.to_string();
        self.error = Some(reason.into());
    }

    /// Apply a push notification. Only meaningful while `Active`; pushes in
    /// any other state are dropped.
    pub fn apply_push(&mut self, push: &PushMessage) {
        if self.status != SessionStatus::Active {
            return;
        }
        match push {
            PushMessage::BalanceUpdate { balance } => {
                self.balance = balance.clone();
            }
            PushMessage::ChannelOpened {
                channel_id,
                balance,
            } => {
                self.channel_id = Some(channel_id.clone());
                self.balance = balance.clone();
            }
            PushMessage::ChannelClosed => {
                self.channel_id = None;
                self.balance = ZERO_BALANCE.to_string();
            }
        }
    }

    /// Explicit disconnect() or a transport close. Resets to the full
    /// initial state unless an error is already recorded — a close arriving
    /// after a failure must not overwrite the reason with a generic reset.
    pub fn connection_closed(&mut self) {
        if self.status != SessionStatus::Error {
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.status = SessionStatus::Disconnected;
        self.channel_id = None;
        self.balance = ZERO_BALANCE.to_string();
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn session() -> Session {
        Session::new("usdc", 6)
    }

    fn active_session() -> Session {
        let mut s = session();
        s.begin_connect();
        s.connection_opened();
        s.handshake_succeeded(Some("c1".to_string()), Some("1000000".to_string()));
        s
    }

    #[test]
    fn starts_disconnected_with_zero_balance() {
        let s = session();
        assert_eq!(s.status, SessionStatus::Disconnected);
        assert_eq!(s.channel_id, None);
        assert_eq!(s.balance, "0");
        assert_eq!(s.error, None);
    }

    #[test]
    fn happy_path_reaches_active_with_adopted_state() {
        let s = active_session();
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.channel_id.as_deref(), Some("c1"));
        assert_eq!(s.balance, "1000000");
    }

    #[test]
    fn handshake_without_channel_defaults_to_zero_balance() {
        let mut s = session();
        s.begin_connect();
        s.connection_opened();
        s.handshake_succeeded(None, None);
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.channel_id, None);
        assert_eq!(s.balance, "0");
    }

    #[test]
    fn begin_connect_clears_previous_error() {
        let mut s = session();
        s.fail("chain 5 unsupported");
        s.begin_connect();
        assert_eq!(s.status, SessionStatus::Connecting);
        assert_eq!(s.error, None);
    }

    #[test]
    fn connection_opened_is_ignored_outside_connecting() {
        let mut s = session();
        s.connection_opened();
        assert_eq!(s.status, SessionStatus::Disconnected);
    }

    #[test]
    fn balance_update_replaces_balance_in_place() {
        let mut s = active_session();
        s.apply_push(&PushMessage::BalanceUpdate {
            balance: "2000000".to_string(),
        });
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.channel_id.as_deref(), Some("c1"));
        assert_eq!(s.balance, "2000000");
    }

    #[test]
    fn channel_opened_adopts_identity_and_balance() {
        let mut s = session();
        s.begin_connect();
        s.connection_opened();
        s.handshake_succeeded(None, None);

        s.apply_push(&PushMessage::ChannelOpened {
            channel_id: "c2".to_string(),
            balance: "500".to_string(),
        });
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.channel_id.as_deref(), Some("c2"));
        assert_eq!(s.balance, "500");
    }

    #[test]
    fn channel_closed_clears_channel_but_stays_active() {
        let mut s = active_session();
        s.apply_push(&PushMessage::ChannelClosed);
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.channel_id, None);
        assert_eq!(s.balance, "0");
    }

    #[test]
    fn pushes_outside_active_are_dropped() {
        let mut s = session();
        s.begin_connect();
        s.apply_push(&PushMessage::BalanceUpdate {
            balance: "7".to_string(),
        });
        assert_eq!(s.balance, "0");
        assert_eq!(s.status, SessionStatus::Connecting);
    }

    #[test]
    fn close_from_active_resets_to_initial_state() {
        let mut s = active_session();
        s.connection_closed();
        assert_eq!(s.status, SessionStatus::Disconnected);
        assert_eq!(s.channel_id, None);
        assert_eq!(s.balance, "0");
        assert_eq!(s.error, None);
        // Token metadata survives for the next attempt.
        assert_eq!(s.token_symbol, "usdc");
    }

    #[test]
    fn error_is_sticky_across_late_close_events() {
        let mut s = session();
        s.begin_connect();
        s.connection_opened();
        s.fail("authentication rejected: bad signature");

        s.connection_closed();
        assert_eq!(s.status, SessionStatus::Error);
        assert_eq!(
            s.error.as_deref(),
            Some("authentication rejected: bad signature")
        );
    }

    #[test]
    fn failure_clears_channel_state() {
        let mut s = active_session();
        s.fail("transport error: connection reset");
        assert_eq!(s.status, SessionStatus::Error);
        assert_eq!(s.channel_id, None);
        assert_eq!(s.balance, "0");
    }
}
