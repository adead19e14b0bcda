//! Public session client: connect/disconnect and observable session state.
//!
//! Each connection attempt runs as one spawned task that owns the transport
//! handle and the `Session` aggregate; the task is the only writer of
//! session state, and consumers observe snapshots through a watch channel.
//! At most one attempt exists at a time: connect() tears down any prior
//! attempt before starting a new one, and disconnect() is effective
//! immediately, superseding an in-flight handshake.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::ClearNodeConfig;
use crate::custody;
use crate::error::SessionError;
use crate::session::connection::{Connection, ConnectionEvent};
use crate::session::handshake;
use crate::session::state::Session;
use crate::wallet::{WalletContext, WalletSigner, normalize_wallet_address};

#[derive(Debug)]
enum SessionCommand {
    Disconnect,
}

/// Handle to the off-chain session. Dropping the handle aborts any live
/// attempt and releases the underlying connection.
pub struct SessionClient {
    config: ClearNodeConfig,
    signer: Arc<dyn WalletSigner>,
    state: Arc<watch::Sender<Session>>,
    state_rx: watch::Receiver<Session>,
    cmd_tx: Option<mpsc::Sender<SessionCommand>>,
    task: Option<JoinHandle<()>>,
}

impl SessionClient {
    pub fn new(config: ClearNodeConfig, signer: Arc<dyn WalletSigner>) -> Self {
        let (state, state_rx) = watch::channel(Session::new(
            config.token_symbol.clone(),
            config.token_decimals,
        ));
        Self {
            config,
            signer,
            state: Arc::new(state),
            state_rx,
            cmd_tx: None,
            task: None,
        }
    }

    /// Current session snapshot.
    pub fn session(&self) -> Session {
        self.state_rx.borrow().clone()
    }

    /// Watch receiver for observing session state changes.
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.state_rx.clone()
    }

    /// Start a session: validate preconditions, open the connection, run the
    /// handshake, then consume inbound messages until close or disconnect.
    ///
    /// Any prior attempt is torn down first. Precondition failures are
    /// returned and recorded in the session state; everything later surfaces
    /// through the watch channel.
    pub async fn connect(&mut self, wallet: &WalletContext) -> Result<(), SessionError> {
        self.teardown().await;

        let Some(raw_address) = wallet.address.as_deref() else {
            return Err(self.precondition_failed(SessionError::WalletNotConnected));
        };
        let Some(address) = normalize_wallet_address(raw_address) else {
            return Err(self.precondition_failed(SessionError::InvalidWalletAddress {
                value: raw_address.to_string(),
            }));
        };
        if custody::settlement_chain(wallet.chain_id).is_none() {
            return Err(self.precondition_failed(SessionError::UnsupportedChain {
                chain_id: wallet.chain_id,
            }));
        }

        self.state.send_modify(Session::begin_connect);
        tracing::info!(
            address = %address,
            chain_id = wallet.chain_id,
            endpoint = %self.config.ws_url,
            "starting coordinator session"
        );

        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let task = tokio::spawn(session_task(
            self.config.clone(),
            Arc::clone(&self.signer),
            address,
            Arc::clone(&self.state),
            cmd_rx,
        ));
        self.cmd_tx = Some(cmd_tx);
        self.task = Some(task);
        Ok(())
    }

    /// End the session. Effective immediately: supersedes an in-flight
    /// handshake and discards its eventual response. Idempotent.
    pub async fn disconnect(&mut self) {
        self.teardown().await;
    }

    fn precondition_failed(&self, error: SessionError) -> SessionError {
        self.state.send_modify(|s| s.fail(error.to_string()));
        error
    }

    /// Stop the current attempt, if any, and wait for its resources to be
    /// released.
    async fn teardown(&mut self) {
        if let Some(cmd_tx) = self.cmd_tx.take() {
            // Fails only if the task already exited, which is fine.
            let _ = cmd_tx.send(SessionCommand::Disconnect).await;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// The session event loop: sole owner of the connection and sole writer of
/// session state for this attempt.
async fn session_task(
    config: ClearNodeConfig,
    signer: Arc<dyn WalletSigner>,
    address: String,
    state: Arc<watch::Sender<Session>>,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
) {
    let mut conn = tokio::select! {
        result = Connection::open(&config.ws_url) => match result {
            Ok(conn) => conn,
            Err(e) => {
                state.send_modify(|s| s.fail(e.to_string()));
                return;
            }
        },
        _ = cmd_rx.recv() => {
            state.send_modify(Session::connection_closed);
            return;
        }
    };

    state.send_modify(Session::connection_opened);

    // The select! returns a value instead of touching `conn` in its
    // handlers, so the connection stays borrowable afterwards.
    let phase = tokio::select! {
        outcome = handshake::authenticate(
            &mut conn,
            signer.as_ref(),
            &address,
            config.handshake_timeout,
        ) => HandshakePhase::Settled(outcome),
        _ = cmd_rx.recv() => HandshakePhase::Cancelled,
    };

    match phase {
        HandshakePhase::Settled(Ok(outcome)) => {
            state.send_modify(|s| s.handshake_succeeded(outcome.channel_id, outcome.balance));
        }
        HandshakePhase::Settled(Err(e)) => {
            // The handshake already closed the connection.
            state.send_modify(|s| s.fail(e.to_string()));
            return;
        }
        HandshakePhase::Cancelled => {
            conn.close().await;
            state.send_modify(Session::connection_closed);
            return;
        }
    }

    loop {
        let step = tokio::select! {
            event = conn.next_event() => ActiveStep::Connection(event),
            _ = cmd_rx.recv() => ActiveStep::Disconnect,
        };

        match step {
            ActiveStep::Connection(Some(ConnectionEvent::Push(push))) => {
                state.send_modify(|s| s.apply_push(&push));
            }
            ActiveStep::Connection(Some(ConnectionEvent::Error(reason))) => {
                state.send_modify(|s| s.fail(format!("transport error: {reason}")));
                conn.close().await;
                return;
            }
            ActiveStep::Connection(Some(ConnectionEvent::Closed { code, reason })) => {
                tracing::debug!(?code, reason, "coordinator closed the session");
                state.send_modify(Session::connection_closed);
                return;
            }
            ActiveStep::Connection(None) => {
                state.send_modify(Session::connection_closed);
                return;
            }
            ActiveStep::Disconnect => {
                conn.close().await;
                state.send_modify(Session::connection_closed);
                return;
            }
        }
    }
}

enum HandshakePhase {
    Settled(Result<handshake::HandshakeOutcome, crate::error::HandshakeError>),
    Cancelled,
}

enum ActiveStep {
    Connection(Option<ConnectionEvent>),
    Disconnect,
}
