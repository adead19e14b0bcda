//! Authentication handshake: prove wallet ownership to the coordinator
//! immediately after a connection opens.
//!
//! The exchange is challenge → sign → verify, all request/response frames
//! correlated by request id. A single hard deadline, measured from issuing
//! `auth_challenge`, bounds the challenge response, the wallet signature,
//! and the verify response together. Every failure is terminal for this
//! handshake instance and closes the connection it ran over — a failed
//! handshake never leaves a connection open in an ambiguous state.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::error::HandshakeError;
use crate::protocol::{self, AuthChallengeResult, AuthVerifyResult, ResponseFrame};
use crate::session::connection::{Connection, RequestError};
use crate::wallet::WalletSigner;

/// What a successful handshake hands to the state machine.
#[derive(Debug, Clone)]
pub(crate) struct HandshakeOutcome {
    pub channel_id: Option<String>,
    pub balance: Option<String>,
}

/// Run the handshake over an already-open connection. On failure the
/// connection is closed before the error is returned.
pub(crate) async fn authenticate(
    conn: &mut Connection,
    signer: &dyn WalletSigner,
    address: &str,
    timeout: Duration,
) -> Result<HandshakeOutcome, HandshakeError> {
    let result = run(conn, signer, address, timeout).await;
    if let Err(e) = &result {
        tracing::warn!(error = %e, "authentication handshake failed");
        conn.close().await;
    }
    result
}

async fn run(
    conn: &mut Connection,
    signer: &dyn WalletSigner,
    address: &str,
    timeout: Duration,
) -> Result<HandshakeOutcome, HandshakeError> {
    let timeout_secs = timeout.as_secs();
    let deadline = Instant::now() + timeout;

    let response = conn
        .request(|id| protocol::auth_challenge_request(id, address), deadline)
        .await
        .map_err(|e| map_request_error(e, timeout_secs))?;
    let challenge: AuthChallengeResult = success_body(response, "auth_challenge")?;

    let signature =
        match tokio::time::timeout_at(deadline, signer.sign(&challenge.challenge)).await {
            Err(_elapsed) => return Err(HandshakeError::Timeout { timeout_secs }),
            Ok(Err(e)) => {
                return Err(HandshakeError::Signing {
                    reason: e.to_string(),
                });
            }
            Ok(Ok(signature)) => signature,
        };

    let response = conn
        .request(
            |id| protocol::auth_verify_request(id, address, &signature),
            deadline,
        )
        .await
        .map_err(|e| map_request_error(e, timeout_secs))?;
    let verdict: AuthVerifyResult = success_body(response, "auth_verify")?;

    if !verdict.authenticated {
        return Err(HandshakeError::Rejected {
            reason: "authentication rejected by coordinator".to_string(),
        });
    }

    tracing::info!(address, "wallet authenticated with coordinator");
    Ok(HandshakeOutcome {
        channel_id: verdict.channel_id,
        balance: verdict.balance,
    })
}

/// Narrow a response into its typed success body; an `error` body is an
/// explicit rejection, a missing or mistyped `result` is malformed.
fn success_body<T: DeserializeOwned>(
    response: ResponseFrame,
    method: &str,
) -> Result<T, HandshakeError> {
    if let Some(error) = response.error {
        return Err(HandshakeError::Rejected {
            reason: error.message,
        });
    }
    let result = response.result.ok_or_else(|| HandshakeError::Malformed {
        reason: format!("{method} response has no result body"),
    })?;
    serde_json::from_value(result).map_err(|e| HandshakeError::Malformed {
        reason: format!("{method} response: {e}"),
    })
}

fn map_request_error(error: RequestError, timeout_secs: u64) -> HandshakeError {
    match error {
        RequestError::Timeout => HandshakeError::Timeout { timeout_secs },
        RequestError::ConnectionLost(reason) | RequestError::Transport(reason) => {
            HandshakeError::ConnectionLost { reason }
        }
    }
}
