//! Error types for the ClearNode session client.

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Builder error: {0}")]
    Builder(#[from] BuilderError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Session lifecycle errors: connect preconditions and transport failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Wallet is not connected")]
    WalletNotConnected,

    #[error("Wallet address '{value}' is not a valid EVM address")]
    InvalidWalletAddress { value: String },

    #[error("Chain {chain_id} is not a supported settlement chain")]
    UnsupportedChain { chain_id: u64 },

    #[error("Invalid coordinator endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Connection is not open")]
    NotConnected,
}

/// Authentication handshake failures. All of these are terminal for the
/// handshake instance and leave the connection closed.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("Authentication timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Malformed authentication response: {reason}")]
    Malformed { reason: String },

    #[error("Authentication rejected: {reason}")]
    Rejected { reason: String },

    #[error("Wallet signing failed: {reason}")]
    Signing { reason: String },

    #[error("Connection lost during authentication: {reason}")]
    ConnectionLost { reason: String },
}

/// Inbound frame validation errors. These are absorbed at the connection
/// layer (logged and dropped), never fatal to the session.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Frame is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Frame carries neither a response id nor a push method")]
    MissingDiscriminator,

    #[error("Response id is not an unsigned integer")]
    InvalidId,

    #[error("Response carries neither result nor error")]
    EmptyResponse,

    #[error("Push '{method}' is missing required field '{field}'")]
    MissingField {
        method: String,
        field: &'static str,
    },

    #[error("Unrecognized push method '{method}'")]
    UnknownMethod { method: String },

    #[error("Unsupported frame type: {0}")]
    UnsupportedFrame(&'static str),
}

/// Wallet-signing capability errors.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("Signing request declined by user")]
    Declined,

    #[error("Wallet signer failed: {0}")]
    Failed(String),

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),
}

/// Custody transaction builder errors. Returned as structured failures,
/// never thrown across the tool boundary.
#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error("Chain {chain_id} is not a supported settlement chain")]
    UnsupportedChain { chain_id: u64 },

    #[error("No settlement token address is configured for chain {chain_id}")]
    NoTokenAddress { chain_id: u64 },

    #[error("Invalid token address '{value}': must be a 0x-prefixed 40-hex address")]
    InvalidTokenAddress { value: String },

    #[error("Invalid amount '{value}': {reason}")]
    InvalidAmount { value: String, reason: String },
}
