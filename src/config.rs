//! Configuration for the ClearNode session client.
//!
//! Settings are resolved with priority: env var > default. The coordinator
//! endpoint is fixed per network (production or sandbox) and is never
//! renegotiated mid-session; `CLEARNODE_WS_URL` overrides the URL outright
//! for local development against a mock coordinator.

use std::time::Duration;

use crate::error::ConfigError;

/// Default hard deadline for the authentication handshake, measured from the
/// moment `auth_challenge` is issued.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_TOKEN_SYMBOL: &str = "usdc";
const DEFAULT_TOKEN_DECIMALS: u8 = 6;

/// Which ClearNode deployment the client connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearNodeNetwork {
    Production,
    Sandbox,
}

impl ClearNodeNetwork {
    fn parse(value: &str, key: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "mainnet" => Ok(Self::Production),
            "sandbox" | "testnet" => Ok(Self::Sandbox),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected 'production' or 'sandbox', got '{value}'"),
            }),
        }
    }

    pub fn default_ws_url(self) -> &'static str {
        match self {
            Self::Production => "wss://clearnet.yellow.com/ws",
            Self::Sandbox => "wss://clearnet-sandbox.yellow.com/ws",
        }
    }
}

/// Resolved configuration for a session client instance.
#[derive(Debug, Clone)]
pub struct ClearNodeConfig {
    pub network: ClearNodeNetwork,
    /// Coordinator WebSocket endpoint.
    pub ws_url: String,
    /// Hard deadline for the challenge/sign/verify exchange.
    pub handshake_timeout: Duration,
    /// Display metadata for the session's settlement asset, fixed for the
    /// life of a session.
    pub token_symbol: String,
    pub token_decimals: u8,
}

impl ClearNodeConfig {
    /// Programmatic defaults for a given network.
    pub fn for_network(network: ClearNodeNetwork) -> Self {
        Self {
            network,
            ws_url: network.default_ws_url().to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            token_symbol: DEFAULT_TOKEN_SYMBOL.to_string(),
            token_decimals: DEFAULT_TOKEN_DECIMALS,
        }
    }

    /// Resolve configuration from the environment.
    pub fn resolve() -> Result<Self, ConfigError> {
        let network = match optional_env("CLEARNODE_NETWORK") {
            Some(raw) => ClearNodeNetwork::parse(&raw, "CLEARNODE_NETWORK")?,
            None => ClearNodeNetwork::Sandbox,
        };

        let ws_url = optional_env("CLEARNODE_WS_URL")
            .unwrap_or_else(|| network.default_ws_url().to_string());

        let handshake_timeout = match optional_env("CLEARNODE_HANDSHAKE_TIMEOUT_MS") {
            Some(raw) => {
                let ms: u64 = raw.parse().map_err(|e| ConfigError::InvalidValue {
                    key: "CLEARNODE_HANDSHAKE_TIMEOUT_MS".to_string(),
                    message: format!("must be a duration in milliseconds: {e}"),
                })?;
                if ms == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "CLEARNODE_HANDSHAKE_TIMEOUT_MS".to_string(),
                        message: "must be greater than zero".to_string(),
                    });
                }
                Duration::from_millis(ms)
            }
            None => DEFAULT_HANDSHAKE_TIMEOUT,
        };

        let token_symbol =
            optional_env("CLEARNODE_TOKEN_SYMBOL").unwrap_or_else(|| DEFAULT_TOKEN_SYMBOL.into());

        let token_decimals = match optional_env("CLEARNODE_TOKEN_DECIMALS") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "CLEARNODE_TOKEN_DECIMALS".to_string(),
                message: format!("must be a small unsigned integer: {e}"),
            })?,
            None => DEFAULT_TOKEN_DECIMALS,
        };

        Ok(Self {
            network,
            ws_url,
            handshake_timeout,
            token_symbol,
            token_decimals,
        })
    }
}

/// Load `.env` into the process environment. Existing env vars always win.
pub fn load_env() {
    let _ = dotenvy::dotenv();
}

/// Read an env var, treating unset, empty, and whitespace-only as absent.
fn optional_env(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}
