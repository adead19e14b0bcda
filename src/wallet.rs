//! Wallet collaborators: the signing capability and the wallet/chain context.
//!
//! The session client never holds key material itself; it consumes a
//! [`WalletSigner`], which may be backed by a browser wallet, a hardware
//! device, or the in-process [`LocalWalletSigner`] for headless operation
//! and tests. Signatures follow EIP-191 personal-sign: 65 bytes of
//! `r || s || v` over `keccak256("\x19Ethereum Signed Message:\n" + len + message)`.

use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use secrecy::{ExposeSecret, SecretString};
use sha3::{Digest, Keccak256};

use crate::error::SignerError;

/// Asynchronous message-signing capability.
///
/// `sign` may reject ([`SignerError::Declined`], the user refused) or fail
/// ([`SignerError::Failed`], a wallet error); both surface as the handshake's
/// failure reason.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Sign an arbitrary message, returning a 0x-prefixed 65-byte hex
    /// signature.
    async fn sign(&self, message: &str) -> Result<String, SignerError>;
}

/// Wallet/chain context read once per connect() attempt.
#[derive(Debug, Clone, Default)]
pub struct WalletContext {
    /// Connected wallet address; `None` while no wallet is connected.
    pub address: Option<String>,
    /// Active chain id.
    pub chain_id: u64,
}

impl WalletContext {
    pub fn new(address: impl Into<String>, chain_id: u64) -> Self {
        Self {
            address: Some(address.into()),
            chain_id,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.address.is_some()
    }
}

/// In-process EIP-191 signer over a raw secp256k1 key.
pub struct LocalWalletSigner {
    key: SigningKey,
    address: String,
}

impl LocalWalletSigner {
    /// Build a signer from a 0x-prefixed 32-byte hex private key.
    pub fn from_hex(private_key: &SecretString) -> Result<Self, SignerError> {
        let bytes = decode_hex_prefixed(private_key.expose_secret())
            .map_err(SignerError::InvalidKey)?;
        if bytes.len() != 32 {
            return Err(SignerError::InvalidKey(
                "private key must decode to 32 bytes".to_string(),
            ));
        }
        let key = SigningKey::from_slice(&bytes)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Self::from_key(key)
    }

    /// Generate a throwaway signer with a random key.
    pub fn random() -> Self {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        // A freshly generated key always yields a valid verifying key.
        Self::from_key(key).expect("random key derives an address")
    }

    fn from_key(key: SigningKey) -> Result<Self, SignerError> {
        let address = ethereum_address_from_verifying_key(key.verifying_key())
            .map_err(SignerError::InvalidKey)?;
        Ok(Self { key, address })
    }

    /// The 0x-prefixed lowercase address this signer controls.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl std::fmt::Debug for LocalWalletSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material through Debug.
        f.debug_struct("LocalWalletSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WalletSigner for LocalWalletSigner {
    async fn sign(&self, message: &str) -> Result<String, SignerError> {
        let prehash = eip191_personal_sign_hash(message);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| SignerError::Failed(e.to_string()))?;

        let mut bytes = Vec::with_capacity(65);
        bytes.extend_from_slice(signature.to_bytes().as_slice());
        bytes.push(27 + recovery_id.to_byte());
        Ok(format!("0x{}", encode_hex_lower(&bytes)))
    }
}

/// EIP-191 personal-sign digest of a message.
pub fn eip191_personal_sign_hash(message: &str) -> [u8; 32] {
    let bytes = message.as_bytes();
    let prefix = format!("\x19Ethereum Signed Message:\n{}", bytes.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Recover the signing address from an EIP-191 personal-sign signature.
///
/// Used by tests and by callers that want to sanity-check a signature before
/// submitting it; the live handshake trusts the coordinator's verdict.
pub fn recover_personal_sign_address(
    message: &str,
    signature_hex: &str,
) -> Result<String, String> {
    let signature_bytes = decode_hex_prefixed(signature_hex)?;
    if signature_bytes.len() != 65 {
        return Err("signature must decode to 65 bytes".to_string());
    }

    let sig = EcdsaSignature::try_from(&signature_bytes[..64])
        .map_err(|e| format!("invalid ECDSA signature bytes: {e}"))?;
    let recovery_id = normalize_recovery_id(signature_bytes[64])?;
    let prehash = eip191_personal_sign_hash(message);
    let verifying_key = VerifyingKey::recover_from_prehash(&prehash, &sig, recovery_id)
        .map_err(|e| format!("failed recovering signer from signature: {e}"))?;
    ethereum_address_from_verifying_key(&verifying_key)
}

fn normalize_recovery_id(raw: u8) -> Result<RecoveryId, String> {
    let id = match raw {
        27 | 28 => raw - 27,
        0 | 1 => raw,
        _ => return Err("signature recovery id must be 0/1 or 27/28".to_string()),
    };
    RecoveryId::try_from(id).map_err(|_| "signature recovery id is invalid".to_string())
}

fn ethereum_address_from_verifying_key(key: &VerifyingKey) -> Result<String, String> {
    let encoded = key.to_encoded_point(false);
    let pubkey = encoded.as_bytes();
    if pubkey.len() != 65 || pubkey[0] != 0x04 {
        return Err("unexpected public key format".to_string());
    }

    let mut hasher = Keccak256::new();
    hasher.update(&pubkey[1..]);
    let digest = hasher.finalize();
    let address = &digest[12..];
    Ok(format!("0x{}", encode_hex_lower(address)))
}

/// Normalize a 0x-prefixed 40-hex EVM address to lowercase.
pub fn normalize_wallet_address(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if !trimmed.starts_with("0x") || trimmed.len() != 42 {
        return None;
    }
    let hex = &trimmed[2..];
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

pub(crate) fn decode_hex_prefixed(value: &str) -> Result<Vec<u8>, String> {
    let trimmed = value.trim();
    if !trimmed.starts_with("0x") {
        return Err("hex string must be 0x-prefixed".to_string());
    }
    let hex = &trimmed[2..];
    if hex.is_empty() {
        return Err("hex string is empty".to_string());
    }
    if hex.len() % 2 != 0 {
        return Err("hex string must have an even number of characters".to_string());
    }

    let mut out = Vec::with_capacity(hex.len() / 2);
    for pair in hex.as_bytes().chunks_exact(2) {
        let hi = decode_hex_nibble(pair[0]).ok_or_else(|| "invalid hex character".to_string())?;
        let lo = decode_hex_nibble(pair[1]).ok_or_else(|| "invalid hex character".to_string())?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

fn decode_hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

pub(crate) fn encode_hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(nibble_to_hex(b >> 4));
        out.push(nibble_to_hex(b & 0x0f));
    }
    out
}

fn nibble_to_hex(nibble: u8) -> char {
    match nibble {
        0..=9 => (b'0' + nibble) as char,
        10..=15 => (b'a' + (nibble - 10)) as char,
        _ => '0',
    }
}
