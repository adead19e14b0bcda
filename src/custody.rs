//! Bootstrap/teardown transaction builder for the custody contract.
//!
//! Produces the on-chain calldata that funds (deposit) or drains (withdraw)
//! the custody contract backing a channel, independent of whether a live
//! session exists. Both builders are pure: no network calls, no mutable
//! state, and amounts are taken as opaque smallest-unit integer strings
//! that are validated but never adjusted.
//!
//! Withdrawal does not verify that the off-chain channel has been closed;
//! that is the caller's obligation.

use serde::Serialize;
use sha3::{Digest, Keccak256};

use crate::error::BuilderError;
use crate::wallet::{decode_hex_prefixed, encode_hex_lower, normalize_wallet_address};

const APPROVE_SIGNATURE: &str = "approve(address,uint256)";
const DEPOSIT_SIGNATURE: &str = "deposit(address,uint256)";
const WITHDRAW_SIGNATURE: &str = "withdraw(address,uint256)";

/// A settlement chain on which the custody contract is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementChain {
    pub chain_id: u64,
    pub name: &'static str,
    /// Custody contract address (same CREATE2 address on every chain).
    pub custody: &'static str,
    /// Default settlement token (native USDC).
    pub default_token: &'static str,
}

/// The fixed set of supported settlement chains.
pub const SETTLEMENT_CHAINS: &[SettlementChain] = &[
    SettlementChain {
        chain_id: 137,
        name: "Polygon",
        custody: "0x6df29c806d7f1dcac0acb55106cf4c7bf481dd12",
        default_token: "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359",
    },
    SettlementChain {
        chain_id: 42220,
        name: "Celo",
        custody: "0x6df29c806d7f1dcac0acb55106cf4c7bf481dd12",
        default_token: "0xceba9300f2b948710d2653dd7b07f33a8b32118c",
    },
    SettlementChain {
        chain_id: 8453,
        name: "Base",
        custody: "0x6df29c806d7f1dcac0acb55106cf4c7bf481dd12",
        default_token: "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
    },
];

/// Look up a settlement chain by chain id.
pub fn settlement_chain(chain_id: u64) -> Option<&'static SettlementChain> {
    SETTLEMENT_CHAINS.iter().find(|c| c.chain_id == chain_id)
}

/// One calldata operation for the user to sign, tagged with a step index
/// and a human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionStep {
    /// 1-based position within the flow.
    pub step: u32,
    pub description: String,
    /// Target contract address.
    pub to: String,
    /// 0x-prefixed ABI calldata.
    pub data: String,
    /// Native value to attach; always "0" for these flows.
    pub value: String,
}

/// Build the two-step funding flow: unconditional-maximum allowance approval
/// on the settlement token, then a deposit of the exact amount into custody.
pub fn build_deposit(
    chain_id: u64,
    amount: &str,
    token_address: Option<&str>,
) -> Result<Vec<TransactionStep>, BuilderError> {
    let chain = supported_chain(chain_id)?;
    let token = resolve_token(chain, token_address)?;
    let amount_word = encode_amount(amount)?;

    let approve = TransactionStep {
        step: 1,
        description: format!(
            "Approve the custody contract to spend the settlement token on {}",
            chain.name
        ),
        to: token.clone(),
        data: encode_call(APPROVE_SIGNATURE, &[address_word(chain.custody)?, MAX_UINT256]),
        value: "0".to_string(),
    };
    let deposit = TransactionStep {
        step: 2,
        description: format!(
            "Deposit {} smallest units into the custody contract on {}",
            amount.trim(),
            chain.name
        ),
        to: chain.custody.to_string(),
        data: encode_call(DEPOSIT_SIGNATURE, &[address_word(&token)?, amount_word]),
        value: "0".to_string(),
    };
    Ok(vec![approve, deposit])
}

/// Build the single-step withdrawal that drains the custody contract.
pub fn build_withdraw(
    chain_id: u64,
    amount: &str,
    token_address: Option<&str>,
) -> Result<TransactionStep, BuilderError> {
    let chain = supported_chain(chain_id)?;
    let token = resolve_token(chain, token_address)?;
    let amount_word = encode_amount(amount)?;

    Ok(TransactionStep {
        step: 1,
        description: format!(
            "Withdraw {} smallest units from the custody contract on {}",
            amount.trim(),
            chain.name
        ),
        to: chain.custody.to_string(),
        data: encode_call(WITHDRAW_SIGNATURE, &[address_word(&token)?, amount_word]),
        value: "0".to_string(),
    })
}

fn supported_chain(chain_id: u64) -> Result<&'static SettlementChain, BuilderError> {
    settlement_chain(chain_id).ok_or(BuilderError::UnsupportedChain { chain_id })
}

fn resolve_token(
    chain: &SettlementChain,
    token_address: Option<&str>,
) -> Result<String, BuilderError> {
    match token_address {
        Some(raw) => {
            normalize_wallet_address(raw).ok_or_else(|| BuilderError::InvalidTokenAddress {
                value: raw.to_string(),
            })
        }
        None => Ok(chain.default_token.to_string()),
    }
}

const MAX_UINT256: [u8; 32] = [0xff; 32];

/// Encode a decimal smallest-unit integer string into a 32-byte word.
fn encode_amount(amount: &str) -> Result<[u8; 32], BuilderError> {
    let trimmed = amount.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BuilderError::InvalidAmount {
            value: amount.to_string(),
            reason: "must be a decimal integer in the token's smallest unit".to_string(),
        });
    }
    let parsed: u128 = trimmed
        .parse()
        .map_err(|_| BuilderError::InvalidAmount {
            value: amount.to_string(),
            reason: "exceeds the supported amount range".to_string(),
        })?;

    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&parsed.to_be_bytes());
    Ok(word)
}

/// Encode a 0x-prefixed address into a left-padded 32-byte word.
fn address_word(address: &str) -> Result<[u8; 32], BuilderError> {
    let normalized =
        normalize_wallet_address(address).ok_or_else(|| BuilderError::InvalidTokenAddress {
            value: address.to_string(),
        })?;
    let bytes =
        decode_hex_prefixed(&normalized).map_err(|_| BuilderError::InvalidTokenAddress {
            value: address.to_string(),
        })?;
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

/// Selector + arguments, hex-encoded. The selector is the first four bytes
/// of the Keccak-256 of the canonical function signature.
fn encode_call(signature: &str, words: &[[u8; 32]]) -> String {
    let mut hasher = Keccak256::new();
    hasher.update(signature.as_bytes());
    let digest = hasher.finalize();

    let mut data = Vec::with_capacity(4 + words.len() * 32);
    data.extend_from_slice(&digest[..4]);
    for word in words {
        data.extend_from_slice(word);
    }
    format!("0x{}", encode_hex_lower(&data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const POLYGON: u64 = 137;

    #[test]
    fn deposit_yields_approve_then_deposit() {
        let steps = build_deposit(POLYGON, "1000000", None).expect("build");
        assert_eq!(steps.len(), 2);

        assert_eq!(steps[0].step, 1);
        assert!(steps[0].description.contains("Approve"));
        assert_eq!(steps[0].to, "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359");

        assert_eq!(steps[1].step, 2);
        assert!(steps[1].description.contains("Deposit"));
        assert_eq!(steps[1].to, "0x6df29c806d7f1dcac0acb55106cf4c7bf481dd12");

        assert!(!steps[0].data.is_empty());
        assert!(!steps[1].data.is_empty());
        assert_ne!(steps[0].data, steps[1].data);
    }

    #[test]
    fn approve_uses_the_canonical_erc20_selector_and_max_allowance() {
        let steps = build_deposit(POLYGON, "1", None).expect("build");
        // keccak256("approve(address,uint256)")[..4] == 095ea7b3
        assert!(steps[0].data.starts_with("0x095ea7b3"));
        assert!(steps[0].data.ends_with(&"f".repeat(64)));
    }

    #[test]
    fn deposit_encodes_exact_amount_word() {
        let steps = build_deposit(POLYGON, "1000000", None).expect("build");
        // 1_000_000 == 0xf4240, right-aligned in the second 32-byte word.
        assert!(steps[1].data.ends_with("f4240"));
        // selector + two words
        assert_eq!(steps[1].data.len(), 2 + 8 + 64 * 2);
    }

    #[test]
    fn withdraw_is_a_single_custody_step() {
        let step = build_withdraw(POLYGON, "42", None).expect("build");
        assert_eq!(step.step, 1);
        assert_eq!(step.to, "0x6df29c806d7f1dcac0acb55106cf4c7bf481dd12");
        assert!(step.description.contains("Withdraw"));
        assert_ne!(
            step.data[..10],
            build_deposit(POLYGON, "42", None).unwrap()[1].data[..10],
            "deposit and withdraw selectors must differ"
        );
    }

    #[test]
    fn unsupported_chain_is_a_structured_failure() {
        let err = build_deposit(1, "1000000", None).unwrap_err();
        match err {
            BuilderError::UnsupportedChain { chain_id } => assert_eq!(chain_id, 1),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(build_withdraw(999, "1", None).is_err());
    }

    #[test]
    fn explicit_token_address_overrides_the_default() {
        let token = "0x00000000000000000000000000000000000000aa";
        let steps = build_deposit(POLYGON, "5", Some(token)).expect("build");
        assert_eq!(steps[0].to, token);
    }

    #[test]
    fn invalid_token_address_is_rejected() {
        let err = build_deposit(POLYGON, "5", Some("0x123")).unwrap_err();
        assert!(matches!(err, BuilderError::InvalidTokenAddress { .. }));
    }

    #[test]
    fn non_integer_amounts_are_rejected() {
        for bad in ["", "1.5", "-3", "1e6", "10 000"] {
            let err = build_deposit(POLYGON, bad, None).unwrap_err();
            assert!(
                matches!(err, BuilderError::InvalidAmount { .. }),
                "expected InvalidAmount for '{bad}'"
            );
        }
    }

    #[test]
    fn all_settlement_chains_resolve() {
        for chain in SETTLEMENT_CHAINS {
            assert!(settlement_chain(chain.chain_id).is_some());
            assert!(build_deposit(chain.chain_id, "1", None).is_ok());
        }
        assert!(settlement_chain(1).is_none());
    }
}
