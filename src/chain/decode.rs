/// Raw transaction decoding
///
/// Extracts the transaction hash and sender address from a raw signed
/// payload without executing it. The hash is keccak256 of the raw envelope
/// bytes, which is the canonical transaction hash for every EIP-2718 type.

use alloy_consensus::{transaction::SignerRecoverable as _, TxEnvelope};
use alloy_eips::eip2718::Decodable2718 as _;
use alloy_primitives::{keccak256, Address, B256};

use super::ChainError;

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTx {
    pub hash: B256,
    pub sender: Address,
}

impl DecodedTx {
    pub fn hash_hex(&self) -> String {
        format!("{:#x}", self.hash)
    }

    /// Lowercased hex address, the form user rows are keyed on.
    pub fn sender_hex(&self) -> String {
        format!("{:#x}", self.sender)
    }
}

/// Decode a `0x`-prefixed raw signed transaction and recover its sender.
pub fn decode_raw_transaction(raw_tx: &str) -> Result<DecodedTx, ChainError> {
    let stripped = raw_tx
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::InvalidPayload("raw transaction must be 0x-prefixed".to_string()))?;
    if stripped.is_empty() {
        return Err(ChainError::InvalidPayload("raw transaction is empty".to_string()));
    }

    let bytes = hex::decode(stripped)
        .map_err(|e| ChainError::InvalidPayload(format!("invalid hex: {}", e)))?;

    let envelope = TxEnvelope::decode_2718(&mut bytes.as_slice())
        .map_err(|e| ChainError::InvalidPayload(format!("transaction decode failed: {}", e)))?;

    let sender = envelope
        .recover_signer()
        .map_err(|e| ChainError::InvalidPayload(format!("sender recovery failed: {}", e)))?;

    Ok(DecodedTx {
        hash: keccak256(&bytes),
        sender,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_consensus::{SignableTransaction, TxLegacy};
    use alloy_eips::eip2718::Encodable2718 as _;
    use alloy_primitives::{Signature, TxKind, U256};
    use k256::ecdsa::SigningKey;

    fn signed_raw_tx() -> (String, Address) {
        let signer = SigningKey::from_bytes(&[0x11u8; 32].into()).unwrap();

        let tx = TxLegacy {
            chain_id: Some(1),
            nonce: 0,
            gas_price: 1_000_000_000,
            gas_limit: 21_000,
            to: TxKind::Call(Address::ZERO),
            value: U256::from(1),
            input: Default::default(),
        };

        let sighash = tx.signature_hash();
        let (sig, recid) = signer.sign_prehash_recoverable(sighash.as_slice()).unwrap();
        let signature = Signature::new(
            U256::from_be_slice(&sig.r().to_bytes()),
            U256::from_be_slice(&sig.s().to_bytes()),
            recid.is_y_odd(),
        );

        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        let mut buf = Vec::new();
        envelope.encode_2718(&mut buf);

        let pubkey = signer.verifying_key().to_encoded_point(false);
        let hash = keccak256(&pubkey.as_bytes()[1..]);
        let expected_sender = Address::from_slice(&hash[12..]);

        (format!("0x{}", hex::encode(buf)), expected_sender)
    }

    #[test]
    fn test_decode_recovers_sender_and_hash() {
        let (raw, expected_sender) = signed_raw_tx();
        let decoded = decode_raw_transaction(&raw).unwrap();
        assert_eq!(decoded.sender, expected_sender);

        let bytes = hex::decode(raw.strip_prefix("0x").unwrap()).unwrap();
        assert_eq!(decoded.hash, keccak256(&bytes));
        assert!(decoded.hash_hex().starts_with("0x"));
        assert_eq!(decoded.sender_hex(), decoded.sender_hex().to_lowercase());
    }

    #[test]
    fn test_missing_prefix_rejected() {
        let err = decode_raw_transaction("f86b0185").unwrap_err();
        assert!(matches!(err, ChainError::InvalidPayload(_)));
    }

    #[test]
    fn test_empty_payload_rejected() {
        let err = decode_raw_transaction("0x").unwrap_err();
        assert!(matches!(err, ChainError::InvalidPayload(_)));
    }

    #[test]
    fn test_garbage_hex_rejected() {
        let err = decode_raw_transaction("0xzzzz").unwrap_err();
        assert!(matches!(err, ChainError::InvalidPayload(_)));
    }

    #[test]
    fn test_truncated_rlp_rejected() {
        let (raw, _) = signed_raw_tx();
        let truncated = &raw[..raw.len() - 8];
        let err = decode_raw_transaction(truncated).unwrap_err();
        assert!(matches!(err, ChainError::InvalidPayload(_)));
    }
}
