//! Legacy (EIP-155) transaction encoding and signing.

use alloy_core::{
    primitives::{Address, B256, Bytes, U256, keccak256},
    rlp::{EMPTY_STRING_CODE, Encodable, Header},
};
use k256::ecdsa::SigningKey;

use crate::DeployError;

/// An unsigned legacy transaction. `to == None` creates a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub chain_id: u64,
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: B256,
}

impl LegacyTransaction {
    fn to_length(&self) -> usize {
        self.to.as_ref().map_or(1, Encodable::length)
    }

    fn fields_length(&self) -> usize {
        self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + self.to_length()
            + self.value.length()
            + self.input.length()
    }

    fn encode_fields(&self, out: &mut Vec<u8>) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        match &self.to {
            Some(to) => to.encode(out),
            None => out.push(EMPTY_STRING_CODE),
        }
        self.value.encode(out);
        self.input.encode(out);
    }

    /// Hash signed by the sender: `keccak(rlp([fields..., chain_id, 0, 0]))`.
    pub fn signing_hash(&self) -> B256 {
        let payload_length = self.fields_length() + self.chain_id.length() + 2;

        let mut out = Vec::with_capacity(payload_length + 4);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.encode_fields(&mut out);
        self.chain_id.encode(&mut out);
        0u8.encode(&mut out);
        0u8.encode(&mut out);

        keccak256(&out)
    }

    /// Sign with `key` and produce the raw transaction.
    pub fn sign(&self, key: &SigningKey) -> Result<SignedTransaction, DeployError> {
        let hash = self.signing_hash();
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| DeployError::Configuration(format!("failed to sign transaction: {e}")))?;

        let bytes = signature.to_bytes();
        let r = U256::from_be_slice(&bytes[..32]);
        let s = U256::from_be_slice(&bytes[32..]);
        let v = self.chain_id * 2 + 35 + u64::from(recovery_id.to_byte());

        let payload_length = self.fields_length() + v.length() + r.length() + s.length();
        let mut out = Vec::with_capacity(payload_length + 4);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.encode_fields(&mut out);
        v.encode(&mut out);
        r.encode(&mut out);
        s.encode(&mut out);

        Ok(SignedTransaction {
            hash: keccak256(&out),
            raw: out.into(),
        })
    }
}
