//! Core chain data model.
//!
//! Plain serde structs; no behaviour beyond hashing and small accessors.
//! The canonical byte encodings live in [`crate::consensus::serialization`].

use serde::{Deserialize, Serialize};

use crate::consensus::serialization;
use crate::crypto::hash256;

/// 256-bit hash value.
pub type Hash = [u8; 32];

/// Reference to one output of a prior transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash,
    pub index: u32,
}

impl OutPoint {
    /// The null outpoint carried by the coinbase dummy input.
    pub fn null() -> Self {
        OutPoint {
            txid: [0u8; 32],
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid == [0u8; 32] && self.index == u32::MAX
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", hex::encode(self.txid), self.index)
    }
}

/// CO2 lifecycle phase of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoinState {
    /// Ordinary value, freely transferable.
    Spendable,
    /// Locked to a certificate; spendable only into a compensation.
    Certified,
    /// Retired against a certificate; never spendable again.
    Compensated,
}

impl CoinState {
    pub fn to_u8(self) -> u8 {
        match self {
            CoinState::Spendable => 0,
            CoinState::Certified => 1,
            CoinState::Compensated => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(CoinState::Spendable),
            1 => Some(CoinState::Certified),
            2 => Some(CoinState::Compensated),
            _ => None,
        }
    }
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: u64,
    pub address: String,
    pub coin_state: CoinState,
    pub certificate_id: Option<String>,
}

impl TxOutput {
    pub fn spendable(amount: u64, address: impl Into<String>) -> Self {
        TxOutput {
            amount,
            address: address.into(),
            coin_state: CoinState::Spendable,
            certificate_id: None,
        }
    }

    pub fn certified(amount: u64, address: impl Into<String>, certificate_id: impl Into<String>) -> Self {
        TxOutput {
            amount,
            address: address.into(),
            coin_state: CoinState::Certified,
            certificate_id: Some(certificate_id.into()),
        }
    }

    pub fn compensated(
        amount: u64,
        address: impl Into<String>,
        certificate_id: impl Into<String>,
    ) -> Self {
        TxOutput {
            amount,
            address: address.into(),
            coin_state: CoinState::Compensated,
            certificate_id: Some(certificate_id.into()),
        }
    }

    /// Compensated outputs are retired and can never be spent.
    pub fn is_spendable(&self) -> bool {
        self.coin_state != CoinState::Compensated
    }
}

/// A transaction input spending a prior output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub prevout: OutPoint,
    pub signature: Vec<u8>,
    pub pubkey: Vec<u8>,
}

impl TxInput {
    pub fn unsigned(prevout: OutPoint) -> Self {
        TxInput {
            prevout,
            signature: Vec::new(),
            pubkey: Vec::new(),
        }
    }
}

/// Transaction kind tag. Per-kind validation rules live in
/// [`crate::consensus::transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxKind {
    Coinbase,
    Transfer,
    AssignCert,
    AssignCompensation,
    Burn,
}

impl TxKind {
    pub fn to_u8(self) -> u8 {
        match self {
            TxKind::Coinbase => 0,
            TxKind::Transfer => 1,
            TxKind::AssignCert => 2,
            TxKind::AssignCompensation => 3,
            TxKind::Burn => 4,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(TxKind::Coinbase),
            1 => Some(TxKind::Transfer),
            2 => Some(TxKind::AssignCert),
            3 => Some(TxKind::AssignCompensation),
            4 => Some(TxKind::Burn),
            _ => None,
        }
    }
}

/// Structured coinbase metadata, stored as canonical JSON in the
/// transaction metadata field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseTag {
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub kind: TxKind,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub timestamp: u32,
    /// Opaque canonical-JSON payload; kind-specific shape.
    pub metadata: Vec<u8>,
}

impl Transaction {
    /// Transaction id: double SHA-256 over the canonical serialization with
    /// every input's signature and pubkey cleared, so signing never changes
    /// the id.
    pub fn txid(&self) -> Hash {
        hash256(&serialization::serialize_tx_unsigned(self, true))
    }

    /// Signature digest: like [`Self::txid`] but the pubkeys stay in the
    /// preimage, so a signature commits to the key that claims it.
    pub fn sighash(&self) -> Hash {
        hash256(&serialization::serialize_tx_unsigned(self, false))
    }

    pub fn is_coinbase(&self) -> bool {
        self.kind == TxKind::Coinbase
    }

    /// Sum of output amounts, saturating to guard the overflow checks that
    /// follow in validation.
    pub fn total_output(&self) -> u64 {
        self.outputs
            .iter()
            .fold(0u64, |acc, o| acc.saturating_add(o.amount))
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        serialization::serialize_tx(self).len()
    }

    /// Parse the coinbase metadata tag, if this is a well-formed coinbase.
    pub fn coinbase_tag(&self) -> Option<CoinbaseTag> {
        if !self.is_coinbase() {
            return None;
        }
        serde_json::from_slice(&self.metadata).ok()
    }
}

/// Fixed 80-byte block header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Block id: double SHA-256 of the 80 serialized header bytes.
    pub fn hash(&self) -> Hash {
        hash256(&serialization::serialize_header(self))
    }
}

/// A block: header plus ordered transactions, first of which must be the
/// coinbase. Height is positional and lives in the chain index, not on the
/// wire; the coinbase metadata pins it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        serialization::serialize_block(self).len()
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }
}
