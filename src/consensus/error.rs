//! Error taxonomy for consensus validation.
//!
//! Every rejection carries a stable machine-readable code, surfaced to
//! submitters and event listeners as a [`Rejection`]. Codes never change
//! across versions; messages may.

use serde::Serialize;
use thiserror::Error;

/// Broad classification of a consensus error, matching the propagation
/// policy: `Malformed`/`Invalid*`/`Conflict` are recovered locally,
/// `UnknownParent` is a pending state, `IntegrityFault` halts the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Malformed,
    InvalidHeader,
    InvalidTx,
    InvalidBlock,
    Conflict,
    UnknownParent,
    IntegrityFault,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    // Malformed
    #[error("malformed encoding: {0}")]
    Malformed(String),

    // InvalidHeader
    #[error("proof of work does not meet target")]
    PowInsufficient,
    #[error("difficulty bits out of range")]
    BadBits,
    #[error("difficulty bits do not match expected retarget value")]
    UnexpectedBits,
    #[error("header timestamp out of range: {0}")]
    BadTimestamp(String),
    #[error("unrecognised block version {0}")]
    BadVersion(u32),

    // InvalidTx
    #[error("transaction has no inputs")]
    NoInputs,
    #[error("transaction has no outputs")]
    NoOutputs,
    #[error("output amount is zero or exceeds maximum money")]
    BadAmount,
    #[error("transaction too large: {0} bytes")]
    OversizeTx(usize),
    #[error("duplicate outpoint within transaction inputs")]
    DuplicateOutpoint,
    #[error("invalid address: {0}")]
    BadAddress(String),
    #[error("transaction kind constraint violated: {0}")]
    KindConstraint(String),
    #[error("missing signature on input {0}")]
    MissingSignature(usize),
    #[error("invalid signature on input {0}")]
    InvalidSignature(usize),
    #[error("public key does not match UTXO address on input {0}")]
    PubkeyMismatch(usize),
    #[error("input references unknown UTXO {0}")]
    UnknownUtxo(String),
    #[error("coin state forbids this spend")]
    CoinStateForbidden,
    #[error("input value below output value")]
    InsufficientInputs,
    #[error("certificate id malformed: {0}")]
    CertIdMalformed(String),
    #[error("certificate metadata invalid: {0}")]
    CertMetadataInvalid(String),
    #[error("unknown certificate {0}")]
    CertUnknown(String),
    #[error("assignment exceeds certificate total for {0}")]
    CertOverassigned(String),
    #[error("compensation exceeds assigned amount for {0}")]
    CertOvercompensated(String),

    // InvalidBlock
    #[error("block too large: {0} bytes")]
    OversizeBlock(usize),
    #[error("too many transactions in block: {0}")]
    TooManyTxs(usize),
    #[error("first transaction is not a coinbase")]
    NoCoinbase,
    #[error("block contains more than one coinbase")]
    DuplicateCoinbase,
    #[error("duplicate txid within block")]
    DuplicateTxid,
    #[error("merkle root does not match transactions")]
    MerkleMismatch,
    #[error("coinbase height {got} does not match block height {expected}")]
    CoinbaseHeightMismatch { got: u32, expected: u32 },
    #[error("coinbase overpays: {got} > {allowed}")]
    CoinbaseOverpay { got: u64, allowed: u64 },

    // Conflict
    #[error("double spend of {0}")]
    DoubleSpend(String),
    #[error("certificate id already used: {0}")]
    CertIdReused(String),
    #[error("replacement does not pay enough to evict conflicts")]
    RbfUnderbid,
    #[error("fee below relay minimum")]
    FeeTooLow,
    #[error("mempool full")]
    MempoolFull,
    #[error("transaction already known")]
    AlreadyKnown,

    // UnknownParent
    #[error("unknown parent block {0}")]
    UnknownParent(String),

    // IntegrityFault
    #[error("storage integrity fault: {0}")]
    IntegrityFault(String),
}

impl ConsensusError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        use ConsensusError::*;
        match self {
            Malformed(_) => "MALFORMED",
            PowInsufficient => "POW_INSUFFICIENT",
            BadBits => "BAD_BITS",
            UnexpectedBits => "UNEXPECTED_BITS",
            BadTimestamp(_) => "BAD_TIMESTAMP",
            BadVersion(_) => "BAD_VERSION",
            NoInputs => "NO_INPUTS",
            NoOutputs => "NO_OUTPUTS",
            BadAmount => "INVALID_AMOUNT",
            OversizeTx(_) => "OVERSIZE_TX",
            DuplicateOutpoint => "DUPLICATE_OUTPOINT",
            BadAddress(_) => "INVALID_ADDRESS",
            KindConstraint(_) => "KIND_CONSTRAINT",
            MissingSignature(_) => "MISSING_SIGNATURE",
            InvalidSignature(_) => "INVALID_SIGNATURE",
            PubkeyMismatch(_) => "PUBKEY_ADDRESS_MISMATCH",
            UnknownUtxo(_) => "UTXO_NOT_FOUND",
            CoinStateForbidden => "COIN_STATE_FORBIDDEN",
            InsufficientInputs => "INSUFFICIENT_FUNDS",
            CertIdMalformed(_) => "CERT_ID_MALFORMED",
            CertMetadataInvalid(_) => "CERT_METADATA_INVALID",
            CertUnknown(_) => "CERT_UNKNOWN",
            CertOverassigned(_) => "CERT_OVERASSIGNED",
            CertOvercompensated(_) => "CERT_OVERCOMPENSATED",
            OversizeBlock(_) => "OVERSIZE_BLOCK",
            TooManyTxs(_) => "TOO_MANY_TXS",
            NoCoinbase => "NO_COINBASE",
            DuplicateCoinbase => "DUPLICATE_COINBASE",
            DuplicateTxid => "DUPLICATE_TXID",
            MerkleMismatch => "MERKLE_MISMATCH",
            CoinbaseHeightMismatch { .. } => "COINBASE_HEIGHT_MISMATCH",
            CoinbaseOverpay { .. } => "COINBASE_OVERPAY",
            DoubleSpend(_) => "DOUBLE_SPEND",
            CertIdReused(_) => "CERT_ID_REUSED",
            RbfUnderbid => "RBF_UNDERBID",
            FeeTooLow => "FEE_TOO_LOW",
            MempoolFull => "MEMPOOL_FULL",
            AlreadyKnown => "ALREADY_KNOWN",
            UnknownParent(_) => "UNKNOWN_PARENT",
            IntegrityFault(_) => "INTEGRITY_FAULT",
        }
    }

    /// Which class of the error taxonomy this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use ConsensusError::*;
        match self {
            Malformed(_) => ErrorKind::Malformed,
            PowInsufficient | BadBits | UnexpectedBits | BadTimestamp(_) | BadVersion(_) => {
                ErrorKind::InvalidHeader
            }
            NoInputs | NoOutputs | BadAmount | OversizeTx(_) | DuplicateOutpoint
            | BadAddress(_) | KindConstraint(_) | MissingSignature(_) | InvalidSignature(_)
            | PubkeyMismatch(_) | UnknownUtxo(_) | CoinStateForbidden | InsufficientInputs
            | CertIdMalformed(_) | CertMetadataInvalid(_) | CertUnknown(_)
            | CertOverassigned(_) | CertOvercompensated(_) => ErrorKind::InvalidTx,
            OversizeBlock(_) | TooManyTxs(_) | NoCoinbase | DuplicateCoinbase | DuplicateTxid
            | MerkleMismatch | CoinbaseHeightMismatch { .. } | CoinbaseOverpay { .. } => {
                ErrorKind::InvalidBlock
            }
            DoubleSpend(_) | CertIdReused(_) | RbfUnderbid | FeeTooLow | MempoolFull
            | AlreadyKnown => ErrorKind::Conflict,
            UnknownParent(_) => ErrorKind::UnknownParent,
            IntegrityFault(_) => ErrorKind::IntegrityFault,
        }
    }
}

/// Structured rejection returned to submitters and event listeners.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Rejection {
    pub code: &'static str,
    pub message: String,
}

impl From<&ConsensusError> for Rejection {
    fn from(err: &ConsensusError) -> Self {
        Rejection {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<ConsensusError> for Rejection {
    fn from(err: ConsensusError) -> Self {
        Rejection::from(&err)
    }
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
