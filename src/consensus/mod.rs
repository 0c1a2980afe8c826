//! The consensus kernel: data model, canonical encodings, validation
//! phases, proof of work, and economic rules.
//!
//! Everything in this module is deterministic and free of I/O. State lives
//! in [`crate::utxo`] and [`crate::ledger`]; the chain writer in
//! [`crate::chain`] decides when the transitions computed here are applied.

pub mod block;
pub mod constants;
pub mod economic;
pub mod error;
pub mod merkle;
pub mod pow;
pub mod serialization;
pub mod transaction;
pub mod types;

pub use error::{ConsensusError, ErrorKind, Rejection, Result};
pub use types::{
    Block, BlockHeader, CoinState, CoinbaseTag, Hash, OutPoint, Transaction, TxInput, TxKind,
    TxOutput,
};
