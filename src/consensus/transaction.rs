//! Context-free transaction validation (phase B) and signature checks.
//!
//! Phase B inspects a transaction in isolation: structure, amounts,
//! addresses, and the per-kind form. Anything that needs the UTXO index or
//! the certificate ledger belongs to phase C in
//! [`crate::consensus::block`].

use std::collections::HashSet;

use crate::config::NetworkParams;
use crate::consensus::constants::{MAX_INPUTS, MAX_OUTPUTS, MAX_TX_SIZE};
use crate::consensus::economic::check_money_range;
use crate::consensus::error::{ConsensusError, Result};
use crate::consensus::types::{CoinState, Transaction, TxKind};
use crate::crypto;
use crate::ledger::{check_certificate_id, CertificateIssuance};

/// Phase B: validate everything knowable without chain state.
pub fn check_transaction(params: &NetworkParams, tx: &Transaction) -> Result<()> {
    if tx.outputs.is_empty() {
        return Err(ConsensusError::NoOutputs);
    }
    if tx.inputs.is_empty() {
        return Err(ConsensusError::NoInputs);
    }
    if tx.inputs.len() > MAX_INPUTS || tx.outputs.len() > MAX_OUTPUTS {
        return Err(ConsensusError::Malformed("too many inputs or outputs".into()));
    }

    let size = tx.size();
    if size > MAX_TX_SIZE {
        return Err(ConsensusError::OversizeTx(size));
    }

    let mut total: u64 = 0;
    for output in &tx.outputs {
        if output.amount == 0 {
            return Err(ConsensusError::BadAmount);
        }
        total = total
            .checked_add(output.amount)
            .ok_or(ConsensusError::BadAmount)?;
        if !crypto::validate_address(&output.address, params.address_version) {
            return Err(ConsensusError::BadAddress(output.address.clone()));
        }
        if output.coin_state == CoinState::Certified && output.certificate_id.is_none() {
            return Err(ConsensusError::KindConstraint(
                "certified outputs require a certificate id".into(),
            ));
        }
        if let Some(id) = &output.certificate_id {
            check_certificate_id(id)?;
        }
    }
    check_money_range(total)?;

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(&input.prevout) {
            return Err(ConsensusError::DuplicateOutpoint);
        }
    }

    check_kind_form(params, tx)
}

/// Per-kind structural rules.
fn check_kind_form(params: &NetworkParams, tx: &Transaction) -> Result<()> {
    match tx.kind {
        TxKind::Coinbase => check_coinbase_form(tx),
        TxKind::Transfer => {
            check_signed_inputs(tx)?;
            require_plain_outputs(tx, "transfer")
        }
        TxKind::AssignCert => {
            check_signed_inputs(tx)?;
            check_assign_cert_form(tx)
        }
        TxKind::AssignCompensation => {
            check_signed_inputs(tx)?;
            check_compensation_form(tx)
        }
        TxKind::Burn => {
            check_signed_inputs(tx)?;
            check_burn_form(params, tx)
        }
    }
}

fn check_coinbase_form(tx: &Transaction) -> Result<()> {
    if tx.inputs.len() != 1 || !tx.inputs[0].prevout.is_null() {
        return Err(ConsensusError::KindConstraint(
            "coinbase requires exactly one null input".into(),
        ));
    }
    if tx.coinbase_tag().is_none() {
        return Err(ConsensusError::KindConstraint(
            "coinbase metadata must carry the block height".into(),
        ));
    }
    require_plain_outputs(tx, "coinbase")
}

/// Non-coinbase inputs must reference real outpoints and carry signature
/// material; the signatures themselves are verified in phase C against the
/// referenced UTXO addresses.
fn check_signed_inputs(tx: &Transaction) -> Result<()> {
    for (index, input) in tx.inputs.iter().enumerate() {
        if input.prevout.is_null() {
            return Err(ConsensusError::KindConstraint(
                "null outpoint outside coinbase".into(),
            ));
        }
        if input.signature.is_empty() || input.pubkey.is_empty() {
            return Err(ConsensusError::MissingSignature(index));
        }
    }
    Ok(())
}

fn require_plain_outputs(tx: &Transaction, kind: &str) -> Result<()> {
    for output in &tx.outputs {
        if output.coin_state != CoinState::Spendable || output.certificate_id.is_some() {
            return Err(ConsensusError::KindConstraint(format!(
                "{} outputs must be plain spendable value",
                kind
            )));
        }
    }
    Ok(())
}

fn check_assign_cert_form(tx: &Transaction) -> Result<()> {
    let issuance = CertificateIssuance::from_tx(tx)?;
    check_certificate_id(&issuance.certificate_id)?;
    if issuance.total_amount == 0 {
        return Err(ConsensusError::CertMetadataInvalid(
            "certificate total_amount must be positive".into(),
        ));
    }
    check_money_range(issuance.total_amount)?;
    if issuance.project_id.is_empty() {
        return Err(ConsensusError::CertMetadataInvalid(
            "certificate requires a project id".into(),
        ));
    }

    let mut certified_total: u64 = 0;
    for output in &tx.outputs {
        match output.coin_state {
            CoinState::Certified => {
                if output.certificate_id.as_deref() != Some(issuance.certificate_id.as_str()) {
                    return Err(ConsensusError::KindConstraint(
                        "certified output bound to a different certificate id".into(),
                    ));
                }
                certified_total = certified_total.saturating_add(output.amount);
            }
            CoinState::Spendable => {
                // Change output
                if output.certificate_id.is_some() {
                    return Err(ConsensusError::KindConstraint(
                        "spendable change must not carry a certificate id".into(),
                    ));
                }
            }
            CoinState::Compensated => {
                return Err(ConsensusError::KindConstraint(
                    "certificate assignment cannot create compensated outputs".into(),
                ));
            }
        }
    }
    if certified_total == 0 {
        return Err(ConsensusError::KindConstraint(
            "certificate assignment requires at least one certified output".into(),
        ));
    }
    if certified_total > issuance.total_amount {
        return Err(ConsensusError::CertOverassigned(issuance.certificate_id));
    }
    Ok(())
}

fn check_compensation_form(tx: &Transaction) -> Result<()> {
    let mut id: Option<&str> = None;
    for output in &tx.outputs {
        if output.coin_state != CoinState::Compensated {
            return Err(ConsensusError::KindConstraint(
                "compensation produces only compensated outputs".into(),
            ));
        }
        let Some(out_id) = output.certificate_id.as_deref() else {
            return Err(ConsensusError::KindConstraint(
                "compensated output requires a certificate id".into(),
            ));
        };
        match id {
            None => id = Some(out_id),
            Some(existing) if existing != out_id => {
                return Err(ConsensusError::KindConstraint(
                    "compensation must target a single certificate".into(),
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_burn_form(params: &NetworkParams, tx: &Transaction) -> Result<()> {
    let burn_address = params.burn_address();
    for output in &tx.outputs {
        if output.address != burn_address {
            return Err(ConsensusError::KindConstraint(
                "burn outputs must pay the canonical burn address".into(),
            ));
        }
        if output.coin_state != CoinState::Compensated {
            return Err(ConsensusError::KindConstraint(
                "burn outputs are retired on creation".into(),
            ));
        }
    }
    Ok(())
}

/// Verify every input signature against the sighash and the resolved UTXO
/// addresses (in input order). Phase C calls this once per transaction.
pub fn verify_input_signatures(
    params: &NetworkParams,
    tx: &Transaction,
    utxo_addresses: &[String],
) -> Result<()> {
    debug_assert_eq!(tx.inputs.len(), utxo_addresses.len());
    let digest = tx.sighash();
    for (index, (input, address)) in tx.inputs.iter().zip(utxo_addresses).enumerate() {
        if crypto::address_from_pubkey(&input.pubkey, params.address_version) != *address {
            return Err(ConsensusError::PubkeyMismatch(index));
        }
        if !crypto::verify_signature(&input.pubkey, &input.signature, &digest) {
            return Err(ConsensusError::InvalidSignature(index));
        }
    }
    Ok(())
}
