//! Certificate lifecycle integration tests: issuance, compensation
//! accounting, uniqueness, coin-state enforcement, and burns.

mod common;
use common::*;

use carbon_node::config::NetworkParams;
use carbon_node::consensus::types::TxOutput;
use carbon_node::{CoinState, OutPoint};

const T: u64 = 1000; // one tonne in satoshi (kg)

#[test]
fn test_issuance_creates_certificate_and_project() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let issuer = Wallet::random(&params);

    let (coin, amount) = fund(&node, &issuer);
    let tx = assign_cert(
        &issuer,
        coin,
        amount,
        "CERT-2025-0001",
        2_000 * T,
        1_000 * T,
        1000,
    );
    node.submit_transaction(tx).unwrap();
    node.mine_block(&issuer.address).unwrap().unwrap();

    let cert = node.certificate("CERT-2025-0001").unwrap();
    assert_eq!(cert.total_amount, 2_000 * T);
    assert_eq!(cert.assigned_amount, 1_000 * T);
    assert_eq!(cert.compensated_amount, 0);
    assert_eq!(cert.issuer_address, issuer.address);

    let project = node.project(&cert.project_id).unwrap();
    assert_eq!(project.created_height, 2);
}

#[test]
fn test_duplicate_certificate_id_in_mempool_rejected() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let issuer = Wallet::random(&params);

    let (coin_a, amount_a) = fund(&node, &issuer);
    let (coin_b, amount_b) = fund(&node, &issuer);

    let first = assign_cert(&issuer, coin_a, amount_a, "CERT-2025-0002", 1_000 * T, 500 * T, 1000);
    let second = assign_cert(&issuer, coin_b, amount_b, "CERT-2025-0002", 1_000 * T, 400 * T, 1000);

    node.submit_transaction(first).unwrap();
    let rejection = node.submit_transaction(second).unwrap_err();
    assert_eq!(rejection.code, "CERT_ID_REUSED");
}

#[test]
fn test_duplicate_certificate_id_in_block_rejected() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let issuer = Wallet::random(&params);

    let (coin_a, amount_a) = fund(&node, &issuer);
    let (coin_b, amount_b) = fund(&node, &issuer);

    let first = assign_cert(&issuer, coin_a, amount_a, "CERT-2025-0003", 1_000 * T, 500 * T, 1000);
    let second = assign_cert(&issuer, coin_b, amount_b, "CERT-2025-0003", 1_000 * T, 400 * T, 1000);
    let fees = 2000;

    let block = mine_manual(
        &params,
        node.tip().hash,
        3,
        now() + 10,
        vec![first, second],
        &issuer.address,
        fees,
        0,
    );
    let rejection = node.submit_block_object(block).unwrap_err();
    assert_eq!(rejection.code, "CERT_ID_REUSED");
    assert_eq!(node.tip().height, 2);
    assert!(node.certificate("CERT-2025-0003").is_none());
}

#[test]
fn test_compensation_accumulates_and_respects_headroom() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let issuer = Wallet::random(&params);

    let (coin, amount) = fund(&node, &issuer);
    // Three certified tranches sized one relay fee above the compensation
    // they will carry; assigned total 1_103 t-ish.
    let cert_id = "CERT-2025-0004";
    let issuance = {
        let tranches = [400 * T + 1000, 400 * T + 1000, 300 * T + 1000];
        let certified_total: u64 = tranches.iter().sum();
        let mut tx = assign_cert(&issuer, coin, amount, cert_id, 2_000 * T, certified_total, 1000);
        // Split the single certified output into the three tranches.
        let change = tx.outputs.pop();
        tx.outputs = tranches
            .iter()
            .map(|&t| TxOutput::certified(t, issuer.address.clone(), cert_id))
            .chain(change)
            .collect();
        issuer_resign(&issuer, tx)
    };
    let issuance_id = node.submit_transaction(issuance).unwrap();
    node.mine_block(&issuer.address).unwrap().unwrap();
    let issuance_txid = issuance_id;

    // Compensate 400 t, 400 t, 300 t in consecutive blocks.
    for (index, comp_amount) in [400 * T, 400 * T, 300 * T].into_iter().enumerate() {
        let certified = OutPoint {
            txid: issuance_txid,
            index: index as u32,
        };
        let tx = compensate(&issuer, vec![certified], cert_id, comp_amount);
        node.submit_transaction(tx).unwrap();
        node.mine_block(&issuer.address).unwrap().unwrap();
    }
    let cert = node.certificate(cert_id).unwrap();
    assert_eq!(cert.compensated_amount, 1_100 * T);
    assert!(cert.compensated_amount <= cert.assigned_amount);

    // A certificate-tagged burn beyond the remaining headroom is refused.
    let (burn_coin, _) = fund(&node, &issuer);
    let over = burn(&params, &issuer, burn_coin, 100 * T, Some(cert_id));
    let rejection = node.submit_transaction(over).unwrap_err();
    assert_eq!(rejection.code, "CERT_OVERCOMPENSATED");
}

#[test]
fn test_compensated_outputs_are_unspendable() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let issuer = Wallet::random(&params);

    let (coin, amount) = fund(&node, &issuer);
    let cert_id = "CERT-2025-0005";
    let tx = assign_cert(&issuer, coin, amount, cert_id, 1_000 * T, 500 * T, 1000);
    let cert_txid = node.submit_transaction(tx).unwrap();
    node.mine_block(&issuer.address).unwrap().unwrap();

    let certified = OutPoint {
        txid: cert_txid,
        index: 0,
    };
    let comp = compensate(&issuer, vec![certified], cert_id, 400 * T);
    let comp_txid = node.submit_transaction(comp).unwrap();
    node.mine_block(&issuer.address).unwrap().unwrap();

    // The compensated output exists but refuses to be an input.
    let retired = OutPoint {
        txid: comp_txid,
        index: 0,
    };
    let entry = node.get_utxo(&retired).unwrap();
    assert_eq!(entry.output.coin_state, CoinState::Compensated);

    let steal = transfer(
        &issuer,
        vec![retired],
        vec![TxOutput::spendable(100 * T, issuer.address.clone())],
    );
    let rejection = node.submit_transaction(steal).unwrap_err();
    assert_eq!(rejection.code, "COIN_STATE_FORBIDDEN");
}

#[test]
fn test_certified_outputs_spend_only_into_compensation() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let issuer = Wallet::random(&params);

    let (coin, amount) = fund(&node, &issuer);
    let cert_id = "CERT-2025-0006";
    let tx = assign_cert(&issuer, coin, amount, cert_id, 1_000 * T, 500 * T, 1000);
    let cert_txid = node.submit_transaction(tx).unwrap();
    node.mine_block(&issuer.address).unwrap().unwrap();

    let certified = OutPoint {
        txid: cert_txid,
        index: 0,
    };
    let launder = transfer(
        &issuer,
        vec![certified.clone()],
        vec![TxOutput::spendable(400 * T, issuer.address.clone())],
    );
    let rejection = node.submit_transaction(launder).unwrap_err();
    assert_eq!(rejection.code, "COIN_STATE_FORBIDDEN");

    // The same outpoint retires cleanly.
    let comp = compensate(&issuer, vec![certified], cert_id, 400 * T);
    node.submit_transaction(comp).unwrap();
}

#[test]
fn test_plain_burn_destroys_supply() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let holder = Wallet::random(&params);

    let (coin, amount) = fund(&node, &holder);
    let tx = burn(&params, &holder, coin, amount - 1000, None);
    node.submit_transaction(tx).unwrap();
    node.mine_block(&holder.address).unwrap().unwrap();

    // The funding coinbase was destroyed; only the new coinbase (subsidy
    // plus the burn's fee) remains spendable, and the burn address holds
    // nothing spendable.
    assert_eq!(node.balance(&holder.address), 50 * 100_000_000 + 1000);
    assert_eq!(node.balance(&params.burn_address()), 0);
}

/// Re-sign a transaction whose outputs were edited after building.
fn issuer_resign(wallet: &Wallet, mut tx: carbon_node::Transaction) -> carbon_node::Transaction {
    wallet.sign(&mut tx);
    tx
}
