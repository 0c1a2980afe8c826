//! Mempool policy integration tests: fee floors, double spends,
//! replace-by-fee, block-connect sweeps, and events.

mod common;
use common::*;

use carbon_node::config::NetworkParams;
use carbon_node::consensus::types::TxOutput;
use carbon_node::NodeEvent;

#[test]
fn test_fee_floor_enforced() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let alice = Wallet::random(&params);
    let bob = Wallet::random(&params);

    let (coin, amount) = fund(&node, &alice);
    // Fee of 500 is under the 1000 satoshi minimum.
    let cheap = transfer(
        &alice,
        vec![coin],
        vec![TxOutput::spendable(amount - 500, bob.address.clone())],
    );
    let rejection = node.submit_transaction(cheap).unwrap_err();
    assert_eq!(rejection.code, "FEE_TOO_LOW");
}

#[test]
fn test_unknown_input_rejected() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let alice = Wallet::random(&params);

    let ghost = carbon_node::OutPoint {
        txid: [0xde; 32],
        index: 0,
    };
    let tx = transfer(
        &alice,
        vec![ghost],
        vec![TxOutput::spendable(1000, alice.address.clone())],
    );
    let rejection = node.submit_transaction(tx).unwrap_err();
    assert_eq!(rejection.code, "UTXO_NOT_FOUND");
}

#[test]
fn test_wrong_key_rejected() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let alice = Wallet::random(&params);
    let mallory = Wallet::random(&params);

    let (coin, amount) = fund(&node, &alice);
    // Mallory signs a spend of alice's coin with her own key.
    let theft = transfer(
        &mallory,
        vec![coin],
        vec![TxOutput::spendable(amount - 1000, mallory.address.clone())],
    );
    let rejection = node.submit_transaction(theft).unwrap_err();
    assert_eq!(rejection.code, "PUBKEY_ADDRESS_MISMATCH");
}

#[test]
fn test_double_spend_without_higher_fee_rejected() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let alice = Wallet::random(&params);
    let bob = Wallet::random(&params);

    let (coin, amount) = fund(&node, &alice);
    let first = transfer(
        &alice,
        vec![coin.clone()],
        vec![TxOutput::spendable(amount - 2000, bob.address.clone())],
    );
    node.submit_transaction(first).unwrap();

    // Same fee: underbids the replacement requirement.
    let second = transfer(
        &alice,
        vec![coin],
        vec![TxOutput::spendable(amount - 2000, alice.address.clone())],
    );
    let rejection = node.submit_transaction(second).unwrap_err();
    assert_eq!(rejection.code, "RBF_UNDERBID");
}

#[test]
fn test_replace_by_fee_evicts_original() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let alice = Wallet::random(&params);
    let bob = Wallet::random(&params);

    let (coin, amount) = fund(&node, &alice);
    let original = transfer(
        &alice,
        vec![coin.clone()],
        vec![TxOutput::spendable(amount - 1000, bob.address.clone())],
    );
    let original_id = node.submit_transaction(original).unwrap();

    // Pays 9000 more than the replaced set; comfortably over the
    // incremental relay floor.
    let replacement = transfer(
        &alice,
        vec![coin],
        vec![TxOutput::spendable(amount - 10_000, bob.address.clone())],
    );
    let replacement_id = node.submit_transaction(replacement).unwrap();

    assert!(!node.mempool_contains(&original_id));
    assert!(node.mempool_contains(&replacement_id));
    assert_eq!(node.mempool_info().transaction_count, 1);
}

#[test]
fn test_block_connect_sweeps_conflicting_pool_entry() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let alice = Wallet::random(&params);
    let bob = Wallet::random(&params);

    let (coin, amount) = fund(&node, &alice);

    // T1 sits in the pool spending O.
    let t1 = transfer(
        &alice,
        vec![coin.clone()],
        vec![TxOutput::spendable(amount - 1000, alice.address.clone())],
    );
    let t1_id = node.submit_transaction(t1).unwrap();
    assert!(node.mempool_contains(&t1_id));

    // A block arrives carrying T2, a different spend of O.
    let t2 = transfer(
        &alice,
        vec![coin],
        vec![TxOutput::spendable(amount - 2000, bob.address.clone())],
    );
    let block = mine_manual(
        &params,
        node.tip().hash,
        2,
        now() + 10,
        vec![t2.clone()],
        &alice.address,
        2000,
        3,
    );
    node.submit_block_object(block).unwrap();

    assert!(!node.mempool_contains(&t1_id));
    assert_eq!(node.balance(&bob.address), amount - 2000);
}

#[test]
fn test_chained_unconfirmed_transactions_mine_in_order() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let alice = Wallet::random(&params);
    let bob = Wallet::random(&params);

    let (coin, amount) = fund(&node, &alice);
    let parent = transfer(
        &alice,
        vec![coin],
        vec![TxOutput::spendable(amount - 1000, alice.address.clone())],
    );
    let parent_id = node.submit_transaction(parent).unwrap();

    // Child spends the parent's unconfirmed output.
    let child = transfer(
        &alice,
        vec![carbon_node::OutPoint {
            txid: parent_id,
            index: 0,
        }],
        vec![TxOutput::spendable(amount - 3000, bob.address.clone())],
    );
    let child_id = node.submit_transaction(child).unwrap();

    node.mine_block(&alice.address).unwrap().unwrap();
    assert!(!node.mempool_contains(&parent_id));
    assert!(!node.mempool_contains(&child_id));
    assert_eq!(node.balance(&bob.address), amount - 3000);
}

#[test]
fn test_events_track_admission_and_connection() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let alice = Wallet::random(&params);

    let mut events = node.subscribe();
    let (coin, amount) = fund(&node, &alice);

    // Funding emitted a BlockConnected
    assert!(matches!(
        events.try_recv().unwrap(),
        NodeEvent::BlockConnected { height: 1, .. }
    ));

    let tx = transfer(
        &alice,
        vec![coin],
        vec![TxOutput::spendable(amount - 1000, alice.address.clone())],
    );
    let txid = node.submit_transaction(tx).unwrap();
    assert_eq!(events.try_recv().unwrap(), NodeEvent::TxAdmitted { txid });

    node.mine_block(&alice.address).unwrap().unwrap();
    assert!(matches!(
        events.try_recv().unwrap(),
        NodeEvent::BlockConnected { height: 2, .. }
    ));
}

#[test]
fn test_mempool_info_reflects_pool() {
    let (_dir, node) = setup_node();
    let params = NetworkParams::regtest();
    let alice = Wallet::random(&params);

    let info = node.mempool_info();
    assert_eq!(info.transaction_count, 0);
    assert_eq!(info.min_fee, 1000);
    assert_eq!(info.min_fee_rate, 1);

    let (coin, amount) = fund(&node, &alice);
    let tx = transfer(
        &alice,
        vec![coin],
        vec![TxOutput::spendable(amount - 1000, alice.address.clone())],
    );
    node.submit_transaction(tx).unwrap();

    let info = node.mempool_info();
    assert_eq!(info.transaction_count, 1);
    assert!(info.total_bytes > 0);
}
