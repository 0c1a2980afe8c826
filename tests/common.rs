//! Shared helpers for the integration suites: wallets, transaction
//! builders, and node setup on a regtest chain.

#![allow(dead_code)]

use std::collections::BTreeMap;

use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use tempfile::TempDir;

use carbon_node::config::{NetworkParams, NodeConfig};
use carbon_node::consensus::types::{
    OutPoint, Transaction, TxInput, TxKind, TxOutput,
};
use carbon_node::crypto;
use carbon_node::ledger::CertificateIssuance;
use carbon_node::Node;

/// A signing identity for tests.
pub struct Wallet {
    secret: SecretKey,
    pub pubkey: PublicKey,
    pub address: String,
}

impl Wallet {
    pub fn random(params: &NetworkParams) -> Self {
        let secp = Secp256k1::new();
        let (secret, pubkey) = secp.generate_keypair(&mut rand::thread_rng());
        let address = crypto::address_from_pubkey(&pubkey.serialize(), params.address_version);
        Wallet {
            secret,
            pubkey,
            address,
        }
    }

    /// Sign every input of a transaction with this key. Pubkeys must be in
    /// place before the digest is taken, since the sighash commits to them.
    pub fn sign(&self, tx: &mut Transaction) {
        for input in &mut tx.inputs {
            input.pubkey = self.pubkey.serialize().to_vec();
        }
        let digest = tx.sighash();
        let secp = Secp256k1::new();
        let msg = Message::from_digest(digest);
        let signature = secp.sign_ecdsa(&msg, &self.secret);
        for input in &mut tx.inputs {
            input.signature = signature.serialize_compact().to_vec();
        }
    }
}

/// Open a fresh regtest node in a temp directory.
pub fn setup_node() -> (TempDir, Node) {
    let dir = TempDir::new().unwrap();
    let config = NodeConfig {
        data_dir: dir.path().to_string_lossy().into_owned(),
        ..NodeConfig::default()
    };
    let node = Node::open(NetworkParams::regtest(), config).unwrap();
    (dir, node)
}

/// Mine one block paying the wallet and return the coinbase outpoint plus
/// its amount.
pub fn fund(node: &Node, wallet: &Wallet) -> (OutPoint, u64) {
    let hash = node.mine_block(&wallet.address).unwrap().unwrap();
    let block = node.get_block_by_hash(&hash).unwrap().unwrap();
    let coinbase = &block.transactions[0];
    (
        OutPoint {
            txid: coinbase.txid(),
            index: 0,
        },
        coinbase.outputs[0].amount,
    )
}

pub fn now() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as u32
}

/// A signed transfer spending `inputs` into the given outputs.
pub fn transfer(wallet: &Wallet, inputs: Vec<OutPoint>, outputs: Vec<TxOutput>) -> Transaction {
    let mut tx = Transaction {
        version: 1,
        kind: TxKind::Transfer,
        inputs: inputs.into_iter().map(TxInput::unsigned).collect(),
        outputs,
        timestamp: now(),
        metadata: Vec::new(),
    };
    wallet.sign(&mut tx);
    tx
}

/// A signed certificate issuance binding `certified_amount` to `cert_id`,
/// with change back to the wallet.
pub fn assign_cert(
    wallet: &Wallet,
    input: OutPoint,
    input_amount: u64,
    cert_id: &str,
    total_amount: u64,
    certified_amount: u64,
    fee: u64,
) -> Transaction {
    let issuance = CertificateIssuance {
        certificate_id: cert_id.to_string(),
        project_id: format!("PRJ-{}", &cert_id[5..]),
        project_name: "Test Reforestation".to_string(),
        project_type: "reforestation".to_string(),
        total_amount,
        standard: "VCS".to_string(),
        location: "Portugal".to_string(),
        issue_date: "2025-06-01".to_string(),
        extra: BTreeMap::new(),
    };
    let change = input_amount - certified_amount - fee;
    let mut outputs = vec![TxOutput::certified(
        certified_amount,
        wallet.address.clone(),
        cert_id,
    )];
    if change > 0 {
        outputs.push(TxOutput::spendable(change, wallet.address.clone()));
    }
    let mut tx = Transaction {
        version: 1,
        kind: TxKind::AssignCert,
        inputs: vec![TxInput::unsigned(input)],
        outputs,
        timestamp: now(),
        metadata: serde_json::to_vec(&issuance).unwrap(),
    };
    wallet.sign(&mut tx);
    tx
}

/// A signed compensation retiring certified inputs against `cert_id`.
pub fn compensate(
    wallet: &Wallet,
    inputs: Vec<OutPoint>,
    cert_id: &str,
    amount: u64,
) -> Transaction {
    let mut tx = Transaction {
        version: 1,
        kind: TxKind::AssignCompensation,
        inputs: inputs.into_iter().map(TxInput::unsigned).collect(),
        outputs: vec![TxOutput::compensated(
            amount,
            wallet.address.clone(),
            cert_id,
        )],
        timestamp: now(),
        metadata: Vec::new(),
    };
    wallet.sign(&mut tx);
    tx
}

/// Hand-assemble and mine a block outside the node's miner, for tests that
/// need precise control over block contents.
pub fn mine_manual(
    params: &NetworkParams,
    parent: carbon_node::Hash,
    height: u32,
    timestamp: u32,
    txs: Vec<Transaction>,
    reward_address: &str,
    fees: u64,
    extra_nonce: u64,
) -> carbon_node::Block {
    use carbon_node::consensus::constants::subsidy;
    use carbon_node::consensus::merkle::merkle_root;
    use carbon_node::consensus::pow::check_proof_of_work;
    use carbon_node::consensus::types::CoinbaseTag;
    use carbon_node::{Block, BlockHeader};

    let coinbase = Transaction {
        version: 1,
        kind: TxKind::Coinbase,
        inputs: vec![TxInput::unsigned(OutPoint::null())],
        outputs: vec![TxOutput::spendable(subsidy(height) + fees, reward_address)],
        timestamp,
        metadata: serde_json::to_vec(&CoinbaseTag {
            height,
            extra_nonce: Some(extra_nonce),
            message: None,
        })
        .unwrap(),
    };
    let mut transactions = vec![coinbase];
    transactions.extend(txs);
    let txids: Vec<carbon_node::Hash> = transactions.iter().map(Transaction::txid).collect();
    let mut block = Block {
        header: BlockHeader {
            version: 1,
            prev_hash: parent,
            merkle_root: merkle_root(&txids),
            timestamp,
            bits: params.genesis_bits,
            nonce: 0,
        },
        transactions,
    };
    while check_proof_of_work(params, &block.header).is_err() {
        block.header.nonce += 1;
    }
    block
}

/// A signed burn destroying `amount` at the canonical burn address.
pub fn burn(
    params: &NetworkParams,
    wallet: &Wallet,
    input: OutPoint,
    amount: u64,
    cert_id: Option<&str>,
) -> Transaction {
    let output = match cert_id {
        Some(id) => TxOutput::compensated(amount, params.burn_address(), id),
        None => TxOutput {
            amount,
            address: params.burn_address(),
            coin_state: carbon_node::CoinState::Compensated,
            certificate_id: None,
        },
    };
    let mut tx = Transaction {
        version: 1,
        kind: TxKind::Burn,
        inputs: vec![TxInput::unsigned(input)],
        outputs: vec![output],
        timestamp: now(),
        metadata: Vec::new(),
    };
    wallet.sign(&mut tx);
    tx
}
