//! Cryptographic primitives: hashing, addresses, signatures, PoW hash.
//!
//! Everything here is deterministic and side-effect-free. Block and
//! transaction ids use double SHA-256; addresses are Base58Check over
//! RIPEMD160(SHA256(pubkey)); signatures are compact ECDSA over secp256k1
//! with low-S enforced; the proof-of-work hash is Scrypt or Argon2id,
//! selected once per chain at genesis.

use blake2::digest::consts::U32;
use blake2::Blake2b;
use ripemd::Ripemd160;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, SECP256K1};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 256-bit hash value.
pub type Hash = [u8; 32];

/// Base58Check version byte for mainnet addresses.
pub const ADDRESS_VERSION_MAINNET: u8 = 0x00;
/// Base58Check version byte for testnet and regtest addresses.
pub const ADDRESS_VERSION_TESTNET: u8 = 0x6f;

type Blake2b256 = Blake2b<U32>;

/// Single SHA-256.
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// Double SHA-256, used for block ids, transaction ids and Merkle nodes.
pub fn hash256(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// BLAKE2b-256, offered as an alternative content hash.
pub fn blake2b256(data: &[u8]) -> Hash {
    Blake2b256::digest(data).into()
}

/// RIPEMD160(SHA256(data)), the address payload hash.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

/// Derive a Base58Check address from a serialized public key.
pub fn address_from_pubkey(pubkey: &[u8], version: u8) -> String {
    encode_base58check(version, &hash160(pubkey))
}

/// The canonical burn address for a network: the all-zero payload.
///
/// Nobody holds a key hashing to twenty zero bytes, so value sent here is
/// unrecoverable by construction.
pub fn burn_address(version: u8) -> String {
    encode_base58check(version, &[0u8; 20])
}

/// Base58Check-encode `version || payload || checksum4`.
fn encode_base58check(version: u8, payload: &[u8; 20]) -> String {
    let mut data = Vec::with_capacity(25);
    data.push(version);
    data.extend_from_slice(payload);
    let checksum = hash256(&data);
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}

/// Decode a Base58Check address into its version byte and 20-byte payload.
///
/// Returns `None` on any defect: bad alphabet, wrong length, or checksum
/// mismatch.
pub fn decode_address(address: &str) -> Option<(u8, [u8; 20])> {
    let data = bs58::decode(address).into_vec().ok()?;
    if data.len() != 25 {
        return None;
    }
    let checksum = hash256(&data[..21]);
    if data[21..] != checksum[..4] {
        return None;
    }
    let mut payload = [0u8; 20];
    payload.copy_from_slice(&data[1..21]);
    Some((data[0], payload))
}

/// Validate an address against the expected network version byte.
pub fn validate_address(address: &str, version: u8) -> bool {
    matches!(decode_address(address), Some((v, _)) if v == version)
}

/// Verify a compact ECDSA signature over a 32-byte digest.
///
/// Rejects non-canonical (high-S) signatures so that a transaction has
/// exactly one valid byte representation per key.
pub fn verify_signature(pubkey: &[u8], signature: &[u8], digest: &Hash) -> bool {
    let Ok(pk) = PublicKey::from_slice(pubkey) else {
        return false;
    };
    let Ok(sig) = Signature::from_compact(signature) else {
        return false;
    };
    let mut normalized = sig;
    normalized.normalize_s();
    if normalized.serialize_compact() != sig.serialize_compact() {
        return false;
    }
    let msg = Message::from_digest(*digest);
    SECP256K1.verify_ecdsa(&msg, &sig, &pk).is_ok()
}

/// Proof-of-work hash function, fixed per chain at genesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowAlgorithm {
    /// Scrypt with N=1024, r=1, p=1.
    Scrypt,
    /// Argon2id with m=64 MiB, t=3, p=4.
    Argon2id,
}

/// Compute the proof-of-work hash of serialized header bytes.
pub fn pow_hash(algorithm: PowAlgorithm, header_bytes: &[u8]) -> Hash {
    let mut out = [0u8; 32];
    match algorithm {
        PowAlgorithm::Scrypt => {
            // log2(1024) = 10
            let params = scrypt::Params::new(10, 1, 1, 32).expect("fixed scrypt params are valid");
            scrypt::scrypt(header_bytes, header_bytes, &params, &mut out)
                .expect("32-byte output is valid for scrypt");
        }
        PowAlgorithm::Argon2id => {
            let params = argon2::Params::new(64 * 1024, 3, 4, Some(32))
                .expect("fixed argon2 params are valid");
            let argon = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
            // The salt is the header itself: the whole preimage is the header,
            // so any header bit flip changes the hash.
            argon
                .hash_password_into(header_bytes, header_bytes, &mut out)
                .expect("fixed-size argon2 invocation cannot fail");
        }
    }
    out
}
