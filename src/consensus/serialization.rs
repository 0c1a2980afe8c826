//! Canonical wire encoding for consensus objects.
//!
//! Layout is frozen: little-endian integers, Bitcoin CompactSize varints,
//! fixed field order. Deserializers are strict: length prefixes are bounded
//! before allocation and unknown trailing bytes are a parse error.

use crate::consensus::constants::{
    MAX_ADDRESS_SIZE, MAX_BLOCK_TXS, MAX_CERT_ID_SIZE, MAX_INPUTS, MAX_OUTPUTS, MAX_SIG_SIZE,
    MAX_TX_SIZE,
};
use crate::consensus::error::{ConsensusError, Result};
use crate::consensus::types::{
    Block, BlockHeader, CoinState, OutPoint, Transaction, TxInput, TxKind, TxOutput,
};

/// Serialized header length in bytes.
pub const HEADER_SIZE: usize = 80;

// ============================================================================
// WRITER
// ============================================================================

/// Append a CompactSize varint.
pub fn write_varint(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn write_input(out: &mut Vec<u8>, input: &TxInput, clear_sig: bool, clear_pubkey: bool) {
    out.extend_from_slice(&input.prevout.txid);
    out.extend_from_slice(&input.prevout.index.to_le_bytes());
    if clear_sig {
        write_varint(out, 0);
    } else {
        write_bytes(out, &input.signature);
    }
    if clear_pubkey {
        write_varint(out, 0);
    } else {
        write_bytes(out, &input.pubkey);
    }
}

fn write_output(out: &mut Vec<u8>, output: &TxOutput) {
    out.extend_from_slice(&output.amount.to_le_bytes());
    out.push(output.coin_state.to_u8());
    write_bytes(out, output.address.as_bytes());
    match &output.certificate_id {
        Some(id) => write_bytes(out, id.as_bytes()),
        None => write_varint(out, 0),
    }
}

fn write_tx(out: &mut Vec<u8>, tx: &Transaction, clear_sig: bool, clear_pubkey: bool) {
    out.extend_from_slice(&tx.version.to_le_bytes());
    out.push(tx.kind.to_u8());
    write_varint(out, tx.inputs.len() as u64);
    for input in &tx.inputs {
        write_input(out, input, clear_sig, clear_pubkey);
    }
    write_varint(out, tx.outputs.len() as u64);
    for output in &tx.outputs {
        write_output(out, output);
    }
    out.extend_from_slice(&tx.timestamp.to_le_bytes());
    write_bytes(out, &tx.metadata);
}

/// Serialize a transaction in full, signatures included.
pub fn serialize_tx(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    write_tx(&mut out, tx, false, false);
    out
}

/// Serialize a transaction with signatures cleared; with `clear_pubkey` the
/// pubkeys are cleared too. The former is the sighash preimage, the latter
/// the txid preimage.
pub fn serialize_tx_unsigned(tx: &Transaction, clear_pubkey: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    write_tx(&mut out, tx, true, clear_pubkey);
    out
}

/// Serialize the fixed 80-byte header.
pub fn serialize_header(header: &BlockHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE);
    out.extend_from_slice(&header.version.to_le_bytes());
    out.extend_from_slice(&header.prev_hash);
    out.extend_from_slice(&header.merkle_root);
    out.extend_from_slice(&header.timestamp.to_le_bytes());
    out.extend_from_slice(&header.bits.to_le_bytes());
    out.extend_from_slice(&header.nonce.to_le_bytes());
    out
}

/// Serialize a block: header, tx count, transactions.
pub fn serialize_block(block: &Block) -> Vec<u8> {
    let mut out = serialize_header(&block.header);
    write_varint(&mut out, block.transactions.len() as u64);
    for tx in &block.transactions {
        write_tx(&mut out, tx, false, false);
    }
    out
}

// ============================================================================
// READER
// ============================================================================

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(ConsensusError::Malformed(format!(
                "unexpected end of input at byte {}",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4 bytes")))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8 bytes")))
    }

    fn read_hash(&mut self) -> Result<[u8; 32]> {
        let bytes = self.take(32)?;
        Ok(bytes.try_into().expect("32 bytes"))
    }

    fn read_varint(&mut self) -> Result<u64> {
        let tag = self.read_u8()?;
        let value = match tag {
            0xfd => u16::from_le_bytes(self.take(2)?.try_into().expect("2 bytes")) as u64,
            0xfe => u32::from_le_bytes(self.take(4)?.try_into().expect("4 bytes")) as u64,
            0xff => u64::from_le_bytes(self.take(8)?.try_into().expect("8 bytes")),
            n => n as u64,
        };
        Ok(value)
    }

    /// Read a length-prefixed byte string with an upper bound, so a hostile
    /// length prefix cannot drive allocation.
    fn read_bounded(&mut self, max: usize, what: &str) -> Result<&'a [u8]> {
        let len = self.read_varint()?;
        if len as usize > max {
            return Err(ConsensusError::Malformed(format!(
                "{} length {} exceeds limit {}",
                what, len, max
            )));
        }
        self.take(len as usize)
    }

    fn finish(&self, what: &str) -> Result<()> {
        if self.remaining() != 0 {
            return Err(ConsensusError::Malformed(format!(
                "{} trailing bytes after {}",
                self.remaining(),
                what
            )));
        }
        Ok(())
    }
}

fn read_input(r: &mut Reader) -> Result<TxInput> {
    let txid = r.read_hash()?;
    let index = r.read_u32()?;
    let signature = r.read_bounded(MAX_SIG_SIZE, "signature")?.to_vec();
    let pubkey = r.read_bounded(MAX_SIG_SIZE, "pubkey")?.to_vec();
    Ok(TxInput {
        prevout: OutPoint { txid, index },
        signature,
        pubkey,
    })
}

fn read_output(r: &mut Reader) -> Result<TxOutput> {
    let amount = r.read_u64()?;
    let state = r.read_u8()?;
    let coin_state = CoinState::from_u8(state)
        .ok_or_else(|| ConsensusError::Malformed(format!("unknown coin state {}", state)))?;
    let address = String::from_utf8(r.read_bounded(MAX_ADDRESS_SIZE, "address")?.to_vec())
        .map_err(|_| ConsensusError::Malformed("address is not UTF-8".into()))?;
    let cert = r.read_bounded(MAX_CERT_ID_SIZE, "certificate id")?;
    let certificate_id = if cert.is_empty() {
        None
    } else {
        Some(
            String::from_utf8(cert.to_vec())
                .map_err(|_| ConsensusError::Malformed("certificate id is not UTF-8".into()))?,
        )
    };
    Ok(TxOutput {
        amount,
        address,
        coin_state,
        certificate_id,
    })
}

fn read_tx(r: &mut Reader) -> Result<Transaction> {
    let version = r.read_u32()?;
    let kind_byte = r.read_u8()?;
    let kind = TxKind::from_u8(kind_byte)
        .ok_or_else(|| ConsensusError::Malformed(format!("unknown tx kind {}", kind_byte)))?;

    let input_count = r.read_varint()?;
    if input_count as usize > MAX_INPUTS {
        return Err(ConsensusError::Malformed(format!(
            "input count {} exceeds limit",
            input_count
        )));
    }
    let mut inputs = Vec::with_capacity(input_count as usize);
    for _ in 0..input_count {
        inputs.push(read_input(r)?);
    }

    let output_count = r.read_varint()?;
    if output_count as usize > MAX_OUTPUTS {
        return Err(ConsensusError::Malformed(format!(
            "output count {} exceeds limit",
            output_count
        )));
    }
    let mut outputs = Vec::with_capacity(output_count as usize);
    for _ in 0..output_count {
        outputs.push(read_output(r)?);
    }

    let timestamp = r.read_u32()?;
    let metadata = r.read_bounded(MAX_TX_SIZE, "metadata")?.to_vec();

    Ok(Transaction {
        version,
        kind,
        inputs,
        outputs,
        timestamp,
        metadata,
    })
}

/// Parse a transaction; trailing bytes are an error.
pub fn deserialize_tx(bytes: &[u8]) -> Result<Transaction> {
    let mut r = Reader::new(bytes);
    let tx = read_tx(&mut r)?;
    r.finish("transaction")?;
    Ok(tx)
}

fn read_header(r: &mut Reader) -> Result<BlockHeader> {
    Ok(BlockHeader {
        version: r.read_u32()?,
        prev_hash: r.read_hash()?,
        merkle_root: r.read_hash()?,
        timestamp: r.read_u32()?,
        bits: r.read_u32()?,
        nonce: r.read_u32()?,
    })
}

/// Parse an exactly-80-byte header.
pub fn deserialize_header(bytes: &[u8]) -> Result<BlockHeader> {
    if bytes.len() != HEADER_SIZE {
        return Err(ConsensusError::Malformed(format!(
            "header must be {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }
    let mut r = Reader::new(bytes);
    let header = read_header(&mut r)?;
    r.finish("header")?;
    Ok(header)
}

/// Parse a block; trailing bytes are an error.
pub fn deserialize_block(bytes: &[u8]) -> Result<Block> {
    let mut r = Reader::new(bytes);
    let header = read_header(&mut r)?;
    let tx_count = r.read_varint()?;
    if tx_count as usize > MAX_BLOCK_TXS {
        return Err(ConsensusError::Malformed(format!(
            "transaction count {} exceeds limit",
            tx_count
        )));
    }
    let mut transactions = Vec::with_capacity(tx_count as usize);
    for _ in 0..tx_count {
        transactions.push(read_tx(&mut r)?);
    }
    r.finish("block")?;
    Ok(Block {
        header,
        transactions,
    })
}
