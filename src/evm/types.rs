use {
  crate::primitives::{BlockIdx, Gas, Hash, Timestamp},
  ethereum_types::{Address, H256, U256},
  keccak_hash::keccak,
  rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream},
};

/// An EVM transaction as seen by the block processor.
///
/// Signature verification and sender recovery happen in the executor;
/// by the time a transaction reaches this core its sender is already
/// resolved. Protocol-injected transactions carry the zero address as
/// sender and are never signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
  pub nonce: u64,
  pub gas_price: U256,
  pub gas: Gas,
  pub to: Option<Address>,
  pub value: U256,
  pub input: Vec<u8>,
  pub from: Address,
}

impl Transaction {
  pub fn hash(&self) -> H256 {
    keccak(rlp::encode(self))
  }

  /// Fee paid for the given amount of consumed gas.
  pub fn fee(&self, gas_used: Gas) -> U256 {
    self.gas_price * U256::from(gas_used)
  }

  pub fn is_internal(&self) -> bool {
    self.from.is_zero()
  }
}

impl Encodable for Transaction {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(7);
    s.append(&self.nonce);
    s.append(&self.gas_price);
    s.append(&self.gas);
    match self.to {
      Some(ref addr) => s.append(addr),
      None => s.append_empty_data(),
    };
    s.append(&self.value);
    s.append(&self.input);
    s.append(&self.from);
  }
}

impl Decodable for Transaction {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    let to_rlp = rlp.at(3)?;
    let to = if to_rlp.is_empty() {
      None
    } else {
      Some(to_rlp.as_val()?)
    };
    Ok(Transaction {
      nonce: rlp.val_at(0)?,
      gas_price: rlp.val_at(1)?,
      gas: rlp.val_at(2)?,
      to,
      value: rlp.val_at(4)?,
      input: rlp.val_at(5)?,
      from: rlp.val_at(6)?,
    })
  }
}

/// A log emitted during transaction execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
  pub address: Address,
  pub topics: Vec<H256>,
  pub data: Vec<u8>,
}

impl Encodable for Log {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(3);
    s.append(&self.address);
    s.append_list(&self.topics);
    s.append(&self.data);
  }
}

impl Decodable for Log {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(Log {
      address: rlp.val_at(0)?,
      topics: rlp.list_at(1)?,
      data: rlp.val_at(2)?,
    })
  }
}

pub const RECEIPT_STATUS_FAILED: u8 = 0;
pub const RECEIPT_STATUS_SUCCESSFUL: u8 = 1;

/// Execution outcome of one included transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
  pub status: u8,
  pub cumulative_gas_used: Gas,
  pub gas_used: Gas,
  pub logs: Vec<Log>,
  pub contract_address: Option<Address>,
  pub tx_hash: H256,
}

impl Receipt {
  pub fn is_successful(&self) -> bool {
    self.status == RECEIPT_STATUS_SUCCESSFUL
  }
}

impl Encodable for Receipt {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(6);
    s.append(&self.status);
    s.append(&self.cumulative_gas_used);
    s.append(&self.gas_used);
    s.append_list(&self.logs);
    match self.contract_address {
      Some(ref addr) => s.append(addr),
      None => s.append_empty_data(),
    };
    s.append(&self.tx_hash);
  }
}

impl Decodable for Receipt {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    let addr_rlp = rlp.at(4)?;
    let contract_address = if addr_rlp.is_empty() {
      None
    } else {
      Some(addr_rlp.as_val()?)
    };
    Ok(Receipt {
      status: rlp.val_at(0)?,
      cumulative_gas_used: rlp.val_at(1)?,
      gas_used: rlp.val_at(2)?,
      logs: rlp.list_at(3)?,
      contract_address,
      tx_hash: rlp.val_at(5)?,
    })
  }
}

/// Header of a block as presented to the EVM executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmHeader {
  pub number: BlockIdx,
  pub hash: H256,
  pub parent_hash: H256,
  pub root: Hash,
  pub time: Timestamp,
  pub coinbase: Address,
  pub gas_limit: Gas,
  pub gas_used: Gas,
}

/// A fully assembled EVM block: header plus included transactions,
/// with skipped transactions already filtered out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmBlock {
  pub header: EvmHeader,
  pub txs: Vec<Transaction>,
}

/// Removes the transactions at the given sorted indices.
pub fn filter_skipped_txs(
  txs: Vec<Transaction>,
  skipped: &[u32],
) -> Vec<Transaction> {
  if skipped.is_empty() {
    return txs;
  }
  let mut next = 0;
  txs
    .into_iter()
    .enumerate()
    .filter(|(i, _)| {
      if next < skipped.len() && skipped[next] as usize == *i {
        next += 1;
        false
      } else {
        true
      }
    })
    .map(|(_, tx)| tx)
    .collect()
}

#[cfg(test)]
mod test {
  use super::*;

  fn tx(nonce: u64) -> Transaction {
    Transaction {
      nonce,
      gas_price: U256::from(1_000_000_000u64),
      gas: 21_000,
      to: Some(Address::repeat_byte(0x11)),
      value: U256::from(7),
      input: vec![],
      from: Address::repeat_byte(0x22),
    }
  }

  #[test]
  fn tx_rlp_roundtrip() {
    let transfer = tx(3);
    let decoded: Transaction = rlp::decode(&rlp::encode(&transfer)).unwrap();
    assert_eq!(decoded, transfer);

    let create = Transaction {
      to: None,
      input: vec![0x60, 0x60],
      ..tx(0)
    };
    let decoded: Transaction = rlp::decode(&rlp::encode(&create)).unwrap();
    assert_eq!(decoded, create);
    assert_ne!(create.hash(), transfer.hash());
  }

  #[test]
  fn filter_skipped_removes_by_index() {
    let txs = vec![tx(0), tx(1), tx(2), tx(3)];
    let filtered = filter_skipped_txs(txs.clone(), &[1, 3]);
    assert_eq!(filtered.len(), 2);
    assert_eq!(filtered[0].nonce, 0);
    assert_eq!(filtered[1].nonce, 2);

    assert_eq!(filter_skipped_txs(txs.clone(), &[]), txs);
  }
}
