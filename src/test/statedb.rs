use {
  crate::{
    evm::{EvmError, StateDb},
    primitives::Hash,
  },
  ethereum_types::{Address, H256, U256},
  keccak_hash::keccak,
  rlp::RlpStream,
  std::collections::BTreeMap,
};

/// A deterministic in-memory EVM state DB.
///
/// The "state root" is the hash of the canonical encoding of all
/// entries, so identical mutation sequences produce identical roots on
/// every node, which is what the determinism tests assert.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStateDb {
  balances: BTreeMap<Address, U256>,
  nonces: BTreeMap<Address, u64>,
  codes: BTreeMap<Address, Vec<u8>>,
  storage: BTreeMap<(Address, H256), H256>,
  raw: BTreeMap<Vec<u8>, Vec<u8>>,
  committed_root: H256,
}

impl InMemoryStateDb {
  pub fn committed_root(&self) -> H256 {
    self.committed_root
  }

  fn current_root(&self) -> H256 {
    let mut s = RlpStream::new_list(5);

    s.begin_list(self.balances.len());
    for (addr, balance) in &self.balances {
      s.begin_list(2);
      s.append(addr);
      s.append(balance);
    }
    s.begin_list(self.nonces.len());
    for (addr, nonce) in &self.nonces {
      s.begin_list(2);
      s.append(addr);
      s.append(nonce);
    }
    s.begin_list(self.codes.len());
    for (addr, code) in &self.codes {
      s.begin_list(2);
      s.append(addr);
      s.append(code);
    }
    s.begin_list(self.storage.len());
    for ((addr, key), value) in &self.storage {
      s.begin_list(3);
      s.append(addr);
      s.append(key);
      s.append(value);
    }
    s.begin_list(self.raw.len());
    for (key, value) in &self.raw {
      s.begin_list(2);
      s.append(key);
      s.append(value);
    }

    keccak(s.out())
  }
}

impl StateDb for InMemoryStateDb {
  fn balance(&self, addr: &Address) -> U256 {
    self.balances.get(addr).copied().unwrap_or_default()
  }

  fn nonce(&self, addr: &Address) -> u64 {
    self.nonces.get(addr).copied().unwrap_or_default()
  }

  fn code(&self, addr: &Address) -> Vec<u8> {
    self.codes.get(addr).cloned().unwrap_or_default()
  }

  fn storage(&self, addr: &Address, key: &H256) -> H256 {
    self
      .storage
      .get(&(*addr, *key))
      .copied()
      .unwrap_or_default()
  }

  fn set_balance(&mut self, addr: &Address, balance: U256) {
    self.balances.insert(*addr, balance);
  }

  fn set_nonce(&mut self, addr: &Address, nonce: u64) {
    self.nonces.insert(*addr, nonce);
  }

  fn set_code(&mut self, addr: &Address, code: Vec<u8>) {
    self.codes.insert(*addr, code);
  }

  fn set_storage(&mut self, addr: &Address, key: H256, value: H256) {
    self.storage.insert((*addr, key), value);
  }

  fn apply_raw(&mut self, key: &[u8], value: &[u8]) {
    self.raw.insert(key.to_vec(), value.to_vec());
  }

  fn commit(&mut self) -> Result<Hash, EvmError> {
    self.committed_root = self.current_root();
    Ok(self.committed_root)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn identical_mutations_commit_identical_roots() {
    let mut a = InMemoryStateDb::default();
    let mut b = InMemoryStateDb::default();
    for db in [&mut a, &mut b] {
      db.set_balance(&Address::repeat_byte(1), U256::from(10));
      db.set_nonce(&Address::repeat_byte(1), 3);
      db.set_storage(
        &Address::repeat_byte(2),
        H256::repeat_byte(5),
        H256::repeat_byte(6),
      );
    }
    assert_eq!(a.commit().unwrap(), b.commit().unwrap());

    b.set_balance(&Address::repeat_byte(1), U256::from(11));
    assert_ne!(a.commit().unwrap(), b.commit().unwrap());
  }
}
