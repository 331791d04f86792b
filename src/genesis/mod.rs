//! Genesis model: the labeled sections a network starts from.
//!
//! All sections are kept in ordered maps so the canonical encoding,
//! and therefore the genesis hash that identifies the network, does
//! not depend on the order entries were inserted in.

pub mod fake;

use {
  crate::{
    evm::{Receipt, Transaction},
    primitives::{
      BlockIdx,
      Epoch,
      EventId,
      Hash,
      Timestamp,
      ValidatorId,
      ValidatorPubkey,
    },
    rules::Rules,
  },
  ethereum_types::{Address, H256, U256},
  keccak_hash::keccak,
  rlp::{Encodable, RlpStream},
  std::collections::BTreeMap,
};

/// An EVM account in the state of the genesis block.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Account {
  pub code: Vec<u8>,
  pub balance: U256,
  pub nonce: u64,
  pub self_destruct: bool,
}

/// Stake delegated to a validator at genesis.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delegation {
  pub stake: U256,
  pub rewards: U256,
  pub locked_stake: U256,
  pub lockup_from_epoch: Epoch,
  pub lockup_end_time: Timestamp,
  /// Lockup length in nanoseconds.
  pub lockup_duration: u64,
  pub early_unlock_penalty: U256,
}

/// A validator of the first epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
  pub id: ValidatorId,
  pub address: Address,
  pub pubkey: ValidatorPubkey,
  pub creation_time: Timestamp,
  pub creation_epoch: Epoch,
  pub deactivated_time: Timestamp,
  pub deactivated_epoch: Epoch,
  pub status: u64,
}

/// A pre-sealed block carried in the genesis (at least block 0).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Block {
  pub time: Timestamp,
  pub atropos: EventId,
  pub txs: Vec<Transaction>,
  pub internal_txs: Vec<Transaction>,
  pub root: Hash,
  pub receipts: Vec<Receipt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
  pub validators: Vec<Validator>,
  pub first_epoch: Epoch,
  pub time: Timestamp,
  pub prev_epoch_time: Timestamp,
  pub extra_data: Vec<u8>,
  pub driver_owner: Address,
  pub total_supply: U256,
}

#[derive(Debug, Clone)]
pub struct Genesis {
  accounts: BTreeMap<Address, Account>,
  storage: BTreeMap<Address, BTreeMap<H256, H256>>,
  delegations: BTreeMap<Address, BTreeMap<ValidatorId, Delegation>>,
  blocks: BTreeMap<BlockIdx, Block>,
  raw_evm_items: BTreeMap<Vec<u8>, Vec<u8>>,
  pub metadata: Metadata,
  pub rules: Rules,
}

impl Genesis {
  pub fn new(metadata: Metadata, rules: Rules) -> Self {
    Self {
      accounts: BTreeMap::new(),
      storage: BTreeMap::new(),
      delegations: BTreeMap::new(),
      blocks: BTreeMap::new(),
      raw_evm_items: BTreeMap::new(),
      metadata,
      rules,
    }
  }

  pub fn set_evm_account(&mut self, address: Address, account: Account) {
    self.accounts.insert(address, account);
  }

  pub fn set_storage(&mut self, address: Address, key: H256, value: H256) {
    self.storage.entry(address).or_default().insert(key, value);
  }

  pub fn set_delegation(
    &mut self,
    delegator: Address,
    to_validator: ValidatorId,
    delegation: Delegation,
  ) {
    self
      .delegations
      .entry(delegator)
      .or_default()
      .insert(to_validator, delegation);
  }

  pub fn set_block(&mut self, idx: BlockIdx, block: Block) {
    self.blocks.insert(idx, block);
  }

  pub fn set_raw_evm_item(&mut self, key: Vec<u8>, value: Vec<u8>) {
    self.raw_evm_items.insert(key, value);
  }

  pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Account)> {
    self.accounts.iter()
  }

  pub fn storage(
    &self,
  ) -> impl Iterator<Item = (&Address, &BTreeMap<H256, H256>)> {
    self.storage.iter()
  }

  pub fn delegations(
    &self,
  ) -> impl Iterator<Item = (&Address, &BTreeMap<ValidatorId, Delegation>)> {
    self.delegations.iter()
  }

  pub fn blocks(&self) -> impl Iterator<Item = (&BlockIdx, &Block)> {
    self.blocks.iter()
  }

  pub fn raw_evm_items(
    &self,
  ) -> impl Iterator<Item = (&Vec<u8>, &Vec<u8>)> {
    self.raw_evm_items.iter()
  }

  /// Total stake delegated to the given validator.
  pub fn stake_of(&self, validator_id: ValidatorId) -> U256 {
    let mut total = U256::zero();
    for delegations in self.delegations.values() {
      if let Some(delegation) = delegations.get(&validator_id) {
        total += delegation.stake;
      }
    }
    total
  }

  /// Hash of the canonical encoding; the identity of the network.
  pub fn hash(&self) -> Hash {
    let mut s = RlpStream::new_list(7);

    s.begin_list(self.accounts.len());
    for (address, account) in &self.accounts {
      s.begin_list(2);
      s.append(address);
      s.append(account);
    }

    s.begin_list(self.storage.len());
    for (address, slots) in &self.storage {
      s.begin_list(2);
      s.append(address);
      s.begin_list(slots.len());
      for (key, value) in slots {
        s.begin_list(2);
        s.append(key);
        s.append(value);
      }
    }

    s.begin_list(self.delegations.len());
    for (delegator, delegations) in &self.delegations {
      s.begin_list(2);
      s.append(delegator);
      s.begin_list(delegations.len());
      for (to_validator, delegation) in delegations {
        s.begin_list(2);
        s.append(to_validator);
        s.append(delegation);
      }
    }

    s.begin_list(self.blocks.len());
    for (idx, block) in &self.blocks {
      s.begin_list(2);
      s.append(idx);
      s.append(block);
    }

    s.begin_list(self.raw_evm_items.len());
    for (key, value) in &self.raw_evm_items {
      s.begin_list(2);
      s.append(key);
      s.append(value);
    }

    s.append(&self.metadata);
    s.append(&self.rules);

    keccak(s.out())
  }
}

impl Encodable for Account {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(4);
    s.append(&self.code);
    s.append(&self.balance);
    s.append(&self.nonce);
    s.append(&(self.self_destruct as u8));
  }
}

impl Encodable for Delegation {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(7);
    s.append(&self.stake);
    s.append(&self.rewards);
    s.append(&self.locked_stake);
    s.append(&self.lockup_from_epoch);
    s.append(&self.lockup_end_time);
    s.append(&self.lockup_duration);
    s.append(&self.early_unlock_penalty);
  }
}

impl Encodable for Validator {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(8);
    s.append(&self.id);
    s.append(&self.address);
    s.append(&self.pubkey);
    s.append(&self.creation_time);
    s.append(&self.creation_epoch);
    s.append(&self.deactivated_time);
    s.append(&self.deactivated_epoch);
    s.append(&self.status);
  }
}

impl Encodable for Block {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(6);
    s.append(&self.time);
    s.append(&self.atropos);
    s.append_list(&self.txs);
    s.append_list(&self.internal_txs);
    s.append(&self.root);
    s.append_list(&self.receipts);
  }
}

impl Encodable for Metadata {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(7);
    s.append_list(&self.validators);
    s.append(&self.first_epoch);
    s.append(&self.time);
    s.append(&self.prev_epoch_time);
    s.append(&self.extra_data);
    s.append(&self.driver_owner);
    s.append(&self.total_supply);
  }
}
