//! Persistent store of the decided node state.
//!
//! One physical key-value database holds the decided
//! `{BlockState, EpochState}` sentinel plus the block, receipt and
//! transaction tables. The latest decided state is additionally kept
//! as an in-memory snapshot behind a lock so that read-mostly
//! consumers never touch the database on the hot path.

mod blocks;
mod decided;
mod genesis;
mod kvdb;

pub use {
  blocks::{BlockRecord, TxPosition},
  decided::BlockEpochState,
  genesis::GenesisError,
  kvdb::{BatchOp, KeyValueStore, MemDb, RocksDb, StoreError, Table},
};

use {
  crate::{
    config::StoreConfig,
    evm::Receipt,
    primitives::BlockIdx,
  },
  ethereum_types::H256,
  parking_lot::RwLock,
  std::{collections::BTreeMap, sync::Arc},
};

#[derive(Default)]
struct StoreCache {
  block_epoch_state: RwLock<Option<Arc<BlockEpochState>>>,
  receipts: RwLock<BTreeMap<BlockIdx, Arc<Vec<Receipt>>>>,
  blocks: RwLock<BTreeMap<BlockIdx, BlockRecord>>,
  tx_positions: RwLock<BTreeMap<H256, TxPosition>>,
}

/// Node persistent storage working over a physical key-value database.
pub struct Store {
  db: Arc<dyn KeyValueStore>,
  config: StoreConfig,
  cache: StoreCache,
}

impl Store {
  pub fn new(db: Arc<dyn KeyValueStore>, config: StoreConfig) -> Self {
    Self {
      db,
      config,
      cache: StoreCache::default(),
    }
  }

  pub(crate) fn db(&self) -> &dyn KeyValueStore {
    self.db.as_ref()
  }

  pub(crate) fn config(&self) -> &StoreConfig {
    &self.config
  }
}

fn evict_to_budget<K: Ord + Clone, V>(map: &mut BTreeMap<K, V>, budget: usize) {
  while map.len() > budget {
    let oldest = match map.keys().next() {
      Some(key) => key.clone(),
      None => break,
    };
    map.remove(&oldest);
  }
}
