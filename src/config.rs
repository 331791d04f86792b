use {
  serde::{Deserialize, Serialize},
  thiserror::Error,
};

/// Smallest cache budget any bounded cache may be configured with.
/// Budgets below the floor starve the hot read path and are rejected
/// before any state is touched.
pub const CACHE_FLOOR: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("cache budget for {name} is {got}, below the floor of {floor}")]
  CacheBelowFloor {
    name: &'static str,
    got: usize,
    floor: usize,
  },
}

/// Cache budgets of the node store, in numbers of entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "PascalCase")]
pub struct StoreCacheConfig {
  /// Receipt lists kept in memory, by block.
  pub receipts_blocks: usize,
  /// Block records kept in memory.
  pub blocks_num: usize,
  /// Transaction positions kept in memory.
  pub tx_positions: usize,
}

/// Configuration of the node store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "PascalCase")]
pub struct StoreConfig {
  pub cache: StoreCacheConfig,
}

impl StoreConfig {
  pub fn default_config() -> Self {
    Self {
      cache: StoreCacheConfig {
        receipts_blocks: 4000,
        blocks_num: 5000,
        tx_positions: 20000,
      },
    }
  }

  /// Small budgets for tests and in-memory deployments.
  pub fn lite() -> Self {
    Self {
      cache: StoreCacheConfig {
        receipts_blocks: 100,
        blocks_num: 100,
        tx_positions: 500,
      },
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let budgets = [
      ("Cache.ReceiptsBlocks", self.cache.receipts_blocks),
      ("Cache.BlocksNum", self.cache.blocks_num),
      ("Cache.TxPositions", self.cache.tx_positions),
    ];
    for (name, got) in budgets {
      if got < CACHE_FLOOR {
        return Err(ConfigError::CacheBelowFloor {
          name,
          got,
          floor: CACHE_FLOOR,
        });
      }
    }
    Ok(())
  }
}
