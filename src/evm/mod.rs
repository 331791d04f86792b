//! Contract between the block processor and the EVM executor.
//!
//! The executor itself lives outside this crate: the core hands it a
//! header, a state handle and an ordered batch of transactions, and
//! consumes receipts, skipped indices and emitted logs. Everything the
//! executor does must be a pure function of those inputs, any
//! divergence between nodes forks the network.

mod types;

pub use types::{
  filter_skipped_txs,
  EvmBlock,
  EvmHeader,
  Log,
  Receipt,
  Transaction,
  RECEIPT_STATUS_FAILED,
  RECEIPT_STATUS_SUCCESSFUL,
};

use {
  crate::{primitives::Hash, rules::EvmChainConfig},
  ethereum_types::{Address, H256, U256},
  thiserror::Error,
};

#[derive(Debug, Error)]
pub enum EvmError {
  #[error("EVM executor failure: {0}")]
  Executor(String),

  #[error("state commit failure: {0}")]
  Commit(String),
}

/// Mutable view of the EVM world state for one block.
///
/// Implementations provide snapshot isolation per block: mutations are
/// buffered until [`StateDb::commit`] and discarded if the block is
/// abandoned.
pub trait StateDb {
  fn balance(&self, addr: &Address) -> U256;
  fn nonce(&self, addr: &Address) -> u64;
  fn code(&self, addr: &Address) -> Vec<u8>;
  fn storage(&self, addr: &Address, key: &H256) -> H256;

  fn set_balance(&mut self, addr: &Address, balance: U256);
  fn set_nonce(&mut self, addr: &Address, nonce: u64);
  fn set_code(&mut self, addr: &Address, code: Vec<u8>);
  fn set_storage(&mut self, addr: &Address, key: H256, value: H256);

  /// Imports an opaque low-level entry of the EVM database (trie
  /// nodes, preimages), copied verbatim from a genesis.
  fn apply_raw(&mut self, key: &[u8], value: &[u8]);

  /// Flushes buffered mutations and returns the new state root.
  fn commit(&mut self) -> Result<Hash, EvmError>;
}

/// Result of executing one batch of transactions.
#[derive(Debug, Default, Clone)]
pub struct ExecutionOutput {
  /// One receipt per included transaction, in order.
  pub receipts: Vec<Receipt>,
  /// Indices (into the input batch) of transactions that were not
  /// included, e.g. because of a bad nonce or insufficient balance.
  pub skipped: Vec<u32>,
  /// Gas consumed by the batch.
  pub gas_used: u64,
}

/// The EVM executor proper.
///
/// `internal` relaxes gas-price and balance checks for
/// protocol-injected transactions. `on_log` must be invoked for every
/// log in emission order; the driver listener consumes them to stage
/// validator and rule changes.
pub trait EvmExecutor {
  fn execute(
    &self,
    cfg: &EvmChainConfig,
    header: &EvmHeader,
    statedb: &mut dyn StateDb,
    txs: &[Transaction],
    internal: bool,
    on_log: &mut dyn FnMut(&Log),
  ) -> Result<ExecutionOutput, EvmError>;
}
