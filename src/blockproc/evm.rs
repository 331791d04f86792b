use {
  super::state::BlockCtx,
  crate::{
    evm::{
      filter_skipped_txs,
      EvmBlock,
      EvmError,
      EvmExecutor,
      EvmHeader,
      Log,
      Receipt,
      StateDb,
      Transaction,
    },
    primitives::Hash,
    rules::{EvmChainConfig, Rules},
  },
  ethereum_types::{Address, H256},
};

/// A finalized EVM block together with the bookkeeping the store
/// persists alongside it.
#[derive(Debug)]
pub struct ExecutedBlock {
  pub block: EvmBlock,
  pub skipped_txs: Vec<u32>,
  pub receipts: Vec<Receipt>,
}

/// Drives the EVM executor for one block.
///
/// `execute` may be called several times per block (pre-internal,
/// user, post-internal batches); results accumulate with skipped-tx
/// indices offset into the block-wide transaction list. `finalize`
/// commits the state and assembles the block with skipped
/// transactions filtered out.
pub struct EvmProcessor<'a> {
  block: BlockCtx,
  cfg: EvmChainConfig,
  executor: &'a dyn EvmExecutor,
  prev_block_hash: H256,

  gas_used: u64,
  incoming_txs: Vec<Transaction>,
  skipped_txs: Vec<u32>,
  receipts: Vec<Receipt>,
}

impl<'a> EvmProcessor<'a> {
  pub fn start(
    block: BlockCtx,
    executor: &'a dyn EvmExecutor,
    prev_block_hash: H256,
    rules: &Rules,
  ) -> Self {
    Self {
      block,
      cfg: rules.evm_chain_config(),
      executor,
      prev_block_hash,
      gas_used: 0,
      incoming_txs: Vec::new(),
      skipped_txs: Vec::new(),
      receipts: Vec::new(),
    }
  }

  fn header_with(&self, root: Hash) -> EvmHeader {
    EvmHeader {
      number: self.block.idx,
      hash: self.block.atropos,
      parent_hash: self.prev_block_hash,
      root,
      time: self.block.time,
      coinbase: Address::zero(),
      gas_limit: u64::MAX,
      gas_used: self.gas_used,
    }
  }

  /// Executes one batch and returns `(tx, receipt)` pairs for the
  /// included transactions, in execution order.
  pub fn execute(
    &mut self,
    statedb: &mut dyn StateDb,
    txs: Vec<Transaction>,
    internal: bool,
    on_log: &mut dyn FnMut(&Log),
  ) -> Result<Vec<(Transaction, Receipt)>, EvmError> {
    let header = self.header_with(H256::zero());
    let out = self
      .executor
      .execute(&self.cfg, &header, statedb, &txs, internal, on_log)?;
    self.gas_used = self.gas_used.saturating_add(out.gas_used);

    let mut executed = Vec::with_capacity(out.receipts.len());
    let mut skipped = out.skipped.iter().peekable();
    let mut receipts = out.receipts.iter();
    for (i, tx) in txs.iter().enumerate() {
      if skipped.peek() == Some(&&(i as u32)) {
        skipped.next();
        continue;
      }
      match receipts.next() {
        Some(r) => executed.push((tx.clone(), r.clone())),
        None => break,
      }
    }

    let offset = self.incoming_txs.len() as u32;
    self
      .skipped_txs
      .extend(out.skipped.iter().map(|i| i + offset));
    self.receipts.extend(out.receipts);
    self.incoming_txs.extend(txs);
    Ok(executed)
  }

  /// Commits the state DB and assembles the final block.
  pub fn finalize(
    self,
    statedb: &mut dyn StateDb,
  ) -> Result<ExecutedBlock, EvmError> {
    let root = statedb.commit()?;
    let header = self.header_with(root);
    let txs = filter_skipped_txs(self.incoming_txs, &self.skipped_txs);
    Ok(ExecutedBlock {
      block: EvmBlock { header, txs },
      skipped_txs: self.skipped_txs,
      receipts: self.receipts,
    })
  }
}
