use {
  super::{
    driver_txs::{
      DriverTxGenesisTransactor,
      DriverTxListener,
      DriverTxPreTransactor,
      DriverTxTransactor,
    },
    events::ConfirmedEventsProcessor,
    evm::{EvmProcessor, ExecutedBlock},
    sealer::EpochsSealer,
    state::{BlockCtx, BlockState, EpochState, InvariantViolation},
  },
  crate::{
    evm::{EvmError, EvmExecutor, StateDb},
    genesis::Genesis,
    primitives::{EventI, EventId, EventPayloadI, ValidatorId},
  },
  ethereum_types::H256,
  std::collections::BTreeMap,
  thiserror::Error,
};

#[derive(Debug, Error)]
pub enum BlockProcError {
  #[error(transparent)]
  Evm(#[from] EvmError),

  #[error(transparent)]
  Invariant(#[from] InvariantViolation),
}

/// One decided block as delivered by the consensus layer: its
/// identity, the validators newly caught double-signing, and the
/// confirmed events in consensus order.
pub struct DecidedBlock<'a, E: EventPayloadI> {
  pub ctx: BlockCtx,
  pub cheaters: Vec<ValidatorId>,
  pub events: &'a [E],
}

/// Everything a fully processed block produces.
pub struct AppliedBlock {
  pub block_state: BlockState,
  pub epoch_state: EpochState,
  pub sealed: bool,
  /// The epoch this block's events belong to. On a sealing block this
  /// is the epoch that was sealed, not the freshly opened one.
  pub events_epoch: u64,
  pub executed: ExecutedBlock,
  /// Highest confirmed event per validator, for the tips set and the
  /// last-events table.
  pub last_events: Vec<(ValidatorId, EventId)>,
}

/// The per-block pipeline. Module composition is fixed: pre-internal
/// transactions, user transactions, confirmed-events bookkeeping,
/// post-internal transactions, EVM finalize, then the epoch seal.
///
/// Processing is strictly sequential; a failed step aborts the block
/// with an error and leaves the committed state untouched, since all
/// mutations happen on the caller's snapshots.
pub struct BlockProcessor<'x> {
  executor: &'x dyn EvmExecutor,
}

impl<'x> BlockProcessor<'x> {
  pub fn new(executor: &'x dyn EvmExecutor) -> Self {
    Self { executor }
  }

  pub fn apply_block<E: EventPayloadI>(
    &self,
    decided: DecidedBlock<'_, E>,
    mut bs: BlockState,
    mut es: EpochState,
    statedb: &mut dyn StateDb,
  ) -> Result<AppliedBlock, BlockProcError> {
    let ctx = decided.ctx;
    let prev_block_hash = if ctx.idx == 0 {
      H256::zero()
    } else {
      bs.last_block.atropos
    };
    bs.last_block = ctx;

    // record newly detected cheaters; membership and uniqueness are
    // invariants of the cheater list
    for cheater in &decided.cheaters {
      if es.validators.exists(*cheater) && !bs.epoch_cheaters.contains(cheater)
      {
        bs.epoch_cheaters.push(*cheater);
      }
    }

    // the seal decision is fixed for the whole block; pre-internal
    // transactions cannot change any of the predicate's inputs
    let sealing = EpochsSealer::epoch_sealing(&ctx, &bs, &es);

    let listener = DriverTxListener::start(&es);
    let mut evm =
      EvmProcessor::start(ctx, self.executor, prev_block_hash, &es.rules);

    // pre-internal transactions
    let pre_txs =
      DriverTxPreTransactor::pop_internal_txs(&ctx, &mut bs, &es, sealing, statedb);
    let pre_executed = evm.execute(statedb, pre_txs, true, &mut |log| {
      listener.on_new_log(&mut bs, log)
    })?;
    for (tx, receipt) in &pre_executed {
      if !receipt.is_successful() {
        tracing::warn!(tx = ?tx.hash(), "internal transaction reverted");
      }
    }

    // user transactions, in event order, attributed to the event
    // creator that originated them
    let mut user_txs = Vec::new();
    let mut originators = BTreeMap::new();
    for e in decided.events {
      for tx in e.txs() {
        originators.entry(tx.hash()).or_insert_with(|| e.creator());
        user_txs.push(tx.clone());
      }
    }
    let user_executed = evm.execute(statedb, user_txs, false, &mut |log| {
      listener.on_new_log(&mut bs, log)
    })?;
    for (tx, receipt) in &user_executed {
      let originator = originators.get(&tx.hash()).copied();
      listener.on_new_receipt(&mut bs, tx, receipt, originator);
    }

    // confirmed-events bookkeeping
    let mut events_proc = ConfirmedEventsProcessor::start(&es);
    for e in decided.events {
      events_proc.process_confirmed_event(&mut bs, e as &dyn EventI);
    }
    events_proc.finalize(ctx, &mut bs);
    let mut last_events = Vec::new();
    for (idx, event) in events_proc.highest_events().iter().enumerate() {
      if let Some(event) = event {
        last_events.push((es.validators.get_id(idx as u32), event.id));
      }
    }
    drop(events_proc);

    // post-internal transactions
    let post_txs = DriverTxTransactor::pop_internal_txs(&bs, sealing, statedb);
    evm.execute(statedb, post_txs, true, &mut |log| {
      listener.on_new_log(&mut bs, log)
    })?;
    drop(listener);

    // commit the EVM state and record the new root
    let executed = evm.finalize(statedb)?;
    bs.finalized_state_root = executed.block.header.root;

    let events_epoch = es.epoch;
    if sealing {
      EpochsSealer::seal_epoch(&ctx, &mut bs, &mut es);
    }

    bs.verify(&es.validators)?;
    es.verify()?;

    Ok(AppliedBlock {
      block_state: bs,
      epoch_state: es,
      sealed: sealing,
      events_epoch,
      executed,
      last_events,
    })
  }

  /// Processes block 0: runs the genesis transactor against the
  /// freshly imported state and force-seals into the first epoch.
  pub fn apply_genesis_block(
    &self,
    g: &Genesis,
    mut bs: BlockState,
    mut es: EpochState,
    statedb: &mut dyn StateDb,
  ) -> Result<AppliedBlock, BlockProcError> {
    let ctx = bs.last_block;

    let listener = DriverTxListener::start(&es);
    let mut evm =
      EvmProcessor::start(ctx, self.executor, H256::zero(), &es.rules);

    let genesis_txs =
      DriverTxGenesisTransactor::new(g).pop_internal_txs(&es, statedb);
    evm.execute(statedb, genesis_txs, true, &mut |log| {
      listener.on_new_log(&mut bs, log)
    })?;
    drop(listener);

    let executed = evm.finalize(statedb)?;
    bs.finalized_state_root = executed.block.header.root;

    let events_epoch = es.epoch;
    EpochsSealer::seal_epoch(&ctx, &mut bs, &mut es);

    bs.verify(&es.validators)?;
    es.verify()?;

    Ok(AppliedBlock {
      block_state: bs,
      epoch_state: es,
      sealed: true,
      events_epoch,
      executed,
      last_events: Vec::new(),
    })
  }
}
