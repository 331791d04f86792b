use {
  super::{BatchOp, BlockRecord, Store, StoreError, Table, TxPosition},
  crate::{
    blockproc::{
      AppliedBlock,
      BlockCtx,
      BlockProcError,
      BlockProcessor,
      BlockState,
      EpochState,
      ValidatorProfile,
      ValidatorProfiles,
      ValidatorBlockState,
      ValidatorEpochState,
    },
    evm::StateDb,
    genesis::Genesis,
    primitives::{Hash, ValidatorsBuilder},
  },
  ethereum_types::H256,
  std::collections::BTreeMap,
  thiserror::Error,
  tracing::{info, warn},
};

#[derive(Debug, Error)]
pub enum GenesisError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Proc(#[from] BlockProcError),

  #[error("genesis defines no block 0")]
  MissingBlockZero,

  #[error("genesis defines no usable validator")]
  NoValidators,
}

impl Store {
  /// Makes sure the database holds a fully applied genesis.
  ///
  /// If the crash-recovery sentinel is missing, any partially written
  /// state is dropped and the genesis is applied from scratch; this
  /// makes interrupted first starts indistinguishable from fresh ones.
  pub fn ensure_genesis(
    &self,
    g: &Genesis,
    statedb: &mut dyn StateDb,
    processor: &BlockProcessor,
  ) -> Result<(), GenesisError> {
    if self.get_flush_id()?.is_some() {
      return Ok(());
    }
    info!("flush sentinel missing, applying genesis");
    self.db().drop_all()?;
    self.apply_genesis(g, statedb, processor)
  }

  /// Imports the genesis sections, processes block 0 and persists the
  /// resulting decided state.
  pub fn apply_genesis(
    &self,
    g: &Genesis,
    statedb: &mut dyn StateDb,
    processor: &BlockProcessor,
  ) -> Result<(), GenesisError> {
    // raw EVM items first, then the structured sections on top
    for (key, value) in g.raw_evm_items() {
      statedb.apply_raw(key, value);
    }
    for (address, account) in g.accounts() {
      statedb.set_balance(address, account.balance);
      statedb.set_nonce(address, account.nonce);
      if account.self_destruct {
        statedb.set_code(address, Vec::new());
      } else if !account.code.is_empty() {
        statedb.set_code(address, account.code.clone());
      }
    }
    for (address, slots) in g.storage() {
      for (key, value) in slots {
        statedb.set_storage(address, *key, *value);
      }
    }

    let (bs, es) = initial_state(g)?;
    let applied = processor.apply_genesis_block(g, bs, es, statedb)?;
    let genesis_hash = g.hash();
    info!(
      epoch = applied.epoch_state.epoch,
      genesis = ?genesis_hash,
      "genesis applied"
    );
    self.persist_applied(0, &applied)?;
    self.set_flush_id(genesis_hash.as_bytes())?;
    Ok(())
  }

  /// Persists one applied block as a single atomic batch: decided
  /// state, block record, transaction bodies, positions, receipts and
  /// last events either all land or none do.
  pub fn persist_applied(
    &self,
    idx: u64,
    applied: &AppliedBlock,
  ) -> Result<(), StoreError> {
    let header = &applied.executed.block.header;
    let mut batch = Vec::new();

    let mut internal_txs = Vec::new();
    let mut txs = Vec::new();
    let mut positions = Vec::new();
    for (position, tx) in applied.executed.block.txs.iter().enumerate() {
      let hash = tx.hash();
      let tx_position = TxPosition {
        block: idx,
        index: position as u32,
      };
      batch.push(BatchOp::Put {
        table: Table::Txs,
        key: hash.as_bytes().to_vec(),
        value: rlp::encode(tx),
      });
      batch.push(BatchOp::Put {
        table: Table::TxPositions,
        key: hash.as_bytes().to_vec(),
        value: rlp::encode(&tx_position),
      });
      positions.push((hash, tx_position));
      if tx.is_internal() {
        internal_txs.push(hash);
      } else {
        txs.push(hash);
      }
    }

    let record = BlockRecord {
      time: header.time,
      atropos: header.hash,
      internal_txs,
      txs,
      skipped_txs: applied.executed.skipped_txs.clone(),
      gas_used: header.gas_used,
      root: header.root,
    };
    batch.push(BatchOp::Put {
      table: Table::Blocks,
      key: idx.to_be_bytes().to_vec(),
      value: rlp::encode(&record),
    });
    batch.push(BatchOp::Put {
      table: Table::Receipts,
      key: idx.to_be_bytes().to_vec(),
      value: rlp::encode_list(&applied.executed.receipts),
    });

    if !applied.last_events.is_empty() {
      let mut events: BTreeMap<_, _> = self
        .get_last_events(applied.events_epoch)?
        .into_iter()
        .collect();
      for (validator_id, event_id) in &applied.last_events {
        events.insert(*validator_id, *event_id);
      }
      let mut s = rlp::RlpStream::new_list(events.len());
      for (validator_id, event_id) in &events {
        s.begin_list(2);
        s.append(validator_id);
        s.append(event_id);
      }
      batch.push(BatchOp::Put {
        table: Table::LastEvents,
        key: applied.events_epoch.to_be_bytes().to_vec(),
        value: s.out(),
      });
    }

    let state = super::BlockEpochState {
      block_state: applied.block_state.clone(),
      epoch_state: applied.epoch_state.clone(),
    };
    batch.push(BatchOp::Put {
      table: Table::DecidedState,
      key: super::decided::STATE_KEY.to_vec(),
      value: rlp::encode(&state),
    });

    self.db().write_batch(batch)?;

    // refresh the caches only after the batch landed
    {
      let mut cache = self.cache.blocks.write();
      cache.insert(idx, record);
      super::evict_to_budget(&mut cache, self.config().cache.blocks_num);
    }
    {
      let mut cache = self.cache.receipts.write();
      cache.insert(
        idx,
        std::sync::Arc::new(applied.executed.receipts.clone()),
      );
      super::evict_to_budget(&mut cache, self.config().cache.receipts_blocks);
    }
    {
      let mut cache = self.cache.tx_positions.write();
      for (hash, position) in positions {
        cache.insert(hash, position);
      }
      super::evict_to_budget(&mut cache, self.config().cache.tx_positions);
    }
    self.set_block_epoch_state(
      applied.block_state.clone(),
      applied.epoch_state.clone(),
    );
    Ok(())
  }
}

/// Builds the pre-genesis `{BlockState, EpochState}` pair the block-0
/// processing starts from.
fn initial_state(g: &Genesis) -> Result<(BlockState, EpochState), GenesisError> {
  let block0 = g
    .blocks()
    .find(|(idx, _)| **idx == 0)
    .map(|(_, block)| block.clone())
    .ok_or(GenesisError::MissingBlockZero)?;

  let mut profiles = ValidatorProfiles::new();
  let mut builder = ValidatorsBuilder::new();
  for v in &g.metadata.validators {
    let stake = g.stake_of(v.id);
    if stake.is_zero() {
      warn!(validator = v.id, "genesis validator without stake, dropped");
      continue;
    }
    profiles.insert(
      v.id,
      ValidatorProfile {
        weight: stake,
        pubkey: v.pubkey.clone(),
      },
    );
    builder.set(v.id, stake);
  }
  if profiles.is_empty() {
    return Err(GenesisError::NoValidators);
  }
  let validators = builder.build();

  let ctx = BlockCtx {
    idx: 0,
    time: block0.time,
    atropos: block0.atropos,
  };

  let bs = BlockState {
    last_block: ctx,
    finalized_state_root: Hash::zero(),
    epoch_gas: 0,
    epoch_cheaters: Vec::new(),
    validator_states: validators
      .idxs()
      .map(|_| ValidatorBlockState {
        last_online_time: ctx.time,
        ..Default::default()
      })
      .collect(),
    next_validator_profiles: profiles.clone(),
    dirty_rules: g.rules.clone(),
    advance_epochs: 0,
  };

  let es = EpochState {
    epoch: g.metadata.first_epoch.saturating_sub(1),
    epoch_start: g.metadata.prev_epoch_time,
    prev_epoch_start: g.metadata.prev_epoch_time,
    epoch_state_root: H256::zero(),
    validator_states: validators
      .idxs()
      .map(|_| ValidatorEpochState::default())
      .collect(),
    validator_profiles: profiles,
    validators,
    rules: g.rules.clone(),
  };

  Ok((bs, es))
}

#[cfg(test)]
mod test {
  use {
    super::*,
    crate::{
      config::StoreConfig,
      evm::StateDb as _,
      genesis::fake::{fake_genesis, FAKE_GENESIS_TIME},
      store::MemDb,
      test::{executor::FakeExecutor, statedb::InMemoryStateDb},
      utils::to_skh,
    },
    std::sync::Arc,
  };

  #[test]
  fn genesis_application_seals_into_first_epoch() {
    let g = fake_genesis(3, to_skh(1_000_000), to_skh(1000));
    let store = Store::new(Arc::new(MemDb::new()), StoreConfig::lite());
    let executor = FakeExecutor::new();
    let processor = BlockProcessor::new(&executor);
    let mut statedb = InMemoryStateDb::default();

    store.apply_genesis(&g, &mut statedb, &processor).unwrap();

    let (bs, es) = store.get_block_epoch_state().unwrap();
    assert_eq!(es.epoch, g.metadata.first_epoch);
    assert_eq!(es.validators.len(), 3);
    assert_eq!(bs.validator_states.len(), 3);
    assert_eq!(bs.last_block.idx, 0);
    assert!(!bs.finalized_state_root.is_zero());
    assert!(store.get_flush_id().unwrap().is_some());

    // the genesis block carries the init transactions
    let block0 = store.get_block(0).unwrap().unwrap();
    assert!(!block0.internal_txs.is_empty());
    assert!(block0.txs.is_empty());
    // initializeAll + per-validator setup + per-validator delegation
    assert_eq!(block0.internal_txs.len(), 1 + 3 + 3);

    // initializeAll announced first_epoch - 1 as the last sealed epoch
    let init_tx = store.get_tx(block0.internal_txs[0]).unwrap().unwrap();
    let sealed_epoch =
      ethereum_types::U256::from_big_endian(&init_tx.input[4..36]);
    assert_eq!(
      sealed_epoch,
      ethereum_types::U256::from(g.metadata.first_epoch - 1)
    );

    // validator balances made it into the EVM state
    for v in &g.metadata.validators {
      assert_eq!(statedb.balance(&v.address), to_skh(1_000_000));
    }
  }

  #[test]
  fn ensure_genesis_recovers_from_interrupted_application() {
    let g = fake_genesis(2, to_skh(1_000), to_skh(10));
    let db = Arc::new(MemDb::new());
    let store = Store::new(db.clone(), StoreConfig::lite());
    let executor = FakeExecutor::new();
    let processor = BlockProcessor::new(&executor);
    let mut statedb = InMemoryStateDb::default();

    // simulate an interrupted first start: some state, no sentinel
    store.set_block(
      7,
      BlockRecord {
        time: FAKE_GENESIS_TIME,
        atropos: ethereum_types::H256::zero(),
        internal_txs: vec![],
        txs: vec![],
        skipped_txs: vec![],
        gas_used: 0,
        root: ethereum_types::H256::zero(),
      },
    ).unwrap();

    store.ensure_genesis(&g, &mut statedb, &processor).unwrap();
    // the partial write was dropped, the genesis fully applied
    let reopened = Store::new(db, StoreConfig::lite());
    assert!(reopened.get_block(7).unwrap().is_none());
    assert_eq!(
      reopened.get_epoch().unwrap(),
      g.metadata.first_epoch
    );

    // a second start is a no-op
    let before = reopened.get_block_epoch_state().unwrap();
    reopened
      .ensure_genesis(&g, &mut statedb, &processor)
      .unwrap();
    assert_eq!(reopened.get_block_epoch_state().unwrap(), before);
  }

  #[test]
  fn zero_stake_validators_are_dropped() {
    let mut g = fake_genesis(2, to_skh(100), to_skh(10));
    g.metadata.validators.push(crate::genesis::Validator {
      id: 99,
      address: ethereum_types::Address::repeat_byte(0x99),
      pubkey: Default::default(),
      creation_time: FAKE_GENESIS_TIME,
      creation_epoch: 0,
      deactivated_time: Default::default(),
      deactivated_epoch: 0,
      status: 0,
    });

    let (bs, es) = initial_state(&g).unwrap();
    assert!(!es.validators.exists(99));
    assert_eq!(bs.validator_states.len(), 2);
    assert_eq!(es.epoch, 1);
    assert_eq!(es.validators.len(), 2);
  }
}
