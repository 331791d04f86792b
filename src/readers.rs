//! Read-mostly consumers of the decided state.
//!
//! The block processor is the single writer; everything here serves
//! concurrent readers (event validation, RPC, gossip) from published
//! snapshots, so the hot paths never contend with block processing.

use {
  crate::{
    evm::{EvmBlock, EvmHeader},
    primitives::{
      Epoch,
      EventId,
      Gas,
      Timestamp,
      ValidatorId,
      ValidatorPubkey,
      Validators,
      GAS_POWER_CONFIGS,
      LONG_TERM_GAS,
      SHORT_TERM_GAS,
    },
    store::{Store, StoreError},
  },
  ethereum_types::{Address, H256, U256},
  parking_lot::RwLock,
  std::{collections::BTreeMap, sync::Arc},
};

/// Parameters of one gas power lane, derived from the economy rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasPowerConfig {
  pub idx: usize,
  pub alloc_per_sec: Gas,
  pub max_alloc_period: u64,
  pub min_ensured_alloc: Gas,
  pub startup_alloc_period: u64,
  pub min_startup_gas: Gas,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GasPowerValidatorState {
  pub gas_refund: Gas,
  pub prev_epoch_event: EventId,
}

/// Everything the gas-power check needs to validate one event,
/// assembled once per epoch.
#[derive(Debug, Clone)]
pub struct ValidationContext {
  pub epoch: Epoch,
  pub validators: Validators,
  pub epoch_start: Timestamp,
  pub validator_states: Vec<GasPowerValidatorState>,
  pub configs: [GasPowerConfig; GAS_POWER_CONFIGS],
}

/// Atomically swappable holder of the current [`ValidationContext`].
pub struct GasPowerCheckReader {
  ctx: RwLock<Arc<ValidationContext>>,
}

impl GasPowerCheckReader {
  pub fn new(ctx: ValidationContext) -> Self {
    Self {
      ctx: RwLock::new(Arc::new(ctx)),
    }
  }

  pub fn get_validation_context(&self) -> Arc<ValidationContext> {
    Arc::clone(&self.ctx.read())
  }

  /// Publishes a fresh context; called on epoch boundaries.
  pub fn update(&self, ctx: ValidationContext) {
    *self.ctx.write() = Arc::new(ctx);
  }
}

/// Builds the gas-power validation context from the decided state.
pub fn new_gas_power_context(
  store: &Store,
) -> Result<ValidationContext, StoreError> {
  let es = store.get_epoch_state()?;
  let economy = &es.rules.economy;

  let short = &economy.short_gas_power;
  let short_config = GasPowerConfig {
    idx: SHORT_TERM_GAS,
    alloc_per_sec: short.alloc_per_sec,
    max_alloc_period: short.max_alloc_period,
    min_ensured_alloc: economy.gas.max_event_gas,
    startup_alloc_period: short.startup_alloc_period,
    min_startup_gas: short.min_startup_gas,
  };
  let long = &economy.long_gas_power;
  let long_config = GasPowerConfig {
    idx: LONG_TERM_GAS,
    alloc_per_sec: long.alloc_per_sec,
    max_alloc_period: long.max_alloc_period,
    min_ensured_alloc: economy.gas.max_event_gas,
    startup_alloc_period: long.startup_alloc_period,
    min_startup_gas: long.min_startup_gas,
  };

  let validator_states = es
    .validator_states
    .iter()
    .map(|v| GasPowerValidatorState {
      gas_refund: v.gas_refund,
      prev_epoch_event: v.prev_epoch_event,
    })
    .collect();

  Ok(ValidationContext {
    epoch: es.epoch,
    validators: es.validators.clone(),
    epoch_start: es.epoch_start,
    validator_states,
    configs: [short_config, long_config],
  })
}

/// Keys the heavy check authenticates validator signatures against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorsPubKeys {
  pub epoch: Epoch,
  pub pubkeys: BTreeMap<ValidatorId, ValidatorPubkey>,
}

/// Atomically swappable holder of the current epoch's validator keys.
pub struct HeavyCheckReader {
  addrs: RwLock<Arc<ValidatorsPubKeys>>,
}

impl HeavyCheckReader {
  pub fn new(keys: ValidatorsPubKeys) -> Self {
    Self {
      addrs: RwLock::new(Arc::new(keys)),
    }
  }

  /// Safe for concurrent use.
  pub fn get_epoch_pub_keys(&self) -> Arc<ValidatorsPubKeys> {
    Arc::clone(&self.addrs.read())
  }

  pub fn update(&self, keys: ValidatorsPubKeys) {
    *self.addrs.write() = Arc::new(keys);
  }
}

/// Collects the current epoch's validator keys from the decided state.
pub fn new_epoch_pub_keys(
  store: &Store,
) -> Result<ValidatorsPubKeys, StoreError> {
  let es = store.get_epoch_state()?;
  let pubkeys = es
    .validator_profiles
    .iter()
    .map(|(id, profile)| (*id, profile.pubkey.clone()))
    .collect();
  Ok(ValidatorsPubKeys {
    epoch: es.epoch,
    pubkeys,
  })
}

/// Per-validator highest confirmed event ids of the current epoch,
/// updated between blocks and read concurrently by the emitter and
/// the gossip layer.
#[derive(Default)]
pub struct ValidatorTipsSet {
  tips: RwLock<BTreeMap<ValidatorId, EventId>>,
}

impl ValidatorTipsSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn update(&self, last_events: &[(ValidatorId, EventId)]) {
    let mut tips = self.tips.write();
    for (validator_id, event_id) in last_events {
      tips.insert(*validator_id, *event_id);
    }
  }

  pub fn get(&self, validator_id: ValidatorId) -> Option<EventId> {
    self.tips.read().get(&validator_id).copied()
  }

  pub fn snapshot(&self) -> BTreeMap<ValidatorId, EventId> {
    self.tips.read().clone()
  }

  /// Drops all tips; called when an epoch seals.
  pub fn reset(&self) {
    self.tips.write().clear();
  }
}

/// Read side of the EVM surface: prices, limits and assembled blocks.
pub struct EvmStateReader<'s> {
  store: &'s Store,
}

impl<'s> EvmStateReader<'s> {
  pub fn new(store: &'s Store) -> Self {
    Self { store }
  }

  /// Current hard lower bound for the gas price.
  pub fn min_gas_price(&self) -> Result<U256, StoreError> {
    Ok(self.store.get_rules()?.economy.min_gas_price)
  }

  /// Gas available to transactions inside a maximal event, after the
  /// event overhead is paid.
  pub fn max_gas_limit(&self) -> Result<Gas, StoreError> {
    let rules = self.store.get_rules()?;
    let gas = &rules.economy.gas;
    let dag = &rules.dag;
    let max_empty_event_gas = gas.event_gas
      + u64::from(dag.max_parents.saturating_sub(dag.max_free_parents))
        * gas.parent_gas
      + u64::from(dag.max_extra_data) * gas.extra_data_gas;
    if gas.max_event_gas < max_empty_event_gas {
      return Ok(0);
    }
    Ok(gas.max_event_gas - max_empty_event_gas)
  }

  pub fn current_block(&self) -> Result<Option<EvmBlock>, StoreError> {
    let latest = self.store.get_latest_block_index()?;
    self.get_block(latest)
  }

  /// Assembles the full EVM block `n` from the persisted record and
  /// transaction bodies. The record references included transactions
  /// only; skipped ones were filtered before persistence.
  pub fn get_block(&self, n: u64) -> Result<Option<EvmBlock>, StoreError> {
    let record = match self.store.get_block(n)? {
      Some(record) => record,
      None => return Ok(None),
    };

    let mut txs = Vec::with_capacity(
      record.internal_txs.len() + record.txs.len(),
    );
    for hash in record.internal_txs.iter().chain(record.txs.iter()) {
      match self.store.get_tx(*hash)? {
        Some(tx) => txs.push(tx),
        None => {
          return Err(StoreError::Engine(format!(
            "transaction {:?} of block {} not found",
            hash, n
          )))
        }
      }
    }

    let parent_hash = if n == 0 {
      H256::zero()
    } else {
      match self.store.get_block(n - 1)? {
        Some(prev) => prev.atropos,
        None => H256::zero(),
      }
    };

    Ok(Some(EvmBlock {
      header: EvmHeader {
        number: n,
        hash: record.atropos,
        parent_hash,
        root: record.root,
        time: record.time,
        coinbase: Address::zero(),
        gas_limit: u64::MAX,
        gas_used: record.gas_used,
      },
      txs,
    }))
  }

  pub fn tx_exists(&self, hash: H256) -> Result<bool, StoreError> {
    Ok(self.store.get_tx_position(hash)?.is_some())
  }
}
