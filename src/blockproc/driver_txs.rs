use {
  super::state::{BlockCtx, BlockState, EpochState, MAX_ADVANCE_EPOCHS},
  crate::{
    driver::{
      self,
      calls::{self, BlocksMissed, ValidatorEpochMetric},
      DOUBLESIGN_BIT,
    },
    evm::{Log, Receipt, StateDb, Transaction},
    genesis::Genesis,
    primitives::{ValidatorId, ValidatorPubkey, ValidatorsBuilder},
  },
  ethereum_types::{Address, U256},
  tracing::warn,
};

/// Gas limit granted to protocol-injected transactions.
const INTERNAL_TX_GAS: u64 = 10_000_000_000;

/// Builds the zero-address transactions the protocol injects into a
/// block. Nonces continue from the zero address's on-chain nonce and
/// are strictly monotonic within the block.
pub struct InternalTxBuilder<'a> {
  statedb: &'a dyn StateDb,
  next_nonce: Option<u64>,
}

impl<'a> InternalTxBuilder<'a> {
  pub fn new(statedb: &'a dyn StateDb) -> Self {
    Self {
      statedb,
      next_nonce: None,
    }
  }

  pub fn build(&mut self, calldata: Vec<u8>, to: Address) -> Transaction {
    let nonce = match self.next_nonce {
      Some(nonce) => nonce,
      None => self.statedb.nonce(&Address::zero()),
    };
    self.next_nonce = Some(nonce + 1);
    Transaction {
      nonce,
      gas_price: U256::zero(),
      gas: INTERNAL_TX_GAS,
      to: Some(to),
      value: U256::zero(),
      input: calldata,
      from: Address::zero(),
    }
  }
}

/// Injects the internal transactions that precede user transactions.
pub struct DriverTxPreTransactor;

impl DriverTxPreTransactor {
  pub fn pop_internal_txs(
    block: &BlockCtx,
    bs: &mut BlockState,
    es: &EpochState,
    sealing: bool,
    statedb: &dyn StateDb,
  ) -> Vec<Transaction> {
    let mut builder = InternalTxBuilder::new(statedb);
    let mut txs = Vec::with_capacity(8);

    // deactivate newly detected cheaters, each exactly once
    for validator_id in bs.epoch_cheaters.clone() {
      let idx = match es.validators.get_idx(validator_id) {
        Some(idx) => idx as usize,
        None => continue,
      };
      if bs.validator_states[idx].cheater {
        continue;
      }
      bs.validator_states[idx].cheater = true;
      let calldata = calls::deactivate_validator(validator_id, DOUBLESIGN_BIT);
      txs.push(builder.build(calldata, *driver::CONTRACT_ADDRESS));
    }

    // push the epoch summary into the driver before sealing
    if sealing {
      let mut metrics =
        Vec::with_capacity(es.validators.len() as usize);
      for old_idx in es.validators.idxs() {
        let info = &bs.validator_states[old_idx as usize];
        let mut missed = BlocksMissed {
          num: block.idx.max(info.last_block) - info.last_block,
          period: block.time.max(info.last_online_time)
            - info.last_online_time,
        };
        let mut uptime = info.uptime;
        // forgive downtime below the slack threshold
        if missed.num <= es.rules.economy.block_missed_slack {
          missed = BlocksMissed::default();
          let prev_online_time = info.last_online_time.max(es.epoch_start);
          uptime += block.time.max(prev_online_time) - prev_online_time;
        }
        metrics.push(ValidatorEpochMetric {
          missed,
          uptime,
          originated_tx_fee: info.originated,
        });
      }
      txs.push(
        builder.build(calls::seal_epoch(&metrics), *driver::CONTRACT_ADDRESS),
      );
    }
    txs
  }
}

/// Injects the internal transactions that follow user transactions.
pub struct DriverTxTransactor;

impl DriverTxTransactor {
  pub fn pop_internal_txs(
    bs: &BlockState,
    sealing: bool,
    statedb: &dyn StateDb,
  ) -> Vec<Transaction> {
    let mut txs = Vec::with_capacity(1);
    if sealing {
      // announce the validator set the seal is about to install
      let mut builder = ValidatorsBuilder::new();
      for (id, profile) in &bs.next_validator_profiles {
        builder.set(*id, profile.weight);
      }
      let ids = builder.build().sorted_ids().to_vec();
      let mut tx_builder = InternalTxBuilder::new(statedb);
      txs.push(tx_builder.build(
        calls::seal_epoch_validators(&ids),
        *driver::CONTRACT_ADDRESS,
      ));
    }
    txs
  }
}

/// Injects the one-shot initialization transactions of block 0.
pub struct DriverTxGenesisTransactor<'g> {
  g: &'g Genesis,
}

impl<'g> DriverTxGenesisTransactor<'g> {
  pub fn new(g: &'g Genesis) -> Self {
    Self { g }
  }

  pub fn pop_internal_txs(
    &self,
    es: &EpochState,
    statedb: &dyn StateDb,
  ) -> Vec<Transaction> {
    let mut builder = InternalTxBuilder::new(statedb);
    let mut txs = Vec::with_capacity(15);

    // the pre-genesis epoch state already carries first_epoch - 1
    let calldata = calls::initialize_all(
      es.epoch,
      self.g.metadata.total_supply,
      *driver::SFC_CONTRACT_ADDRESS,
      *driver::AUTH_CONTRACT_ADDRESS,
      *driver::CONTRACT_ADDRESS,
      *driver::EVM_WRITER_CONTRACT_ADDRESS,
      self.g.metadata.driver_owner,
    );
    txs.push(builder.build(calldata, *driver::NETINIT_CONTRACT_ADDRESS));

    for v in &self.g.metadata.validators {
      let calldata = calls::set_genesis_validator(v);
      txs.push(builder.build(calldata, *driver::CONTRACT_ADDRESS));
    }

    for (addr, delegations) in self.g.delegations() {
      for (to_validator, delegation) in delegations {
        if delegation.stake.is_zero() {
          panic!("zero-stake genesis delegation from {:?}", addr);
        }
        let calldata =
          calls::set_genesis_delegation(*addr, *to_validator, delegation);
        txs.push(builder.build(calldata, *driver::CONTRACT_ADDRESS));
      }
    }
    txs
  }
}

/// Observes receipts and driver logs for one block and folds their
/// effects into the block state.
///
/// The listener never owns the state: the orchestrator hands it a
/// mutable borrow per observation, so the committed snapshot stays
/// untouched if the block is abandoned.
pub struct DriverTxListener<'a> {
  es: &'a EpochState,
}

impl<'a> DriverTxListener<'a> {
  pub fn start(es: &'a EpochState) -> Self {
    Self { es }
  }

  /// Tracks fees and gas refunds of transactions with a known
  /// originator validator.
  pub fn on_new_receipt(
    &self,
    bs: &mut BlockState,
    tx: &Transaction,
    r: &Receipt,
    originator: Option<ValidatorId>,
  ) {
    let originator = match originator {
      Some(id) => id,
      None => return,
    };
    let idx = match self.es.validators.get_idx(originator) {
      Some(idx) => idx as usize,
      None => return,
    };
    let info = &mut bs.validator_states[idx];
    info.originated += tx.fee(r.gas_used);
    let not_used_gas = tx.gas.saturating_sub(r.gas_used);
    if not_used_gas != 0 {
      info.dirty_gas_refund += not_used_gas;
    }
  }

  /// Interprets a log emitted by the driver contract. Malformed
  /// payloads are protocol no-ops: warn and leave the state unchanged,
  /// identically on every node.
  pub fn on_new_log(&self, bs: &mut BlockState, log: &Log) {
    if log.address != *driver::CONTRACT_ADDRESS || log.topics.is_empty() {
      return;
    }
    let topic = log.topics[0];

    if topic == *driver::topics::UPDATE_VALIDATOR_WEIGHT
      && log.topics.len() > 1
      && log.data.len() >= 32
    {
      let validator_id = topic_validator_id(&log.topics[1]);
      let weight = U256::from_big_endian(&log.data[0..32]);
      if weight.is_zero() {
        bs.next_validator_profiles.remove(&validator_id);
      } else {
        let profile =
          bs.next_validator_profiles.entry(validator_id).or_default();
        profile.weight = weight;
      }
    }

    if topic == *driver::topics::UPDATE_VALIDATOR_PUBKEY
      && log.topics.len() > 1
    {
      let validator_id = topic_validator_id(&log.topics[1]);
      let pubkey = match calls::decode_data_bytes(&log.data) {
        Ok(bytes) => bytes,
        Err(_) => {
          warn!("malformed UpdateValidatorPubkey driver event");
          return;
        }
      };
      match bs.next_validator_profiles.get_mut(&validator_id) {
        None => {
          warn!(validator_id, "unexpected UpdateValidatorPubkey driver event");
        }
        Some(profile) => {
          profile.pubkey =
            ValidatorPubkey::from_bytes(pubkey).unwrap_or_default();
        }
      }
    }

    if topic == *driver::topics::UPDATE_NETWORK_RULES && log.data.len() >= 64 {
      let diff = match calls::decode_data_bytes(&log.data) {
        Ok(bytes) => bytes,
        Err(_) => {
          warn!("malformed UpdateNetworkRules driver event");
          return;
        }
      };
      match bs.dirty_rules.apply_diff(diff) {
        Ok(rules) => bs.dirty_rules = rules,
        Err(err) => {
          warn!(%err, "network rules update error");
        }
      }
    }

    if topic == *driver::topics::ADVANCE_EPOCHS && log.data.len() >= 32 {
      // only the low 3 bytes are honored, to avoid overflow
      let epochs_num = u64::from(log.data[29]) << 16
        | u64::from(log.data[30]) << 8
        | u64::from(log.data[31]);
      bs.advance_epochs =
        (bs.advance_epochs + epochs_num).min(MAX_ADVANCE_EPOCHS);
    }
  }
}

fn topic_validator_id(topic: &ethereum_types::H256) -> ValidatorId {
  U256::from_big_endian(topic.as_bytes()).low_u64() as ValidatorId
}

#[cfg(test)]
mod test {
  use {
    super::*,
    crate::{
      evm::RECEIPT_STATUS_SUCCESSFUL,
      genesis::fake::fake_genesis,
      test::{fixtures, statedb::InMemoryStateDb},
      utils::to_skh,
    },
    ethereum_types::H256,
  };

  fn weight_log(validator_id: ValidatorId, weight: U256) -> Log {
    let mut data = [0u8; 32];
    weight.to_big_endian(&mut data);
    Log {
      address: *driver::CONTRACT_ADDRESS,
      topics: vec![
        *driver::topics::UPDATE_VALIDATOR_WEIGHT,
        H256::from_low_u64_be(validator_id as u64),
      ],
      data: data.to_vec(),
    }
  }

  #[test]
  fn weight_log_upserts_and_deletes_profiles() {
    let (mut bs, es) = fixtures::block_epoch_state(3);
    let listener = DriverTxListener::start(&es);

    listener.on_new_log(&mut bs, &weight_log(42, U256::from(5000)));
    assert_eq!(
      bs.next_validator_profiles[&42].weight,
      U256::from(5000)
    );
    assert!(bs.next_validator_profiles[&42].pubkey.is_empty());

    listener.on_new_log(&mut bs, &weight_log(1, U256::zero()));
    assert!(!bs.next_validator_profiles.contains_key(&1));
  }

  #[test]
  fn pubkey_log_requires_known_validator() {
    let (mut bs, es) = fixtures::block_epoch_state(3);
    let listener = DriverTxListener::start(&es);
    let pubkey = ValidatorPubkey {
      ptype: ValidatorPubkey::TYPE_SECP256K1,
      raw: vec![0xab; 64],
    };
    let log = |id: ValidatorId| Log {
      address: *driver::CONTRACT_ADDRESS,
      topics: vec![
        *driver::topics::UPDATE_VALIDATOR_PUBKEY,
        H256::from_low_u64_be(id as u64),
      ],
      data: calls::encode_data_bytes(&pubkey.to_bytes()),
    };

    // unknown id: warn and ignore
    listener.on_new_log(&mut bs, &log(42));
    assert!(!bs.next_validator_profiles.contains_key(&42));

    // known id: pubkey replaced
    listener.on_new_log(&mut bs, &log(2));
    assert_eq!(bs.next_validator_profiles[&2].pubkey, pubkey);
  }

  #[test]
  fn malformed_rules_log_is_a_noop() {
    let (mut bs, es) = fixtures::block_epoch_state(3);
    let listener = DriverTxListener::start(&es);
    let before = bs.dirty_rules.clone();

    listener.on_new_log(
      &mut bs,
      &Log {
        address: *driver::CONTRACT_ADDRESS,
        topics: vec![*driver::topics::UPDATE_NETWORK_RULES],
        data: vec![0u8; 40],
      },
    );
    assert_eq!(bs.dirty_rules, before);

    // well-formed frame carrying an invalid document is also a no-op
    listener.on_new_log(
      &mut bs,
      &Log {
        address: *driver::CONTRACT_ADDRESS,
        topics: vec![*driver::topics::UPDATE_NETWORK_RULES],
        data: calls::encode_data_bytes(br#"{"Epochs":{"MaxEpochGas":-5}}"#),
      },
    );
    assert_eq!(bs.dirty_rules, before);

    // and a valid diff lands in the dirty rules
    listener.on_new_log(
      &mut bs,
      &Log {
        address: *driver::CONTRACT_ADDRESS,
        topics: vec![*driver::topics::UPDATE_NETWORK_RULES],
        data: calls::encode_data_bytes(br#"{"Epochs":{"MaxEpochGas":888}}"#),
      },
    );
    assert_eq!(bs.dirty_rules.epochs.max_epoch_gas, 888);
  }

  #[test]
  fn advance_epochs_accumulates_and_saturates() {
    let (mut bs, es) = fixtures::block_epoch_state(3);
    let listener = DriverTxListener::start(&es);
    let log = |n: u32| {
      let mut data = [0u8; 32];
      data[29] = (n >> 16) as u8;
      data[30] = (n >> 8) as u8;
      data[31] = n as u8;
      Log {
        address: *driver::CONTRACT_ADDRESS,
        topics: vec![*driver::topics::ADVANCE_EPOCHS],
        data: data.to_vec(),
      }
    };

    listener.on_new_log(&mut bs, &log(3));
    assert_eq!(bs.advance_epochs, 3);
    listener.on_new_log(&mut bs, &log(2));
    assert_eq!(bs.advance_epochs, 5);
    listener.on_new_log(&mut bs, &log(0xffffff));
    assert_eq!(bs.advance_epochs, MAX_ADVANCE_EPOCHS);
  }

  #[test]
  fn foreign_logs_are_ignored() {
    let (mut bs, es) = fixtures::block_epoch_state(3);
    let listener = DriverTxListener::start(&es);
    let before = bs.clone();

    let mut log = weight_log(42, U256::from(5000));
    log.address = Address::repeat_byte(0x99);
    listener.on_new_log(&mut bs, &log);
    assert_eq!(bs, before);
  }

  #[test]
  fn receipts_track_fees_and_refunds() {
    let (mut bs, es) = fixtures::block_epoch_state(3);
    let listener = DriverTxListener::start(&es);
    let tx = Transaction {
      nonce: 0,
      gas_price: U256::from(2_000_000_000u64),
      gas: 100_000,
      to: Some(Address::repeat_byte(0x01)),
      value: U256::zero(),
      input: vec![],
      from: Address::repeat_byte(0x02),
    };
    let receipt = Receipt {
      status: RECEIPT_STATUS_SUCCESSFUL,
      cumulative_gas_used: 60_000,
      gas_used: 60_000,
      logs: vec![],
      contract_address: None,
      tx_hash: tx.hash(),
    };

    listener.on_new_receipt(&mut bs, &tx, &receipt, Some(2));
    let idx = es.validators.get_idx(2).unwrap() as usize;
    assert_eq!(bs.validator_states[idx].originated, tx.fee(60_000));
    assert_eq!(bs.validator_states[idx].dirty_gas_refund, 40_000);

    // no originator, no bookkeeping
    let before = bs.clone();
    listener.on_new_receipt(&mut bs, &tx, &receipt, None);
    assert_eq!(bs, before);
  }

  #[test]
  fn pre_transactor_deactivates_each_cheater_once() {
    let (mut bs, es) = fixtures::block_epoch_state(3);
    let statedb = InMemoryStateDb::default();
    let block = fixtures::block_ctx(4, es.epoch_start + 10);
    bs.epoch_cheaters = vec![3];

    let txs = DriverTxPreTransactor::pop_internal_txs(
      &block, &mut bs, &es, false, &statedb,
    );
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].to, Some(*driver::CONTRACT_ADDRESS));
    assert!(txs[0].is_internal());
    assert_eq!(
      txs[0].input,
      calls::deactivate_validator(3, DOUBLESIGN_BIT)
    );
    let idx = es.validators.get_idx(3).unwrap() as usize;
    assert!(bs.validator_states[idx].cheater);

    // already marked: not deactivated again
    let txs = DriverTxPreTransactor::pop_internal_txs(
      &block, &mut bs, &es, false, &statedb,
    );
    assert!(txs.is_empty());
  }

  #[test]
  fn pre_transactor_seals_with_slack_forgiven_metrics() {
    let (mut bs, es) = fixtures::block_epoch_state(2);
    let statedb = InMemoryStateDb::default();
    let slack = es.rules.economy.block_missed_slack;
    let block = fixtures::block_ctx(slack + 10, es.epoch_start + 1000);

    // validator 1 has been seen recently, validator 2 missed too much
    let idx1 = es.validators.get_idx(1).unwrap() as usize;
    let idx2 = es.validators.get_idx(2).unwrap() as usize;
    bs.validator_states[idx1].last_block = block.idx - 1;
    bs.validator_states[idx1].last_online_time = es.epoch_start + 400;
    bs.validator_states[idx1].uptime = 400;
    bs.validator_states[idx2].last_block = 1;
    bs.validator_states[idx2].last_online_time = es.epoch_start + 5;

    let txs = DriverTxPreTransactor::pop_internal_txs(
      &block, &mut bs, &es, true, &statedb,
    );
    assert_eq!(txs.len(), 1);

    let expected = {
      let mut metrics = Vec::new();
      for idx in 0..bs.validator_states.len() {
        let info = &bs.validator_states[idx];
        let missed_blocks = block.idx - info.last_block;
        if missed_blocks <= slack {
          metrics.push(ValidatorEpochMetric {
            missed: BlocksMissed::default(),
            uptime: info.uptime
              + (block.time - info.last_online_time.max(es.epoch_start)),
            originated_tx_fee: info.originated,
          });
        } else {
          metrics.push(ValidatorEpochMetric {
            missed: BlocksMissed {
              num: missed_blocks,
              period: block.time - info.last_online_time,
            },
            uptime: info.uptime,
            originated_tx_fee: info.originated,
          });
        }
      }
      calls::seal_epoch(&metrics)
    };
    assert_eq!(txs[0].input, expected);
  }

  #[test]
  fn genesis_transactor_reports_the_last_sealed_epoch() {
    let g = fake_genesis(2, to_skh(1000), to_skh(10));
    let statedb = InMemoryStateDb::default();
    // block 0 runs against the pre-genesis epoch state
    let (_, mut es) = fixtures::block_epoch_state(2);
    es.epoch = g.metadata.first_epoch - 1;

    let txs =
      DriverTxGenesisTransactor::new(&g).pop_internal_txs(&es, &statedb);

    // initializeAll goes to the network initializer first
    assert_eq!(txs[0].to, Some(*driver::NETINIT_CONTRACT_ADDRESS));
    // its first argument is the last sealed epoch, first_epoch - 1
    let sealed_epoch = U256::from_big_endian(&txs[0].input[4..36]);
    assert_eq!(sealed_epoch, U256::from(g.metadata.first_epoch - 1));
  }

  #[test]
  fn internal_nonces_continue_from_state_and_stay_monotonic() {
    let mut statedb = InMemoryStateDb::default();
    statedb.set_nonce(&Address::zero(), 7);

    let mut builder = InternalTxBuilder::new(&statedb);
    let a = builder.build(vec![1], Address::repeat_byte(0x01));
    let b = builder.build(vec![2], Address::repeat_byte(0x01));
    assert_eq!(a.nonce, 7);
    assert_eq!(b.nonce, 8);
    assert_eq!(a.gas, INTERNAL_TX_GAS);
    assert!(a.gas_price.is_zero());
    assert!(a.value.is_zero());
  }
}
