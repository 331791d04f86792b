use {
  super::state::{
    BlockCtx,
    BlockState,
    EpochState,
    ValidatorBlockState,
    ValidatorEpochState,
  },
  crate::primitives::ValidatorsBuilder,
};

/// Decides when an epoch ends and performs the rotation.
pub struct EpochsSealer;

impl EpochsSealer {
  /// The seal predicate: an epoch ends when it has burned enough gas,
  /// lasted long enough, a forced advance is pending, or a cheater was
  /// detected.
  pub fn epoch_sealing(
    block: &BlockCtx,
    bs: &BlockState,
    es: &EpochState,
  ) -> bool {
    bs.epoch_gas >= es.rules.epochs.max_epoch_gas
      || block.time - es.epoch_start >= es.rules.epochs.max_epoch_duration
      || bs.advance_epochs > 0
      || !bs.epoch_cheaters.is_empty()
  }

  /// Atomically rotates the validator set and the per-epoch
  /// bookkeeping. The step order is consensus-critical.
  pub fn seal_epoch(
    block: &BlockCtx,
    bs: &mut BlockState,
    es: &mut EpochState,
  ) {
    // select the next validator set from the staged profiles
    let old_validators = std::mem::take(&mut es.validators);
    let mut builder = ValidatorsBuilder::new();
    for (id, profile) in &bs.next_validator_profiles {
      builder.set(*id, profile.weight);
    }
    let new_validators = builder.build();
    es.validator_profiles = bs.next_validator_profiles.clone();

    // rebuild the per-validator vectors, inheriting the state of
    // validators that survive the rotation
    let len = new_validators.len() as usize;
    let mut epoch_states = vec![ValidatorEpochState::default(); len];
    let mut block_states = vec![ValidatorBlockState::default(); len];
    for new_idx in new_validators.idxs() {
      let id = new_validators.get_id(new_idx);
      let slot = new_idx as usize;
      match old_validators.get_idx(id) {
        None => {
          // new to the epoch: uptime deltas must start at zero
          block_states[slot].last_block = block.idx;
          block_states[slot].last_online_time = block.time;
        }
        Some(old_idx) => {
          let old = &bs.validator_states[old_idx as usize];
          block_states[slot] = old.clone();
          block_states[slot].dirty_gas_refund = 0;
          block_states[slot].uptime = 0;
          block_states[slot].originated = ethereum_types::U256::zero();
          epoch_states[slot].gas_refund = old.dirty_gas_refund;
          epoch_states[slot].prev_epoch_event = old.last_event;
        }
      }
    }
    es.validator_states = epoch_states;
    bs.validator_states = block_states;
    es.validators = new_validators;

    // dirty data becomes active
    es.prev_epoch_start = es.epoch_start;
    es.epoch_start = block.time;
    es.rules = bs.dirty_rules.clone();
    es.epoch_state_root = bs.finalized_state_root;

    bs.epoch_gas = 0;
    bs.epoch_cheaters.clear();
    es.epoch += 1;

    if bs.advance_epochs > 0 {
      bs.advance_epochs -= 1;
    }
  }
}

#[cfg(test)]
mod test {
  use {
    super::*,
    crate::{
      blockproc::state::ValidatorProfile,
      primitives::{EventId, Timestamp, ValidatorPubkey},
      test::fixtures,
    },
    ethereum_types::U256,
  };

  #[test]
  fn predicate_fires_on_each_condition() {
    let (bs, es) = fixtures::block_epoch_state(3);
    let quiet = fixtures::block_ctx(2, es.epoch_start + 1);
    assert!(!EpochsSealer::epoch_sealing(&quiet, &bs, &es));

    let mut gas = bs.clone();
    gas.epoch_gas = es.rules.epochs.max_epoch_gas;
    assert!(EpochsSealer::epoch_sealing(&quiet, &gas, &es));

    let late = fixtures::block_ctx(
      2,
      es.epoch_start + es.rules.epochs.max_epoch_duration,
    );
    assert!(EpochsSealer::epoch_sealing(&late, &bs, &es));

    let mut advance = bs.clone();
    advance.advance_epochs = 1;
    assert!(EpochsSealer::epoch_sealing(&quiet, &advance, &es));

    let mut cheaters = bs;
    cheaters.epoch_cheaters = vec![1];
    assert!(EpochsSealer::epoch_sealing(&quiet, &cheaters, &es));
  }

  #[test]
  fn seal_rotates_validator_set_from_staged_profiles() {
    let (mut bs, mut es) = fixtures::block_epoch_state(3);
    let block = fixtures::block_ctx(10, es.epoch_start + 500);

    // stage: drop validator 3, add validator 9 with the top weight
    bs.next_validator_profiles.remove(&3);
    bs.next_validator_profiles.insert(
      9,
      ValidatorProfile {
        weight: U256::from(1_000_000u64),
        pubkey: ValidatorPubkey::default(),
      },
    );

    EpochsSealer::seal_epoch(&block, &mut bs, &mut es);

    assert!(!es.validators.exists(3));
    assert!(es.validators.exists(9));
    assert_eq!(es.validators.get_idx(9), Some(0));
    assert_eq!(
      bs.validator_states.len(),
      es.validators.len() as usize
    );
    assert_eq!(
      es.validator_states.len(),
      es.validators.len() as usize
    );

    // the newcomer starts with a fresh state anchored at the block
    let new_idx = es.validators.get_idx(9).unwrap() as usize;
    assert_eq!(bs.validator_states[new_idx].last_block, block.idx);
    assert_eq!(bs.validator_states[new_idx].last_online_time, block.time);
    assert_eq!(bs.validator_states[new_idx].uptime, 0);
  }

  #[test]
  fn seal_inherits_and_resets_survivor_state() {
    let (mut bs, mut es) = fixtures::block_epoch_state(3);
    let block = fixtures::block_ctx(10, es.epoch_start + 500);

    let idx = es.validators.get_idx(2).unwrap() as usize;
    bs.validator_states[idx].uptime = 777;
    bs.validator_states[idx].dirty_gas_refund = 4242;
    bs.validator_states[idx].last_event = EventId::repeat_byte(0x2e);
    bs.validator_states[idx].last_block = 9;
    bs.validator_states[idx].originated = U256::from(31337u64);

    EpochsSealer::seal_epoch(&block, &mut bs, &mut es);

    let new_idx = es.validators.get_idx(2).unwrap() as usize;
    let info = &bs.validator_states[new_idx];
    assert_eq!(info.uptime, 0);
    assert_eq!(info.dirty_gas_refund, 0);
    assert_eq!(info.last_block, 9);
    // per-epoch fee bookkeeping starts over
    assert_eq!(info.originated, U256::zero());
    let epoch_info = &es.validator_states[new_idx];
    assert_eq!(epoch_info.gas_refund, 4242);
    assert_eq!(epoch_info.prev_epoch_event, EventId::repeat_byte(0x2e));
  }

  #[test]
  fn seal_activates_dirty_rules_and_advances_counters() {
    let (mut bs, mut es) = fixtures::block_epoch_state(3);
    let block = fixtures::block_ctx(10, es.epoch_start + 500);
    let old_epoch = es.epoch;
    let old_start = es.epoch_start;

    bs.dirty_rules.epochs.max_epoch_gas = 123_456;
    bs.epoch_gas = 999;
    bs.epoch_cheaters = vec![1];
    bs.advance_epochs = 2;
    bs.finalized_state_root = ethereum_types::H256::repeat_byte(0x77);

    EpochsSealer::seal_epoch(&block, &mut bs, &mut es);

    assert_eq!(es.epoch, old_epoch + 1);
    assert_eq!(es.epoch_start, block.time);
    assert_eq!(es.prev_epoch_start, old_start);
    assert_eq!(es.rules.epochs.max_epoch_gas, 123_456);
    assert_eq!(es.epoch_state_root, bs.finalized_state_root);
    assert_eq!(bs.epoch_gas, 0);
    assert!(bs.epoch_cheaters.is_empty());
    assert_eq!(bs.advance_epochs, 1);

    EpochsSealer::seal_epoch(
      &fixtures::block_ctx(11, Timestamp(block.time.nanos() + 1)),
      &mut bs,
      &mut es,
    );
    assert_eq!(bs.advance_epochs, 0);
  }
}
