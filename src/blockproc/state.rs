use {
  crate::{
    primitives::{
      BlockIdx,
      Epoch,
      EventId,
      Gas,
      GasPowerLeft,
      Hash,
      Timestamp,
      ValidatorId,
      ValidatorPubkey,
      Validators,
    },
    rules::Rules,
  },
  ethereum_types::{H256, U256},
  rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream},
  sha2::{Digest, Sha256},
  std::collections::BTreeMap,
  thiserror::Error,
};

/// Hard cap on the number of pending forced epoch seals.
pub const MAX_ADVANCE_EPOCHS: u64 = 1 << 16;

#[derive(Debug, Error)]
pub enum InvariantViolation {
  #[error("{found} validator states for a validator set of {expected}")]
  StateCountMismatch { found: usize, expected: usize },

  #[error("cheater {0} is not a member of the validator set")]
  UnknownCheater(ValidatorId),

  #[error("cheater {0} recorded more than once")]
  DuplicateCheater(ValidatorId),

  #[error("staged profile of validator {0} has zero weight")]
  ZeroWeightProfile(ValidatorId),

  #[error("advance-epochs counter {0} exceeds the cap")]
  AdvanceEpochsOverflow(u64),

  #[error("epoch start precedes the previous epoch start")]
  EpochStartRegression,
}

/// Identity of one decided block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockCtx {
  pub idx: BlockIdx,
  pub time: Timestamp,
  pub atropos: EventId,
}

impl Encodable for BlockCtx {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(3);
    s.append(&self.idx);
    s.append(&self.time);
    s.append(&self.atropos);
  }
}

impl Decodable for BlockCtx {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(BlockCtx {
      idx: rlp.val_at(0)?,
      time: rlp.val_at(1)?,
      atropos: rlp.val_at(2)?,
    })
  }
}

/// Per-validator bookkeeping that evolves block by block within the
/// current epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorBlockState {
  /// Sticky double-sign flag; once set it holds until the epoch seals.
  pub cheater: bool,
  pub last_event: EventId,
  /// Accumulated online time this epoch, in nanoseconds.
  pub uptime: u64,
  pub last_online_time: Timestamp,
  pub last_gas_power_left: GasPowerLeft,
  pub last_block: BlockIdx,
  /// Unused gas of transactions originated by this validator, refunded
  /// as gas power next epoch.
  pub dirty_gas_refund: Gas,
  /// Total fees of transactions originated by this validator.
  pub originated: U256,
}

impl Default for ValidatorBlockState {
  fn default() -> Self {
    Self {
      cheater: false,
      last_event: EventId::zero(),
      uptime: 0,
      last_online_time: Timestamp::default(),
      last_gas_power_left: GasPowerLeft::default(),
      last_block: 0,
      dirty_gas_refund: 0,
      originated: U256::zero(),
    }
  }
}

impl Encodable for ValidatorBlockState {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(8);
    s.append(&(self.cheater as u8));
    s.append(&self.last_event);
    s.append(&self.uptime);
    s.append(&self.last_online_time);
    s.append(&self.last_gas_power_left);
    s.append(&self.last_block);
    s.append(&self.dirty_gas_refund);
    s.append(&self.originated);
  }
}

impl Decodable for ValidatorBlockState {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(ValidatorBlockState {
      cheater: rlp.val_at::<u8>(0)? != 0,
      last_event: rlp.val_at(1)?,
      uptime: rlp.val_at(2)?,
      last_online_time: rlp.val_at(3)?,
      last_gas_power_left: rlp.val_at(4)?,
      last_block: rlp.val_at(5)?,
      dirty_gas_refund: rlp.val_at(6)?,
      originated: rlp.val_at(7)?,
    })
  }
}

/// Per-validator bookkeeping carried across one epoch boundary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidatorEpochState {
  pub gas_refund: Gas,
  pub prev_epoch_event: EventId,
}

impl Encodable for ValidatorEpochState {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(2);
    s.append(&self.gas_refund);
    s.append(&self.prev_epoch_event);
  }
}

impl Decodable for ValidatorEpochState {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(ValidatorEpochState {
      gas_refund: rlp.val_at(0)?,
      prev_epoch_event: rlp.val_at(1)?,
    })
  }
}

/// Weight and key of one prospective validator.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidatorProfile {
  pub weight: U256,
  pub pubkey: ValidatorPubkey,
}

impl Encodable for ValidatorProfile {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(2);
    s.append(&self.weight);
    s.append(&self.pubkey);
  }
}

impl Decodable for ValidatorProfile {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(ValidatorProfile {
      weight: rlp.val_at(0)?,
      pubkey: rlp.val_at(1)?,
    })
  }
}

pub type ValidatorProfiles = BTreeMap<ValidatorId, ValidatorProfile>;

fn append_profiles(s: &mut RlpStream, profiles: &ValidatorProfiles) {
  s.begin_list(profiles.len());
  for (id, profile) in profiles {
    s.begin_list(2);
    s.append(id);
    s.append(profile);
  }
}

fn decode_profiles(rlp: &Rlp) -> Result<ValidatorProfiles, DecoderError> {
  let mut profiles = ValidatorProfiles::new();
  for item in rlp.iter() {
    profiles.insert(item.val_at(0)?, item.val_at(1)?);
  }
  Ok(profiles)
}

/// State that evolves with every processed block.
///
/// All fields are plain owned values, so `clone()` yields a fully
/// independent deep copy: the committed snapshot and an in-progress
/// block can never alias each other's allocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockState {
  pub last_block: BlockCtx,
  pub finalized_state_root: Hash,

  /// Gas power consumed by confirmed events since the epoch started.
  pub epoch_gas: Gas,
  /// Double-signers detected since the epoch started, in detection
  /// order, each at most once.
  pub epoch_cheaters: Vec<ValidatorId>,

  pub validator_states: Vec<ValidatorBlockState>,
  /// Validator set staged for the next epoch. Zero-weight writes
  /// delete, so every stored profile has a nonzero weight.
  pub next_validator_profiles: ValidatorProfiles,

  /// Rule changes that become active on the next epoch seal.
  pub dirty_rules: Rules,

  /// Number of additional epoch seals requested by governance.
  pub advance_epochs: u64,
}

impl BlockState {
  pub fn get_validator_state_mut(
    &mut self,
    id: ValidatorId,
    validators: &Validators,
  ) -> Option<&mut ValidatorBlockState> {
    let idx = validators.get_idx(id)?;
    self.validator_states.get_mut(idx as usize)
  }

  /// Checks the invariants that must hold at every block boundary.
  pub fn verify(
    &self,
    validators: &Validators,
  ) -> Result<(), InvariantViolation> {
    if self.validator_states.len() != validators.len() as usize {
      return Err(InvariantViolation::StateCountMismatch {
        found: self.validator_states.len(),
        expected: validators.len() as usize,
      });
    }
    for (i, cheater) in self.epoch_cheaters.iter().enumerate() {
      if !validators.exists(*cheater) {
        return Err(InvariantViolation::UnknownCheater(*cheater));
      }
      if self.epoch_cheaters[..i].contains(cheater) {
        return Err(InvariantViolation::DuplicateCheater(*cheater));
      }
    }
    for (id, profile) in &self.next_validator_profiles {
      if profile.weight.is_zero() {
        return Err(InvariantViolation::ZeroWeightProfile(*id));
      }
    }
    if self.advance_epochs > MAX_ADVANCE_EPOCHS {
      return Err(InvariantViolation::AdvanceEpochsOverflow(
        self.advance_epochs,
      ));
    }
    Ok(())
  }
}

impl Encodable for BlockState {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(8);
    s.append(&self.last_block);
    s.append(&self.finalized_state_root);
    s.append(&self.epoch_gas);
    s.append_list(&self.epoch_cheaters);
    s.append_list(&self.validator_states);
    append_profiles(s, &self.next_validator_profiles);
    s.append(&self.dirty_rules);
    s.append(&self.advance_epochs);
  }
}

impl Decodable for BlockState {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(BlockState {
      last_block: rlp.val_at(0)?,
      finalized_state_root: rlp.val_at(1)?,
      epoch_gas: rlp.val_at(2)?,
      epoch_cheaters: rlp.list_at(3)?,
      validator_states: rlp.list_at(4)?,
      next_validator_profiles: decode_profiles(&rlp.at(5)?)?,
      dirty_rules: rlp.val_at(6)?,
      advance_epochs: rlp.val_at(7)?,
    })
  }
}

/// State that is immutable within an epoch and replaced atomically
/// when the epoch seals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochState {
  pub epoch: Epoch,
  pub epoch_start: Timestamp,
  pub prev_epoch_start: Timestamp,

  /// State root the epoch started from.
  pub epoch_state_root: Hash,

  pub validators: Validators,
  pub validator_states: Vec<ValidatorEpochState>,
  pub validator_profiles: ValidatorProfiles,

  pub rules: Rules,
}

impl EpochState {
  /// Length of the previous epoch, in nanoseconds.
  pub fn duration(&self) -> u64 {
    self.epoch_start - self.prev_epoch_start
  }

  pub fn get_validator_state(
    &self,
    id: ValidatorId,
  ) -> Option<&ValidatorEpochState> {
    let idx = self.validators.get_idx(id)?;
    self.validator_states.get(idx as usize)
  }

  pub fn verify(&self) -> Result<(), InvariantViolation> {
    if self.validator_states.len() != self.validators.len() as usize {
      return Err(InvariantViolation::StateCountMismatch {
        found: self.validator_states.len(),
        expected: self.validators.len() as usize,
      });
    }
    if self.epoch_start < self.prev_epoch_start {
      return Err(InvariantViolation::EpochStartRegression);
    }
    Ok(())
  }

  /// Content hash of the epoch state, used as the epoch's identity.
  pub fn hash(&self) -> Hash {
    let digest = Sha256::digest(rlp::encode(self));
    H256::from_slice(&digest)
  }
}

impl Encodable for EpochState {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(8);
    s.append(&self.epoch);
    s.append(&self.epoch_start);
    s.append(&self.prev_epoch_start);
    s.append(&self.epoch_state_root);
    s.append(&self.validators);
    s.append_list(&self.validator_states);
    append_profiles(s, &self.validator_profiles);
    s.append(&self.rules);
  }
}

impl Decodable for EpochState {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(EpochState {
      epoch: rlp.val_at(0)?,
      epoch_start: rlp.val_at(1)?,
      prev_epoch_start: rlp.val_at(2)?,
      epoch_state_root: rlp.val_at(3)?,
      validators: rlp.val_at(4)?,
      validator_states: rlp.list_at(5)?,
      validator_profiles: decode_profiles(&rlp.at(6)?)?,
      rules: rlp.val_at(7)?,
    })
  }
}
