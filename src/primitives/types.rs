use {
  ethereum_types::H256,
  rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream},
  serde::{Deserialize, Serialize},
  std::ops::{Add, AddAssign, Sub},
};

/// Monotonically increasing number of an epoch. Epochs are ranges of
/// blocks that share one validator set and one set of network rules.
pub type Epoch = u64;

/// Position of a block in the chain.
pub type BlockIdx = u64;

/// Stable identity of a validator, assigned by the staking contract
/// when the validator is created and never reused.
pub type ValidatorId = u32;

/// Index of a validator inside the current epoch's validator set.
/// Unlike [`ValidatorId`], indices are reassigned on every epoch seal.
pub type ValidatorIdx = u32;

/// Amount of gas, either consumed or still allocatable.
pub type Gas = u64;

/// Hash that identifies an event in the DAG.
pub type EventId = H256;

/// Generic 32-byte content hash (state roots, genesis hash, etc).
pub type Hash = H256;

/// A point in time with nanosecond precision.
///
/// All consensus-visible time values are median times derived from
/// event parents, never wall-clock reads, so identical inputs yield
/// identical timestamps on every node.
#[derive(
  Debug,
  Default,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
  pub const fn nanos(self) -> u64 {
    self.0
  }

  pub fn from_unix(secs: u64) -> Self {
    Self(secs * 1_000_000_000)
  }
}

impl Add<u64> for Timestamp {
  type Output = Timestamp;

  fn add(self, rhs: u64) -> Timestamp {
    Timestamp(self.0.saturating_add(rhs))
  }
}

impl AddAssign<u64> for Timestamp {
  fn add_assign(&mut self, rhs: u64) {
    self.0 = self.0.saturating_add(rhs);
  }
}

/// Difference of two timestamps, in nanoseconds. Saturates at zero
/// instead of wrapping, times earlier than the subtrahend yield 0.
impl Sub for Timestamp {
  type Output = u64;

  fn sub(self, rhs: Timestamp) -> u64 {
    self.0.saturating_sub(rhs.0)
  }
}

impl Encodable for Timestamp {
  fn rlp_append(&self, s: &mut RlpStream) {
    self.0.rlp_append(s);
  }
}

impl Decodable for Timestamp {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(Timestamp(u64::decode(rlp)?))
  }
}

/// Index of the short-term lane in a gas power vector.
pub const SHORT_TERM_GAS: usize = 0;

/// Index of the long-term lane in a gas power vector.
pub const LONG_TERM_GAS: usize = 1;

/// Number of gas power lanes.
pub const GAS_POWER_CONFIGS: usize = 2;

/// Remaining gas power of a validator, one value per lane.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GasPowerLeft {
  pub gas: [Gas; GAS_POWER_CONFIGS],
}

impl GasPowerLeft {
  pub fn min(&self) -> Gas {
    self.gas[SHORT_TERM_GAS].min(self.gas[LONG_TERM_GAS])
  }
}

impl Encodable for GasPowerLeft {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(GAS_POWER_CONFIGS);
    for lane in &self.gas {
      s.append(lane);
    }
  }
}

impl Decodable for GasPowerLeft {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    if rlp.item_count()? != GAS_POWER_CONFIGS {
      return Err(DecoderError::RlpIncorrectListLen);
    }
    Ok(GasPowerLeft {
      gas: [rlp.val_at(0)?, rlp.val_at(1)?],
    })
  }
}

#[derive(Debug, thiserror::Error)]
pub enum PubkeyError {
  #[error("empty pubkey")]
  Empty,
}

/// Serialized public key of a validator, prefixed with a type tag.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidatorPubkey {
  pub ptype: u8,
  pub raw: Vec<u8>,
}

impl ValidatorPubkey {
  pub const TYPE_SECP256K1: u8 = 0xc0;

  /// Parses the `type || raw` wire form emitted by the driver contract.
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, PubkeyError> {
    match bytes.split_first() {
      None => Err(PubkeyError::Empty),
      Some((ptype, raw)) => Ok(Self {
        ptype: *ptype,
        raw: raw.to_vec(),
      }),
    }
  }

  pub fn to_bytes(&self) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + self.raw.len());
    out.push(self.ptype);
    out.extend_from_slice(&self.raw);
    out
  }

  pub fn is_empty(&self) -> bool {
    self.raw.is_empty()
  }
}

impl Encodable for ValidatorPubkey {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(2);
    s.append(&self.ptype);
    s.append(&self.raw);
  }
}

impl Decodable for ValidatorPubkey {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(ValidatorPubkey {
      ptype: rlp.val_at(0)?,
      raw: rlp.val_at(1)?,
    })
  }
}
