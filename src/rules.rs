use {
  crate::primitives::{BlockIdx, Gas},
  ethereum_types::U256,
  rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream},
  serde::{Deserialize, Serialize},
  thiserror::Error,
};

/// Gas cost charged for an event itself.
pub const DEFAULT_EVENT_GAS: Gas = 28_000;

/// Gas cost charged per event parent above the free allowance.
pub const DEFAULT_PARENT_GAS: Gas = 2_400;

/// Gas cost charged per byte of event extra data.
pub const DEFAULT_EXTRA_DATA_GAS: Gas = 25;

/// Maximum amount of gas a single event may carry.
pub const DEFAULT_MAX_EVENT_GAS: Gas = 10_000_000 + DEFAULT_EVENT_GAS;

const NANOS_PER_SEC: u64 = 1_000_000_000;

#[derive(Debug, Error)]
pub enum RulesError {
  #[error("rules diff is not a JSON object")]
  NotAnObject,

  #[error("malformed rules diff: {0}")]
  Malformed(#[from] serde_json::Error),
}

/// Consensus-critical network parameters.
///
/// Rules are part of the epoch state: every node derives the same
/// rules for the same epoch, and rule changes staged by the driver
/// contract only become active when the epoch is sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Rules {
  pub name: String,
  #[serde(rename = "NetworkID")]
  pub net_id: u64,
  pub epochs: EpochsRules,
  pub economy: EconomyRules,
  pub dag: DagRules,
  pub upgrades: Upgrades,
}

/// Thresholds that force an epoch seal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EpochsRules {
  pub max_epoch_gas: Gas,
  /// Maximum epoch length in nanoseconds.
  pub max_epoch_duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EconomyRules {
  pub min_gas_price: U256,
  pub block_missed_slack: u64,
  pub gas: GasRules,
  pub short_gas_power: GasPowerRules,
  pub long_gas_power: GasPowerRules,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GasRules {
  pub event_gas: Gas,
  pub parent_gas: Gas,
  pub extra_data_gas: Gas,
  pub max_event_gas: Gas,
}

/// Regeneration parameters of one gas power lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GasPowerRules {
  pub alloc_per_sec: Gas,
  /// Maximum accumulation period in nanoseconds.
  pub max_alloc_period: u64,
  /// Accumulation period granted to a validator with no prior events,
  /// in nanoseconds.
  pub startup_alloc_period: u64,
  pub min_startup_gas: Gas,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DagRules {
  pub max_parents: u32,
  pub max_free_parents: u32,
  pub max_extra_data: u32,
}

/// Hard-fork switches. New upgrades are appended as further flags;
/// absent fields in a rules diff leave the current value untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Upgrades {
  pub berlin: bool,
}

/// Parameters the EVM executor derives from the network rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmChainConfig {
  pub chain_id: u64,
  pub berlin_block: Option<BlockIdx>,
}

fn default_long_gas_power() -> GasPowerRules {
  GasPowerRules {
    alloc_per_sec: 100 * DEFAULT_EVENT_GAS,
    max_alloc_period: 60 * 60 * NANOS_PER_SEC,
    startup_alloc_period: 5 * NANOS_PER_SEC,
    min_startup_gas: DEFAULT_EVENT_GAS * 20,
  }
}

fn default_short_gas_power() -> GasPowerRules {
  // twice the allocation rate of the long lane, but a far smaller
  // accumulation window
  let mut rules = default_long_gas_power();
  rules.alloc_per_sec *= 2;
  rules.max_alloc_period /= 12;
  rules
}

fn default_economy() -> EconomyRules {
  EconomyRules {
    min_gas_price: U256::from(1_000_000_000u64),
    block_missed_slack: 50,
    gas: GasRules {
      event_gas: DEFAULT_EVENT_GAS,
      parent_gas: DEFAULT_PARENT_GAS,
      extra_data_gas: DEFAULT_EXTRA_DATA_GAS,
      max_event_gas: DEFAULT_MAX_EVENT_GAS,
    },
    short_gas_power: default_short_gas_power(),
    long_gas_power: default_long_gas_power(),
  }
}

fn default_dag() -> DagRules {
  DagRules {
    max_parents: 10,
    max_free_parents: 3,
    max_extra_data: 128,
  }
}

impl Rules {
  pub fn main_net_rules() -> Rules {
    Rules {
      name: "main".to_string(),
      net_id: 1,
      epochs: EpochsRules {
        max_epoch_gas: 1_500_000_000,
        max_epoch_duration: 4 * 60 * 60 * NANOS_PER_SEC,
      },
      economy: default_economy(),
      dag: default_dag(),
      upgrades: Upgrades { berlin: true },
    }
  }

  pub fn fake_net_rules() -> Rules {
    let mut rules = Rules::main_net_rules();
    rules.name = "fake".to_string();
    rules.net_id = 0xfa3;
    rules.epochs.max_epoch_duration = 10 * 60 * NANOS_PER_SEC;
    rules
  }

  /// Applies a merge-patch style diff emitted by the driver contract.
  ///
  /// Fields present in the diff replace the current value, absent
  /// fields are preserved, nested objects are merged recursively. Any
  /// type mismatch or out-of-range value rejects the whole diff and
  /// leaves the rules unchanged on the caller's side.
  pub fn apply_diff(&self, diff: &[u8]) -> Result<Rules, RulesError> {
    let patch: serde_json::Value = serde_json::from_slice(diff)?;
    if !patch.is_object() {
      return Err(RulesError::NotAnObject);
    }
    let mut doc = serde_json::to_value(self)?;
    merge_value(&mut doc, patch);
    Ok(serde_json::from_value(doc)?)
  }

  pub fn evm_chain_config(&self) -> EvmChainConfig {
    EvmChainConfig {
      chain_id: self.net_id,
      berlin_block: self.upgrades.berlin.then(|| 0),
    }
  }
}

fn merge_value(base: &mut serde_json::Value, patch: serde_json::Value) {
  match (base, patch) {
    (serde_json::Value::Object(base), serde_json::Value::Object(patch)) => {
      for (key, value) in patch {
        match base.get_mut(&key) {
          Some(slot) => merge_value(slot, value),
          None => {
            base.insert(key, value);
          }
        }
      }
    }
    (slot, value) => *slot = value,
  }
}

impl Encodable for Rules {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(6);
    s.append(&self.name);
    s.append(&self.net_id);
    s.append(&self.epochs);
    s.append(&self.economy);
    s.append(&self.dag);
    s.append(&self.upgrades);
  }
}

impl Decodable for Rules {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(Rules {
      name: rlp.val_at(0)?,
      net_id: rlp.val_at(1)?,
      epochs: rlp.val_at(2)?,
      economy: rlp.val_at(3)?,
      dag: rlp.val_at(4)?,
      upgrades: rlp.val_at(5)?,
    })
  }
}

impl Encodable for EpochsRules {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(2);
    s.append(&self.max_epoch_gas);
    s.append(&self.max_epoch_duration);
  }
}

impl Decodable for EpochsRules {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(EpochsRules {
      max_epoch_gas: rlp.val_at(0)?,
      max_epoch_duration: rlp.val_at(1)?,
    })
  }
}

impl Encodable for EconomyRules {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(5);
    s.append(&self.min_gas_price);
    s.append(&self.block_missed_slack);
    s.append(&self.gas);
    s.append(&self.short_gas_power);
    s.append(&self.long_gas_power);
  }
}

impl Decodable for EconomyRules {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(EconomyRules {
      min_gas_price: rlp.val_at(0)?,
      block_missed_slack: rlp.val_at(1)?,
      gas: rlp.val_at(2)?,
      short_gas_power: rlp.val_at(3)?,
      long_gas_power: rlp.val_at(4)?,
    })
  }
}

impl Encodable for GasRules {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(4);
    s.append(&self.event_gas);
    s.append(&self.parent_gas);
    s.append(&self.extra_data_gas);
    s.append(&self.max_event_gas);
  }
}

impl Decodable for GasRules {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(GasRules {
      event_gas: rlp.val_at(0)?,
      parent_gas: rlp.val_at(1)?,
      extra_data_gas: rlp.val_at(2)?,
      max_event_gas: rlp.val_at(3)?,
    })
  }
}

impl Encodable for GasPowerRules {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(4);
    s.append(&self.alloc_per_sec);
    s.append(&self.max_alloc_period);
    s.append(&self.startup_alloc_period);
    s.append(&self.min_startup_gas);
  }
}

impl Decodable for GasPowerRules {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(GasPowerRules {
      alloc_per_sec: rlp.val_at(0)?,
      max_alloc_period: rlp.val_at(1)?,
      startup_alloc_period: rlp.val_at(2)?,
      min_startup_gas: rlp.val_at(3)?,
    })
  }
}

impl Encodable for DagRules {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(3);
    s.append(&self.max_parents);
    s.append(&self.max_free_parents);
    s.append(&self.max_extra_data);
  }
}

impl Decodable for DagRules {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(DagRules {
      max_parents: rlp.val_at(0)?,
      max_free_parents: rlp.val_at(1)?,
      max_extra_data: rlp.val_at(2)?,
    })
  }
}

impl Encodable for Upgrades {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(1);
    s.append(&(self.berlin as u8));
  }
}

impl Decodable for Upgrades {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(Upgrades {
      berlin: rlp.val_at::<u8>(0)? != 0,
    })
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn diff_replaces_present_and_preserves_absent() {
    let rules = Rules::fake_net_rules();
    let diff = br#"{"Epochs":{"MaxEpochGas":420}}"#;
    let updated = rules.apply_diff(diff).unwrap();

    assert_eq!(updated.epochs.max_epoch_gas, 420);
    assert_eq!(
      updated.epochs.max_epoch_duration,
      rules.epochs.max_epoch_duration
    );
    assert_eq!(updated.economy, rules.economy);
    assert_eq!(updated.name, rules.name);
  }

  #[test]
  fn diff_recurses_into_nested_objects() {
    let rules = Rules::fake_net_rules();
    let diff = br#"{"Economy":{"BlockMissedSlack":7},"Upgrades":{"Berlin":false}}"#;
    let updated = rules.apply_diff(diff).unwrap();

    assert_eq!(updated.economy.block_missed_slack, 7);
    assert_eq!(updated.economy.gas, rules.economy.gas);
    assert!(!updated.upgrades.berlin);
  }

  #[test]
  fn invalid_diff_is_rejected_as_a_whole() {
    let rules = Rules::fake_net_rules();

    // negative value for an unsigned field
    assert!(rules
      .apply_diff(br#"{"Epochs":{"MaxEpochGas":-1}}"#)
      .is_err());
    // scalar where an object is expected
    assert!(rules.apply_diff(br#"{"Epochs":3}"#).is_err());
    // not an object at all
    assert!(rules.apply_diff(br#"[1,2,3]"#).is_err());
    // truncated document
    assert!(rules.apply_diff(br#"{"Epochs"#).is_err());
  }

  #[test]
  fn rlp_roundtrip() {
    let rules = Rules::main_net_rules();
    let decoded: Rules = rlp::decode(&rlp::encode(&rules)).unwrap();
    assert_eq!(decoded, rules);
  }

  #[test]
  fn chain_config_tracks_upgrades() {
    let mut rules = Rules::fake_net_rules();
    assert_eq!(rules.evm_chain_config().berlin_block, Some(0));
    rules.upgrades.berlin = false;
    assert_eq!(rules.evm_chain_config().berlin_block, None);
    assert_eq!(rules.evm_chain_config().chain_id, rules.net_id);
  }
}
