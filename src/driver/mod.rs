//! On-chain surface of the node driver contract.
//!
//! The driver is the bridge between the protocol and the on-chain
//! governance: the core injects calls into it (epoch seals, validator
//! deactivations) and interprets the logs it emits (weight, pubkey and
//! rule changes, epoch advance requests).

pub mod calls;

use {
  ethereum_types::{Address, H256},
  keccak_hash::keccak,
  once_cell::sync::Lazy,
};

/// Status bit the driver sets on a validator caught double-signing.
pub const DOUBLESIGN_BIT: u64 = 1 << 7;

fn addr(hex_str: &str) -> Address {
  Address::from_slice(&hex::decode(hex_str).unwrap())
}

/// The driver contract itself; the only address whose logs the block
/// processor interprets.
pub static CONTRACT_ADDRESS: Lazy<Address> =
  Lazy::new(|| addr("d100a01e00000000000000000000000000000000"));

/// Authorization wrapper that owns the driver.
pub static AUTH_CONTRACT_ADDRESS: Lazy<Address> =
  Lazy::new(|| addr("d100ae0000000000000000000000000000000000"));

/// Staking (special fee) contract.
pub static SFC_CONTRACT_ADDRESS: Lazy<Address> =
  Lazy::new(|| addr("fc00face00000000000000000000000000000000"));

/// One-shot initializer that wires the system contracts together at
/// genesis and self-destructs.
pub static NETINIT_CONTRACT_ADDRESS: Lazy<Address> =
  Lazy::new(|| addr("d1005ea700000000000000000000000000000000"));

/// Precompile that lets the driver write EVM state directly.
pub static EVM_WRITER_CONTRACT_ADDRESS: Lazy<Address> =
  Lazy::new(|| addr("d100ec0000000000000000000000000000000000"));

/// Log topics of the driver events the block processor consumes.
pub mod topics {
  use super::*;

  pub static UPDATE_VALIDATOR_WEIGHT: Lazy<H256> =
    Lazy::new(|| keccak("UpdateValidatorWeight(uint256,uint256)"));

  pub static UPDATE_VALIDATOR_PUBKEY: Lazy<H256> =
    Lazy::new(|| keccak("UpdateValidatorPubkey(uint256,bytes)"));

  pub static UPDATE_NETWORK_RULES: Lazy<H256> =
    Lazy::new(|| keccak("UpdateNetworkRules(bytes)"));

  pub static ADVANCE_EPOCHS: Lazy<H256> =
    Lazy::new(|| keccak("AdvanceEpochs(uint256)"));
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn addresses_are_distinct() {
    let all = [
      *CONTRACT_ADDRESS,
      *AUTH_CONTRACT_ADDRESS,
      *SFC_CONTRACT_ADDRESS,
      *NETINIT_CONTRACT_ADDRESS,
      *EVM_WRITER_CONTRACT_ADDRESS,
    ];
    for (i, a) in all.iter().enumerate() {
      assert!(!a.is_zero());
      for b in &all[i + 1..] {
        assert_ne!(a, b);
      }
    }
  }

  #[test]
  fn topics_are_distinct() {
    assert_ne!(
      *topics::UPDATE_VALIDATOR_WEIGHT,
      *topics::UPDATE_VALIDATOR_PUBKEY
    );
    assert_ne!(*topics::UPDATE_NETWORK_RULES, *topics::ADVANCE_EPOCHS);
  }
}
