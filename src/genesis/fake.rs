//! Deterministic fake-net genesis for tests and local networks.

use {
  super::{Account, Block, Delegation, Genesis, Metadata, Validator},
  crate::{
    driver,
    primitives::{Timestamp, ValidatorId, ValidatorPubkey},
    rules::Rules,
  },
  ethereum_types::{Address, U256},
  keccak_hash::keccak,
  secp256k1::{PublicKey, Secp256k1, SecretKey},
};

pub const FAKE_GENESIS_TIME: Timestamp = Timestamp(1_608_600_000_000_000_000);

const NANOS_PER_HOUR: u64 = 60 * 60 * 1_000_000_000;
const NANOS_PER_MIN: u64 = 60 * 1_000_000_000;

/// The n-th fake validator key, derived deterministically so that
/// every node of a fake net agrees on the validator set.
pub fn fake_key(n: u32) -> SecretKey {
  let mut seed = keccak(format!("fakevalidator{}", n));
  loop {
    match SecretKey::from_slice(seed.as_bytes()) {
      Ok(key) => return key,
      Err(_) => seed = keccak(seed.as_bytes()),
    }
  }
}

fn key_material(n: u32) -> (Address, ValidatorPubkey) {
  let secp = Secp256k1::new();
  let pubkey = PublicKey::from_secret_key(&secp, &fake_key(n));
  let uncompressed = pubkey.serialize_uncompressed();
  let address = Address::from_slice(&keccak(&uncompressed[1..]).as_bytes()[12..]);
  let pubkey = ValidatorPubkey {
    ptype: ValidatorPubkey::TYPE_SECP256K1,
    raw: uncompressed.to_vec(),
  };
  (address, pubkey)
}

pub fn fake_validators(num: u32) -> Vec<Validator> {
  (1..=num)
    .map(|n| {
      let (address, pubkey) = key_material(n);
      Validator {
        id: n as ValidatorId,
        address,
        pubkey,
        creation_time: FAKE_GENESIS_TIME,
        creation_epoch: 0,
        deactivated_time: Timestamp::default(),
        deactivated_epoch: 0,
        status: 0,
      }
    })
    .collect()
}

/// Builds a complete fake-net genesis with `num` validators, each
/// holding `balance` wei and self-delegating `stake`.
pub fn fake_genesis(num: u32, balance: U256, stake: U256) -> Genesis {
  let validators = fake_validators(num);

  let mut total_supply = U256::zero();
  for _ in &validators {
    total_supply += balance;
  }

  let driver_owner = validators
    .first()
    .map(|v| v.address)
    .unwrap_or_default();

  let metadata = Metadata {
    validators: validators.clone(),
    first_epoch: 2,
    time: FAKE_GENESIS_TIME,
    prev_epoch_time: Timestamp(FAKE_GENESIS_TIME.nanos() - NANOS_PER_HOUR),
    extra_data: b"fake".to_vec(),
    driver_owner,
    total_supply,
  };

  let mut g = Genesis::new(metadata, Rules::fake_net_rules());

  for v in &validators {
    g.set_evm_account(
      v.address,
      Account {
        code: vec![],
        balance,
        nonce: 0,
        self_destruct: false,
      },
    );
    g.set_delegation(
      v.address,
      v.id,
      Delegation {
        stake,
        ..Default::default()
      },
    );
  }

  g.set_block(
    0,
    Block {
      time: Timestamp(FAKE_GENESIS_TIME.nanos() - NANOS_PER_MIN),
      ..Default::default()
    },
  );

  // pre-deploy the system contracts; stand-in runtime code here, a
  // production genesis ships the compiled contracts
  for address in [
    *driver::NETINIT_CONTRACT_ADDRESS,
    *driver::CONTRACT_ADDRESS,
    *driver::AUTH_CONTRACT_ADDRESS,
    *driver::SFC_CONTRACT_ADDRESS,
  ] {
    g.set_evm_account(
      address,
      Account {
        code: keccak(address.as_bytes()).as_bytes().to_vec(),
        balance: U256::zero(),
        nonce: 0,
        self_destruct: false,
      },
    );
  }
  // non-zero code marker for the EVM-writer precompile
  g.set_evm_account(
    *driver::EVM_WRITER_CONTRACT_ADDRESS,
    Account {
      code: vec![0],
      balance: U256::zero(),
      nonce: 0,
      self_destruct: false,
    },
  );

  g
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn fake_genesis_is_deterministic() {
    let a = fake_genesis(3, U256::from(10).pow(21.into()), U256::from(100));
    let b = fake_genesis(3, U256::from(10).pow(21.into()), U256::from(100));
    assert_eq!(a.hash(), b.hash());

    let c = fake_genesis(4, U256::from(10).pow(21.into()), U256::from(100));
    assert_ne!(a.hash(), c.hash());
  }

  #[test]
  fn validators_have_distinct_identities() {
    let validators = fake_validators(5);
    for (i, v) in validators.iter().enumerate() {
      assert_eq!(v.id as usize, i + 1);
      assert!(!v.address.is_zero());
      assert_eq!(v.pubkey.raw.len(), 65);
      for other in &validators[i + 1..] {
        assert_ne!(v.address, other.address);
      }
    }
  }

  #[test]
  fn genesis_funds_and_stakes_every_validator() {
    let balance = U256::from(10).pow(21.into());
    let g = fake_genesis(3, balance, U256::from(500));

    assert_eq!(g.metadata.total_supply, balance * U256::from(3u64));
    for v in &g.metadata.validators {
      assert_eq!(g.stake_of(v.id), U256::from(500));
    }
    assert_eq!(g.metadata.first_epoch, 2);
  }
}
