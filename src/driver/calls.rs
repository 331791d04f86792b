//! Calldata builders for the transactions this core injects into the
//! driver and network-initializer contracts.

use {
  crate::{
    genesis::{Delegation, Validator},
    primitives::{BlockIdx, ValidatorId},
  },
  ethabi::{encode, param_type::Writer, ParamType, Token},
  ethereum_types::{Address, U256},
  thiserror::Error,
};

/// Equivalent to `ethabi`'s internal (non-public) `short_signature` helper:
/// the first four bytes of the keccak256 hash of the canonical function
/// signature `name(type1,type2,...)`.
fn short_signature(name: &str, params: &[ParamType]) -> [u8; 4] {
  let types = params.iter().map(Writer::write).collect::<Vec<String>>().join(",");
  let hash = keccak_hash::keccak(format!("{}({})", name, types).as_bytes());
  let mut out = [0u8; 4];
  out.copy_from_slice(&hash.as_bytes()[..4]);
  out
}

#[derive(Debug, Error)]
pub enum AbiError {
  #[error("unexpected end of ABI data")]
  UnexpectedEof,
}

/// Downtime of a validator, as reported to the driver on epoch seal.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlocksMissed {
  pub num: BlockIdx,
  /// Nanoseconds the validator was offline.
  pub period: u64,
}

/// Per-validator epoch summary pushed into the driver by `sealEpoch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorEpochMetric {
  pub missed: BlocksMissed,
  /// Accumulated online time, in nanoseconds.
  pub uptime: u64,
  pub originated_tx_fee: U256,
}

fn call(name: &str, params: &[ParamType], args: &[Token]) -> Vec<u8> {
  let mut data = short_signature(name, params).to_vec();
  data.extend(encode(args));
  data
}

fn uint(value: impl Into<U256>) -> Token {
  Token::Uint(value.into())
}

pub fn initialize_all(
  sealed_epoch: u64,
  total_supply: U256,
  sfc: Address,
  auth: Address,
  driver: Address,
  evm_writer: Address,
  owner: Address,
) -> Vec<u8> {
  call(
    "initializeAll",
    &[
      ParamType::Uint(256),
      ParamType::Uint(256),
      ParamType::Address,
      ParamType::Address,
      ParamType::Address,
      ParamType::Address,
      ParamType::Address,
    ],
    &[
      uint(sealed_epoch),
      Token::Uint(total_supply),
      Token::Address(sfc),
      Token::Address(auth),
      Token::Address(driver),
      Token::Address(evm_writer),
      Token::Address(owner),
    ],
  )
}

pub fn set_genesis_validator(v: &Validator) -> Vec<u8> {
  call(
    "setGenesisValidator",
    &[
      ParamType::Address,
      ParamType::Uint(256),
      ParamType::Bytes,
      ParamType::Uint(256),
      ParamType::Uint(256),
      ParamType::Uint(256),
      ParamType::Uint(256),
      ParamType::Uint(256),
    ],
    &[
      Token::Address(v.address),
      uint(v.id),
      Token::Bytes(v.pubkey.to_bytes()),
      uint(v.status),
      uint(v.creation_epoch),
      uint(v.creation_time.nanos()),
      uint(v.deactivated_epoch),
      uint(v.deactivated_time.nanos()),
    ],
  )
}

pub fn set_genesis_delegation(
  delegator: Address,
  to_validator: ValidatorId,
  delegation: &Delegation,
) -> Vec<u8> {
  call(
    "setGenesisDelegation",
    &[
      ParamType::Address,
      ParamType::Uint(256),
      ParamType::Uint(256),
      ParamType::Uint(256),
      ParamType::Uint(256),
      ParamType::Uint(256),
      ParamType::Uint(256),
      ParamType::Uint(256),
      ParamType::Uint(256),
    ],
    &[
      Token::Address(delegator),
      uint(to_validator),
      Token::Uint(delegation.stake),
      Token::Uint(delegation.locked_stake),
      uint(delegation.lockup_from_epoch),
      uint(delegation.lockup_end_time.nanos()),
      uint(delegation.lockup_duration),
      Token::Uint(delegation.early_unlock_penalty),
      Token::Uint(delegation.rewards),
    ],
  )
}

pub fn deactivate_validator(id: ValidatorId, status: u64) -> Vec<u8> {
  call(
    "deactivateValidator",
    &[ParamType::Uint(256), ParamType::Uint(256)],
    &[uint(id), uint(status)],
  )
}

pub fn seal_epoch(metrics: &[ValidatorEpochMetric]) -> Vec<u8> {
  let offline_times: Vec<Token> =
    metrics.iter().map(|m| uint(m.missed.period)).collect();
  let offline_blocks: Vec<Token> =
    metrics.iter().map(|m| uint(m.missed.num)).collect();
  let uptimes: Vec<Token> = metrics.iter().map(|m| uint(m.uptime)).collect();
  let originated_fees: Vec<Token> = metrics
    .iter()
    .map(|m| Token::Uint(m.originated_tx_fee))
    .collect();

  let array = ParamType::Array(Box::new(ParamType::Uint(256)));
  call(
    "sealEpoch",
    &[array.clone(), array.clone(), array.clone(), array],
    &[
      Token::Array(offline_times),
      Token::Array(offline_blocks),
      Token::Array(uptimes),
      Token::Array(originated_fees),
    ],
  )
}

pub fn seal_epoch_validators(ids: &[ValidatorId]) -> Vec<u8> {
  call(
    "sealEpochValidators",
    &[ParamType::Array(Box::new(ParamType::Uint(256)))],
    &[Token::Array(ids.iter().map(|id| uint(*id)).collect())],
  )
}

/// Extracts a dynamic `bytes` payload from driver log data.
///
/// The layout is the standard ABI encoding of a single `bytes`
/// argument: an offset word, a length word at the offset, then the
/// payload. Any read past the buffer is malformed.
pub fn decode_data_bytes(data: &[u8]) -> Result<&[u8], AbiError> {
  let len = data.len() as u64;
  if len < 32 {
    return Err(AbiError::UnexpectedEof);
  }
  let mut word = [0u8; 8];
  word.copy_from_slice(&data[24..32]);
  let start = u64::from_be_bytes(word);
  if start.checked_add(32).map_or(true, |end| end > len) {
    return Err(AbiError::UnexpectedEof);
  }
  word.copy_from_slice(&data[start as usize + 24..start as usize + 32]);
  let size = u64::from_be_bytes(word);
  if start
    .checked_add(32)
    .and_then(|s| s.checked_add(size))
    .map_or(true, |end| end > len)
  {
    return Err(AbiError::UnexpectedEof);
  }
  let payload_start = (start + 32) as usize;
  Ok(&data[payload_start..payload_start + size as usize])
}

/// ABI-encodes a dynamic `bytes` payload the way the driver contract
/// emits it in log data.
pub fn encode_data_bytes(payload: &[u8]) -> Vec<u8> {
  encode(&[Token::Bytes(payload.to_vec())])
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn data_bytes_roundtrip() {
    let payload = b"hello driver".to_vec();
    let encoded = encode_data_bytes(&payload);
    assert_eq!(decode_data_bytes(&encoded).unwrap(), &payload[..]);
  }

  #[test]
  fn data_bytes_rejects_truncation() {
    assert!(decode_data_bytes(&[]).is_err());
    assert!(decode_data_bytes(&[0u8; 31]).is_err());

    // offset word pointing past the end
    let mut data = vec![0u8; 40];
    data[31] = 200;
    assert!(decode_data_bytes(&data).is_err());

    // length word overselling the payload
    let mut data = encode_data_bytes(b"abc");
    data[63] = 0xff;
    assert!(decode_data_bytes(&data).is_err());
  }

  #[test]
  fn calldata_starts_with_selector() {
    let data = deactivate_validator(3, crate::driver::DOUBLESIGN_BIT);
    assert_eq!(data.len(), 4 + 2 * 32);

    let ids = seal_epoch_validators(&[1, 2, 3]);
    // selector + offset + length + 3 elements
    assert_eq!(ids.len(), 4 + 32 * 5);
  }
}
