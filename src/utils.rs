use ethereum_types::U256;

/// Converts whole SKH to wei.
pub fn to_skh(skh: u64) -> U256 {
  U256::from(skh) * U256::from(10).pow(18.into())
}
