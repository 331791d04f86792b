use {
  super::types::{ValidatorId, ValidatorIdx},
  ethereum_types::U256,
  rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream},
  std::collections::BTreeMap,
};

/// Immutable weighted set of validators for one epoch.
///
/// The set fixes a canonical ordering by `(weight desc, id asc)` and
/// assigns each validator a dense index `0..len`. All per-validator
/// bookkeeping in the block and epoch state is stored in vectors
/// addressed by this index, so the ordering must be identical on every
/// node.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Validators {
  ids: Vec<ValidatorId>,
  weights: Vec<u64>,
  indices: BTreeMap<ValidatorId, ValidatorIdx>,
  total_weight: u64,
}

impl Validators {
  pub fn len(&self) -> ValidatorIdx {
    self.ids.len() as ValidatorIdx
  }

  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }

  pub fn exists(&self, id: ValidatorId) -> bool {
    self.indices.contains_key(&id)
  }

  pub fn get_idx(&self, id: ValidatorId) -> Option<ValidatorIdx> {
    self.indices.get(&id).copied()
  }

  pub fn get_id(&self, idx: ValidatorIdx) -> ValidatorId {
    self.ids[idx as usize]
  }

  pub fn get_weight(&self, idx: ValidatorIdx) -> u64 {
    self.weights[idx as usize]
  }

  pub fn total_weight(&self) -> u64 {
    self.total_weight
  }

  /// Validator ids in canonical order (weight desc, id asc).
  pub fn sorted_ids(&self) -> &[ValidatorId] {
    &self.ids
  }

  pub fn idxs(&self) -> impl Iterator<Item = ValidatorIdx> {
    0..self.len()
  }

  fn from_sorted_pairs(pairs: Vec<(ValidatorId, u64)>) -> Self {
    let mut set = Validators::default();
    for (idx, (id, weight)) in pairs.into_iter().enumerate() {
      set.ids.push(id);
      set.weights.push(weight);
      set.indices.insert(id, idx as ValidatorIdx);
      set.total_weight = set.total_weight.saturating_add(weight);
    }
    set
  }
}

/// Accumulates prospective validators with arbitrary-precision stake
/// weights and builds a [`Validators`] set out of them.
///
/// Stakes are tracked on-chain as wei amounts that do not fit u64, so
/// the builder scales all weights down by a uniform power of two until
/// the largest fits. Relative ordering is preserved; a weight that
/// scales down to zero is clamped to 1 so the validator keeps its slot.
#[derive(Debug, Default)]
pub struct ValidatorsBuilder {
  weights: BTreeMap<ValidatorId, U256>,
}

impl ValidatorsBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Stages a validator with the given weight. A zero weight removes
  /// the validator from the prospective set.
  pub fn set(&mut self, id: ValidatorId, weight: U256) {
    if weight.is_zero() {
      self.weights.remove(&id);
    } else {
      self.weights.insert(id, weight);
    }
  }

  pub fn build(self) -> Validators {
    let max = self
      .weights
      .values()
      .max()
      .copied()
      .unwrap_or_else(U256::zero);
    let shift = max.bits().saturating_sub(64);

    let mut pairs: Vec<(ValidatorId, u64)> = self
      .weights
      .into_iter()
      .map(|(id, weight)| {
        let scaled = (weight >> shift).low_u64();
        (id, scaled.max(1))
      })
      .collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    Validators::from_sorted_pairs(pairs)
  }
}

impl Encodable for Validators {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(self.ids.len());
    for idx in 0..self.ids.len() {
      s.begin_list(2);
      s.append(&self.ids[idx]);
      s.append(&self.weights[idx]);
    }
  }
}

impl Decodable for Validators {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    let mut pairs = Vec::with_capacity(rlp.item_count()?);
    for item in rlp.iter() {
      pairs.push((item.val_at(0)?, item.val_at(1)?));
    }
    Ok(Validators::from_sorted_pairs(pairs))
  }
}
