use {
  super::{kvdb::Table, Store, StoreError},
  crate::{
    blockproc::{BlockState, EpochState},
    primitives::{BlockIdx, Epoch, Validators},
    rules::Rules,
  },
  rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream},
  std::sync::Arc,
};

/// Key of the single decided-state sentinel.
pub(super) const STATE_KEY: &[u8] = b"s";

/// The decided state of the node: the latest block state and the
/// current epoch state, always read and written together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEpochState {
  pub block_state: BlockState,
  pub epoch_state: EpochState,
}

impl Encodable for BlockEpochState {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(2);
    s.append(&self.block_state);
    s.append(&self.epoch_state);
  }
}

impl Decodable for BlockEpochState {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(BlockEpochState {
      block_state: rlp.val_at(0)?,
      epoch_state: rlp.val_at(1)?,
    })
  }
}

impl Store {
  /// Publishes the latest decided state as an in-memory snapshot.
  /// Readers observe either the previous snapshot or this one, never
  /// a partially updated state.
  pub fn set_block_epoch_state(&self, bs: BlockState, es: EpochState) {
    let snapshot = Arc::new(BlockEpochState {
      block_state: bs,
      epoch_state: es,
    });
    *self.cache.block_epoch_state.write() = Some(snapshot);
  }

  fn get_snapshot(&self) -> Result<Arc<BlockEpochState>, StoreError> {
    if let Some(snapshot) = self.cache.block_epoch_state.read().as_ref() {
      return Ok(Arc::clone(snapshot));
    }
    let bytes = self
      .db()
      .get(Table::DecidedState, STATE_KEY)?
      .ok_or(StoreError::GenesisNotApplied)?;
    let snapshot = Arc::new(rlp::decode::<BlockEpochState>(&bytes)?);
    *self.cache.block_epoch_state.write() = Some(Arc::clone(&snapshot));
    Ok(snapshot)
  }

  /// Writes the latest decided state to the database.
  pub fn flush_block_epoch_state(&self) -> Result<(), StoreError> {
    let snapshot = self.get_snapshot()?;
    self
      .db()
      .put(Table::DecidedState, STATE_KEY, &rlp::encode(snapshot.as_ref()))
  }

  pub fn get_block_epoch_state(
    &self,
  ) -> Result<(BlockState, EpochState), StoreError> {
    let snapshot = self.get_snapshot()?;
    Ok((snapshot.block_state.clone(), snapshot.epoch_state.clone()))
  }

  pub fn get_block_state(&self) -> Result<BlockState, StoreError> {
    Ok(self.get_snapshot()?.block_state.clone())
  }

  pub fn get_epoch_state(&self) -> Result<EpochState, StoreError> {
    Ok(self.get_snapshot()?.epoch_state.clone())
  }

  pub fn get_epoch(&self) -> Result<Epoch, StoreError> {
    Ok(self.get_snapshot()?.epoch_state.epoch)
  }

  pub fn get_validators(&self) -> Result<Validators, StoreError> {
    Ok(self.get_snapshot()?.epoch_state.validators.clone())
  }

  /// The current validators and epoch, read atomically.
  pub fn get_epoch_validators(
    &self,
  ) -> Result<(Validators, Epoch), StoreError> {
    let snapshot = self.get_snapshot()?;
    Ok((
      snapshot.epoch_state.validators.clone(),
      snapshot.epoch_state.epoch,
    ))
  }

  pub fn get_latest_block_index(&self) -> Result<BlockIdx, StoreError> {
    Ok(self.get_snapshot()?.block_state.last_block.idx)
  }

  pub fn get_rules(&self) -> Result<Rules, StoreError> {
    Ok(self.get_snapshot()?.epoch_state.rules.clone())
  }

  /// The current rules and epoch, read atomically.
  pub fn get_epoch_rules(&self) -> Result<(Rules, Epoch), StoreError> {
    let snapshot = self.get_snapshot()?;
    Ok((
      snapshot.epoch_state.rules.clone(),
      snapshot.epoch_state.epoch,
    ))
  }
}
