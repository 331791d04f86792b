use {
  super::{evict_to_budget, kvdb::Table, Store, StoreError},
  crate::{
    evm::{Receipt, Transaction},
    primitives::{BlockIdx, Epoch, EventId, Gas, Hash, Timestamp, ValidatorId},
  },
  ethereum_types::H256,
  rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream},
  std::sync::Arc,
};

const FLUSH_ID_KEY: &[u8] = b"id";

/// Persisted form of one decided block: transaction bodies live in
/// their own table and are referenced by hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
  pub time: Timestamp,
  pub atropos: EventId,
  pub internal_txs: Vec<H256>,
  pub txs: Vec<H256>,
  /// Indices (in the pre-filter execution order) of transactions that
  /// were skipped; the hash lists above reference included
  /// transactions only.
  pub skipped_txs: Vec<u32>,
  pub gas_used: Gas,
  pub root: Hash,
}

impl Encodable for BlockRecord {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(7);
    s.append(&self.time);
    s.append(&self.atropos);
    s.append_list(&self.internal_txs);
    s.append_list(&self.txs);
    s.append_list(&self.skipped_txs);
    s.append(&self.gas_used);
    s.append(&self.root);
  }
}

impl Decodable for BlockRecord {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(BlockRecord {
      time: rlp.val_at(0)?,
      atropos: rlp.val_at(1)?,
      internal_txs: rlp.list_at(2)?,
      txs: rlp.list_at(3)?,
      skipped_txs: rlp.list_at(4)?,
      gas_used: rlp.val_at(5)?,
      root: rlp.val_at(6)?,
    })
  }
}

/// Where an included transaction landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxPosition {
  pub block: BlockIdx,
  pub index: u32,
}

impl Encodable for TxPosition {
  fn rlp_append(&self, s: &mut RlpStream) {
    s.begin_list(2);
    s.append(&self.block);
    s.append(&self.index);
  }
}

impl Decodable for TxPosition {
  fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
    Ok(TxPosition {
      block: rlp.val_at(0)?,
      index: rlp.val_at(1)?,
    })
  }
}

impl Store {
  pub fn set_block(
    &self,
    idx: BlockIdx,
    record: BlockRecord,
  ) -> Result<(), StoreError> {
    self
      .db()
      .put(Table::Blocks, &idx.to_be_bytes(), &rlp::encode(&record))?;
    let mut cache = self.cache.blocks.write();
    cache.insert(idx, record);
    evict_to_budget(&mut cache, self.config().cache.blocks_num);
    Ok(())
  }

  pub fn get_block(
    &self,
    idx: BlockIdx,
  ) -> Result<Option<BlockRecord>, StoreError> {
    if let Some(record) = self.cache.blocks.read().get(&idx) {
      return Ok(Some(record.clone()));
    }
    let bytes = match self.db().get(Table::Blocks, &idx.to_be_bytes())? {
      Some(bytes) => bytes,
      None => return Ok(None),
    };
    let record = rlp::decode::<BlockRecord>(&bytes)?;
    let mut cache = self.cache.blocks.write();
    cache.insert(idx, record.clone());
    evict_to_budget(&mut cache, self.config().cache.blocks_num);
    Ok(Some(record))
  }

  pub fn set_tx(&self, tx: &Transaction) -> Result<(), StoreError> {
    self
      .db()
      .put(Table::Txs, tx.hash().as_bytes(), &rlp::encode(tx))
  }

  pub fn get_tx(&self, hash: H256) -> Result<Option<Transaction>, StoreError> {
    match self.db().get(Table::Txs, hash.as_bytes())? {
      Some(bytes) => Ok(Some(rlp::decode(&bytes)?)),
      None => Ok(None),
    }
  }

  pub fn set_tx_position(
    &self,
    hash: H256,
    position: TxPosition,
  ) -> Result<(), StoreError> {
    self
      .db()
      .put(Table::TxPositions, hash.as_bytes(), &rlp::encode(&position))?;
    let mut cache = self.cache.tx_positions.write();
    cache.insert(hash, position);
    evict_to_budget(&mut cache, self.config().cache.tx_positions);
    Ok(())
  }

  pub fn get_tx_position(
    &self,
    hash: H256,
  ) -> Result<Option<TxPosition>, StoreError> {
    if let Some(position) = self.cache.tx_positions.read().get(&hash) {
      return Ok(Some(*position));
    }
    match self.db().get(Table::TxPositions, hash.as_bytes())? {
      Some(bytes) => Ok(Some(rlp::decode(&bytes)?)),
      None => Ok(None),
    }
  }

  pub fn set_receipts(
    &self,
    idx: BlockIdx,
    receipts: Vec<Receipt>,
  ) -> Result<(), StoreError> {
    self
      .db()
      .put(Table::Receipts, &idx.to_be_bytes(), &rlp::encode_list(&receipts))?;
    let mut cache = self.cache.receipts.write();
    cache.insert(idx, Arc::new(receipts));
    evict_to_budget(&mut cache, self.config().cache.receipts_blocks);
    Ok(())
  }

  pub fn get_receipts(
    &self,
    idx: BlockIdx,
  ) -> Result<Option<Arc<Vec<Receipt>>>, StoreError> {
    if let Some(receipts) = self.cache.receipts.read().get(&idx) {
      return Ok(Some(Arc::clone(receipts)));
    }
    let bytes = match self.db().get(Table::Receipts, &idx.to_be_bytes())? {
      Some(bytes) => bytes,
      None => return Ok(None),
    };
    let receipts: Vec<Receipt> = Rlp::new(&bytes).as_list()?;
    let receipts = Arc::new(receipts);
    let mut cache = self.cache.receipts.write();
    cache.insert(idx, Arc::clone(&receipts));
    evict_to_budget(&mut cache, self.config().cache.receipts_blocks);
    Ok(Some(receipts))
  }

  /// Records the last confirmed event of each validator in the given
  /// epoch.
  pub fn set_last_events(
    &self,
    epoch: Epoch,
    last_events: &[(ValidatorId, EventId)],
  ) -> Result<(), StoreError> {
    let mut s = RlpStream::new_list(last_events.len());
    for (validator_id, event_id) in last_events {
      s.begin_list(2);
      s.append(validator_id);
      s.append(event_id);
    }
    self
      .db()
      .put(Table::LastEvents, &epoch.to_be_bytes(), &s.out())
  }

  pub fn get_last_events(
    &self,
    epoch: Epoch,
  ) -> Result<Vec<(ValidatorId, EventId)>, StoreError> {
    let bytes = match self.db().get(Table::LastEvents, &epoch.to_be_bytes())? {
      Some(bytes) => bytes,
      None => return Ok(Vec::new()),
    };
    let rlp = Rlp::new(&bytes);
    let mut last_events = Vec::with_capacity(rlp.item_count()?);
    for item in rlp.iter() {
      last_events.push((item.val_at(0)?, item.val_at(1)?));
    }
    Ok(last_events)
  }

  /// The crash-recovery sentinel: present if and only if the last
  /// flush completed.
  pub fn get_flush_id(&self) -> Result<Option<Vec<u8>>, StoreError> {
    self.db().get(Table::FlushId, FLUSH_ID_KEY)
  }

  pub fn set_flush_id(&self, id: &[u8]) -> Result<(), StoreError> {
    self.db().put(Table::FlushId, FLUSH_ID_KEY, id)
  }
}
