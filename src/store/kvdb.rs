use {
  parking_lot::RwLock,
  rocksdb::{IteratorMode, WriteBatch, DB},
  std::{collections::BTreeMap, path::Path},
  thiserror::Error,
};

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("storage engine error: {0}")]
  Engine(String),

  #[error("corrupted store entry: {0:?}")]
  Corrupted(rlp::DecoderError),

  #[error("decided state missing: genesis not applied")]
  GenesisNotApplied,
}

impl From<rocksdb::Error> for StoreError {
  fn from(err: rocksdb::Error) -> Self {
    StoreError::Engine(err.to_string())
  }
}

impl From<rlp::DecoderError> for StoreError {
  fn from(err: rlp::DecoderError) -> Self {
    StoreError::Corrupted(err)
  }
}

/// Logical tables of the node store, mapped onto one physical
/// key-value database via single-byte key prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
  /// The decided `{BlockState, EpochState}` sentinel.
  DecidedState,
  Blocks,
  Receipts,
  Txs,
  TxPositions,
  LastEvents,
  FlushId,
}

impl Table {
  fn prefix(self) -> u8 {
    match self {
      Table::DecidedState => b'D',
      Table::Blocks => b'b',
      Table::Receipts => b'r',
      Table::Txs => b't',
      Table::TxPositions => b'p',
      Table::LastEvents => b'l',
      Table::FlushId => b'F',
    }
  }

  fn key(self, key: &[u8]) -> Vec<u8> {
    let mut prefixed = Vec::with_capacity(1 + key.len());
    prefixed.push(self.prefix());
    prefixed.extend_from_slice(key);
    prefixed
  }
}

/// One write in a batch.
#[derive(Debug, Clone)]
pub enum BatchOp {
  Put {
    table: Table,
    key: Vec<u8>,
    value: Vec<u8>,
  },
  Delete {
    table: Table,
    key: Vec<u8>,
  },
}

/// Physical storage behind the node store. Writes within one batch
/// are applied atomically.
pub trait KeyValueStore: Send + Sync {
  fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
  fn put(&self, table: Table, key: &[u8], value: &[u8])
    -> Result<(), StoreError>;
  fn delete(&self, table: Table, key: &[u8]) -> Result<(), StoreError>;
  fn write_batch(&self, batch: Vec<BatchOp>) -> Result<(), StoreError>;

  /// Drops every entry of every table. Used by crash recovery before
  /// the genesis is re-applied.
  fn drop_all(&self) -> Result<(), StoreError>;
}

/// Store backend over a RocksDB database.
pub struct RocksDb {
  db: DB,
}

impl RocksDb {
  pub fn open(directory: &Path) -> Result<Self, StoreError> {
    let mut opts = rocksdb::Options::default();
    opts.create_if_missing(true);
    let db = DB::open(&opts, directory)?;
    Ok(Self { db })
  }
}

impl KeyValueStore for RocksDb {
  fn get(
    &self,
    table: Table,
    key: &[u8],
  ) -> Result<Option<Vec<u8>>, StoreError> {
    Ok(self.db.get(table.key(key))?)
  }

  fn put(
    &self,
    table: Table,
    key: &[u8],
    value: &[u8],
  ) -> Result<(), StoreError> {
    Ok(self.db.put(table.key(key), value)?)
  }

  fn delete(&self, table: Table, key: &[u8]) -> Result<(), StoreError> {
    Ok(self.db.delete(table.key(key))?)
  }

  fn write_batch(&self, batch: Vec<BatchOp>) -> Result<(), StoreError> {
    let mut write = WriteBatch::default();
    for op in batch {
      match op {
        BatchOp::Put { table, key, value } => {
          write.put(table.key(&key), value)
        }
        BatchOp::Delete { table, key } => write.delete(table.key(&key)),
      }
    }
    Ok(self.db.write(write)?)
  }

  fn drop_all(&self) -> Result<(), StoreError> {
    let mut write = WriteBatch::default();
    for entry in self.db.iterator(IteratorMode::Start) {
      let (key, _) = entry?;
      write.delete(key);
    }
    Ok(self.db.write(write)?)
  }
}

/// In-memory store backend for tests and ephemeral networks.
#[derive(Default)]
pub struct MemDb {
  entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemDb {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueStore for MemDb {
  fn get(
    &self,
    table: Table,
    key: &[u8],
  ) -> Result<Option<Vec<u8>>, StoreError> {
    Ok(self.entries.read().get(&table.key(key)).cloned())
  }

  fn put(
    &self,
    table: Table,
    key: &[u8],
    value: &[u8],
  ) -> Result<(), StoreError> {
    self.entries.write().insert(table.key(key), value.to_vec());
    Ok(())
  }

  fn delete(&self, table: Table, key: &[u8]) -> Result<(), StoreError> {
    self.entries.write().remove(&table.key(key));
    Ok(())
  }

  fn write_batch(&self, batch: Vec<BatchOp>) -> Result<(), StoreError> {
    let mut entries = self.entries.write();
    for op in batch {
      match op {
        BatchOp::Put { table, key, value } => {
          entries.insert(table.key(&key), value);
        }
        BatchOp::Delete { table, key } => {
          entries.remove(&table.key(&key));
        }
      }
    }
    Ok(())
  }

  fn drop_all(&self) -> Result<(), StoreError> {
    self.entries.write().clear();
    Ok(())
  }
}
