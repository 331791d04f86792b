use {
  crate::{
    evm::Transaction,
    primitives::{
      EventI,
      EventId,
      EventPayloadI,
      Gas,
      GasPowerLeft,
      Timestamp,
      ValidatorId,
    },
  },
  keccak_hash::keccak,
  rlp::RlpStream,
};

/// A synthetic decided event for driving the block processor.
#[derive(Debug, Clone)]
pub struct TestEvent {
  id: EventId,
  creator: ValidatorId,
  seq: u32,
  self_parent: Option<EventId>,
  median_time: Timestamp,
  gas_power_left: GasPowerLeft,
  gas_power_used: Gas,
  txs: Vec<Transaction>,
}

impl TestEvent {
  pub fn new(creator: ValidatorId, seq: u32, median_time: Timestamp) -> Self {
    let mut s = RlpStream::new_list(3);
    s.append(&creator);
    s.append(&seq);
    s.append(&median_time);
    Self {
      id: keccak(s.out()),
      creator,
      seq,
      self_parent: None,
      median_time,
      gas_power_left: GasPowerLeft {
        gas: [1_000_000, 10_000_000],
      },
      gas_power_used: 28_000,
      txs: Vec::new(),
    }
  }

  pub fn with_id(mut self, byte: u8) -> Self {
    self.id = EventId::repeat_byte(byte);
    self
  }

  pub fn with_self_parent(mut self, parent: EventId) -> Self {
    self.self_parent = Some(parent);
    self
  }

  pub fn with_gas_power_used(mut self, gas: Gas) -> Self {
    self.gas_power_used = gas;
    self
  }

  pub fn with_gas_power_left(mut self, left: GasPowerLeft) -> Self {
    self.gas_power_left = left;
    self
  }

  pub fn with_txs(mut self, txs: Vec<Transaction>) -> Self {
    self.txs = txs;
    self
  }
}

impl EventI for TestEvent {
  fn id(&self) -> EventId {
    self.id
  }

  fn creator(&self) -> ValidatorId {
    self.creator
  }

  fn seq(&self) -> u32 {
    self.seq
  }

  fn self_parent(&self) -> Option<EventId> {
    self.self_parent
  }

  fn median_time(&self) -> Timestamp {
    self.median_time
  }

  fn gas_power_left(&self) -> GasPowerLeft {
    self.gas_power_left
  }

  fn gas_power_used(&self) -> Gas {
    self.gas_power_used
  }
}

impl EventPayloadI for TestEvent {
  fn txs(&self) -> &[Transaction] {
    &self.txs
  }
}
