use {
  super::{executor::FakeExecutor, statedb::InMemoryStateDb, TestEvent},
  crate::{
    blockproc::{BlockCtx, BlockProcessor, DecidedBlock},
    config::StoreConfig,
    evm::{Log, Receipt, Transaction},
    genesis::{fake::fake_genesis, Genesis},
    logging,
    primitives::{Epoch, Timestamp, ValidatorId},
    store::{MemDb, Store},
    utils::to_skh,
  },
  ethereum_types::{Address, U256},
  keccak_hash::keccak,
  std::collections::BTreeMap,
  std::sync::Arc,
};

/// Whether a block should stay in the current epoch or push past the
/// epoch duration so the sealer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochAction {
  SameEpoch,
  NextEpoch,
}

const BLOCK_INTERVAL: u64 = 1_000_000_000;

/// A single-node network driving the block processor over a fake-net
/// genesis: builds events, applies blocks and persists the results,
/// the way the consensus callback does on a live node.
pub struct TestEnv {
  pub store: Store,
  pub statedb: InMemoryStateDb,
  pub executor: FakeExecutor,
  pub genesis: Genesis,

  num_validators: u32,
  time: Timestamp,
  nonces: BTreeMap<Address, u64>,
  seqs: BTreeMap<ValidatorId, u32>,
  pending_cheaters: Vec<ValidatorId>,
}

impl TestEnv {
  pub fn new(num_validators: u32) -> Self {
    logging::init_for_tests();
    let genesis = fake_genesis(num_validators, to_skh(1_000_000), to_skh(1000));
    let store = Store::new(Arc::new(MemDb::new()), StoreConfig::lite());
    let executor = FakeExecutor::new();
    let mut statedb = InMemoryStateDb::default();
    {
      let processor = BlockProcessor::new(&executor);
      store
        .apply_genesis(&genesis, &mut statedb, &processor)
        .expect("fake genesis must apply");
    }
    let time = genesis.metadata.time;
    Self {
      store,
      statedb,
      executor,
      genesis,
      num_validators,
      time,
      nonces: BTreeMap::new(),
      seqs: BTreeMap::new(),
      pending_cheaters: Vec::new(),
    }
  }

  /// Address of the n-th validator (1-based, like validator ids).
  pub fn address(&self, n: usize) -> Address {
    self.genesis.metadata.validators[n - 1].address
  }

  pub fn balance(&self, addr: Address) -> U256 {
    use crate::evm::StateDb;
    self.statedb.balance(&addr)
  }

  pub fn epoch(&self) -> Epoch {
    self.store.get_epoch().unwrap()
  }

  /// Builds a signed-looking transfer from validator account `from`
  /// to validator account `to`.
  pub fn transfer(&mut self, from: usize, to: usize, amount: U256) -> Transaction {
    let sender = self.address(from);
    let recipient = self.address(to);
    let nonce = self.nonces.entry(sender).or_insert(0);
    let tx = Transaction {
      nonce: *nonce,
      gas_price: U256::from(1_000_000_000u64),
      gas: super::executor::TX_GAS,
      to: Some(recipient),
      value: amount,
      input: vec![],
      from: sender,
    };
    *nonce += 1;
    tx
  }

  /// Marks validators as double-signers for the next applied block.
  pub fn inject_cheaters(&mut self, cheaters: Vec<ValidatorId>) {
    self.pending_cheaters = cheaters;
  }

  /// Queues a driver log for the next applied block.
  pub fn queue_driver_log(&self, log: Log) {
    self.executor.queue_log(log);
  }

  /// Applies one decided block carrying the given user transactions,
  /// with every validator emitting one event. Returns the receipts of
  /// the included user transactions, in input order.
  pub fn apply_block(
    &mut self,
    action: EpochAction,
    txs: Vec<Transaction>,
  ) -> Vec<Receipt> {
    self.apply_block_from(action, txs, None)
  }

  /// Like [`TestEnv::apply_block`], but only validators in `emitting`
  /// (when given) produce events this block.
  pub fn apply_block_from(
    &mut self,
    action: EpochAction,
    txs: Vec<Transaction>,
    emitting: Option<&[ValidatorId]>,
  ) -> Vec<Receipt> {
    let (bs, es) = self.store.get_block_epoch_state().unwrap();

    self.time += match action {
      EpochAction::SameEpoch => BLOCK_INTERVAL,
      EpochAction::NextEpoch => es.rules.epochs.max_epoch_duration,
    };
    let idx = bs.last_block.idx + 1;
    let ctx = BlockCtx {
      idx,
      time: self.time,
      atropos: keccak(idx.to_be_bytes()),
    };

    // distribute txs round-robin over the emitting validators' events
    let num_validators = self.num_validators;
    let mut events = Vec::new();
    for v in 1..=num_validators {
      let v = v as ValidatorId;
      if let Some(emitting) = emitting {
        if !emitting.contains(&v) {
          continue;
        }
      }
      let seq = self.seqs.entry(v).or_insert(0);
      *seq += 1;
      let payload: Vec<Transaction> = txs
        .iter()
        .enumerate()
        .filter(|(i, _)| (*i as u32) % num_validators == v - 1)
        .map(|(_, tx)| tx.clone())
        .collect();
      events.push(TestEvent::new(v, *seq, self.time).with_txs(payload));
    }

    let decided = DecidedBlock {
      ctx,
      cheaters: std::mem::take(&mut self.pending_cheaters),
      events: &events,
    };

    let processor = BlockProcessor::new(&self.executor);
    let applied = processor
      .apply_block(decided, bs, es, &mut self.statedb)
      .expect("block application must succeed");
    self
      .store
      .persist_applied(ctx.idx, &applied)
      .expect("block persistence must succeed");

    // pick the user-tx receipts back out, in input order
    let mut by_hash: BTreeMap<_, Receipt> = applied
      .executed
      .receipts
      .iter()
      .map(|r| (r.tx_hash, r.clone()))
      .collect();
    txs
      .iter()
      .filter_map(|tx| by_hash.remove(&tx.hash()))
      .collect()
  }
}
