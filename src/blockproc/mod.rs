//! The deterministic state machine that turns the consensus-ordered
//! stream of events into a chain of blocks.
//!
//! Four cooperating processors share the mutable block and epoch
//! state: the confirmed-events processor (uptime and gas-power
//! bookkeeping), the epochs sealer (validator rotation), the driver
//! listener and transactors (protocol-injected transactions and their
//! observed effects), and the EVM processor (transaction execution).
//! The pipeline composition is hard-coded in [`BlockProcessor`].

mod apply;
mod driver_txs;
mod events;
mod evm;
mod sealer;
mod state;

pub use {
  apply::{AppliedBlock, BlockProcError, BlockProcessor, DecidedBlock},
  driver_txs::{
    DriverTxGenesisTransactor,
    DriverTxListener,
    DriverTxPreTransactor,
    DriverTxTransactor,
    InternalTxBuilder,
  },
  events::{ConfirmedEventsProcessor, HighestEvent},
  evm::{EvmProcessor, ExecutedBlock},
  sealer::EpochsSealer,
  state::{
    BlockCtx,
    BlockState,
    EpochState,
    InvariantViolation,
    ValidatorBlockState,
    ValidatorEpochState,
    ValidatorProfile,
    ValidatorProfiles,
    MAX_ADVANCE_EPOCHS,
  },
};
