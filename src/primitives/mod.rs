mod event;
mod types;
mod validators;

pub use {
  event::{EventI, EventPayloadI},
  types::{
    BlockIdx,
    Epoch,
    EventId,
    Gas,
    GasPowerLeft,
    Hash,
    PubkeyError,
    Timestamp,
    ValidatorId,
    ValidatorIdx,
    ValidatorPubkey,
    GAS_POWER_CONFIGS,
    LONG_TERM_GAS,
    SHORT_TERM_GAS,
  },
  validators::{Validators, ValidatorsBuilder},
};
