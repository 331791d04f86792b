use {
  super::types::{EventId, Gas, GasPowerLeft, Timestamp, ValidatorId},
  crate::evm::Transaction,
};

/// View of a decided event that the block processor consumes.
///
/// Events are produced and validated elsewhere; the block processor
/// only ever sees events that consensus has already ordered, and only
/// cares about the fields exposed here.
pub trait EventI {
  /// Hash that identifies the event.
  fn id(&self) -> EventId;

  /// Validator that created the event.
  fn creator(&self) -> ValidatorId;

  /// Sequence number of the event within its creator's own chain
  /// of self-parents.
  fn seq(&self) -> u32;

  /// Previous event of the same creator, if any.
  fn self_parent(&self) -> Option<EventId>;

  /// Deterministic timestamp derived from the median of parent times.
  fn median_time(&self) -> Timestamp;

  /// Gas power the creator had left after emitting this event.
  fn gas_power_left(&self) -> GasPowerLeft;

  /// Gas power the event consumed.
  fn gas_power_used(&self) -> Gas;
}

/// An event together with its transaction payload.
pub trait EventPayloadI: EventI {
  fn txs(&self) -> &[Transaction];
}
