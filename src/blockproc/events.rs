use {
  super::state::{BlockCtx, BlockState, EpochState},
  crate::primitives::{EventI, EventId, GasPowerLeft, Timestamp},
  tracing::warn,
};

/// Snapshot of the fields the processor keeps from a confirmed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighestEvent {
  pub id: EventId,
  pub seq: u32,
  pub median_time: Timestamp,
  pub gas_power_left: GasPowerLeft,
}

/// Tracks the highest confirmed event of every validator within one
/// block and folds uptime and gas-power bookkeeping into the block
/// state when the block finalizes.
pub struct ConfirmedEventsProcessor<'a> {
  es: &'a EpochState,
  highest: Vec<Option<HighestEvent>>,
}

impl<'a> ConfirmedEventsProcessor<'a> {
  pub fn start(es: &'a EpochState) -> Self {
    Self {
      highest: vec![None; es.validators.len() as usize],
      es,
    }
  }

  pub fn process_confirmed_event(
    &mut self,
    bs: &mut BlockState,
    e: &dyn EventI,
  ) {
    match self.es.validators.get_idx(e.creator()) {
      Some(idx) => {
        let slot = &mut self.highest[idx as usize];
        let supersedes = match slot {
          None => true,
          Some(prev) => {
            e.seq() > prev.seq || (e.seq() == prev.seq && e.id() > prev.id)
          }
        };
        if supersedes {
          *slot = Some(HighestEvent {
            id: e.id(),
            seq: e.seq(),
            median_time: e.median_time(),
            gas_power_left: e.gas_power_left(),
          });
        }
      }
      None => {
        warn!(creator = e.creator(), "confirmed event from unknown validator")
      }
    }
    bs.epoch_gas = bs.epoch_gas.saturating_add(e.gas_power_used());
  }

  /// Applies the accumulated per-validator updates to the block state.
  ///
  /// Cheaters detected this epoch earn no uptime: their highest events
  /// are dropped before the fold. A validator that missed more than
  /// `BlockMissedSlack` blocks gets its bookkeeping refreshed without
  /// an uptime credit.
  pub fn finalize(&mut self, block: BlockCtx, bs: &mut BlockState) {
    for cheater in &bs.epoch_cheaters {
      if let Some(idx) = self.es.validators.get_idx(*cheater) {
        self.highest[idx as usize] = None;
      }
    }
    for (idx, highest) in self.highest.iter().enumerate() {
      let e = match highest {
        Some(e) => e,
        None => continue,
      };
      let info = &mut bs.validator_states[idx];
      let slack = self.es.rules.economy.block_missed_slack;
      if block.idx <= info.last_block.saturating_add(slack) {
        let mut prev_online_time = info.last_online_time;
        if self.es.rules.upgrades.berlin {
          prev_online_time = prev_online_time.max(self.es.epoch_start);
        }
        if e.median_time > prev_online_time {
          info.uptime += e.median_time - prev_online_time;
        }
      }
      info.last_gas_power_left = e.gas_power_left;
      info.last_online_time = e.median_time;
      info.last_block = block.idx;
      info.last_event = e.id;
    }
  }

  /// Highest confirmed event per validator index, for the tips set.
  pub fn highest_events(&self) -> &[Option<HighestEvent>] {
    &self.highest
  }
}
