//! Post-discovery notification bring-up.
//!
//! The link only supports one pending descriptor write at a time, so
//! notifications are armed one characteristic after another, each step gated
//! on the acknowledgment of the previous one.

use tracing::debug;

use crate::ble::attributes::CharacteristicRef;

/// Where the sequencer is in its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencerPhase {
    /// Waiting for attribute discovery.
    #[default]
    Idle,
    /// Waiting for the acknowledgment of `plan[cursor]`.
    Arming(usize),
    /// Every characteristic in the plan is armed.
    Complete,
}

/// Arms notifications on a fixed, ordered list of characteristics.
#[derive(Debug, Clone)]
pub struct NotificationSequencer {
    plan: Vec<CharacteristicRef>,
    phase: SequencerPhase,
}

impl NotificationSequencer {
    /// Create a sequencer for the given plan. Order is preserved.
    pub fn new(plan: Vec<CharacteristicRef>) -> Self {
        Self {
            plan,
            phase: SequencerPhase::Idle,
        }
    }

    /// The plan being executed.
    pub fn plan(&self) -> &[CharacteristicRef] {
        &self.plan
    }

    /// Current phase.
    pub fn phase(&self) -> SequencerPhase {
        self.phase
    }

    /// Index of the next characteristic to be acknowledged.
    ///
    /// Equals the plan length once the plan is complete.
    pub fn cursor(&self) -> usize {
        match self.phase {
            SequencerPhase::Idle => 0,
            SequencerPhase::Arming(cursor) => cursor,
            SequencerPhase::Complete => self.plan.len(),
        }
    }

    /// Check if every characteristic in the plan is armed.
    pub fn is_complete(&self) -> bool {
        self.phase == SequencerPhase::Complete
    }

    /// Restart the plan. Returns the first characteristic to enable.
    pub fn on_services_discovered(&mut self) -> Option<CharacteristicRef> {
        match self.plan.first() {
            Some(first) => {
                debug!("Notification plan started ({} entries)", self.plan.len());
                self.phase = SequencerPhase::Arming(0);
                Some(*first)
            }
            None => {
                self.phase = SequencerPhase::Complete;
                None
            }
        }
    }

    /// Record an enable acknowledgment. Returns the next characteristic to
    /// enable, if any.
    ///
    /// Acknowledgments for anything but the characteristic at the cursor are
    /// ignored.
    pub fn on_enable_acknowledged(
        &mut self,
        characteristic: &CharacteristicRef,
    ) -> Option<CharacteristicRef> {
        let SequencerPhase::Arming(cursor) = self.phase else {
            debug!(
                "Ignoring enable acknowledgment for {} in phase {:?}",
                characteristic, self.phase
            );
            return None;
        };

        if self.plan.get(cursor) != Some(characteristic) {
            debug!(
                "Ignoring out-of-order acknowledgment for {} (waiting on index {})",
                characteristic, cursor
            );
            return None;
        }

        let next = cursor + 1;
        match self.plan.get(next) {
            Some(c) => {
                debug!("Notification plan advanced to index {}", next);
                self.phase = SequencerPhase::Arming(next);
                Some(*c)
            }
            None => {
                debug!("Notification plan complete");
                self.phase = SequencerPhase::Complete;
                None
            }
        }
    }

    /// Drop in-flight state after the link went down.
    pub fn on_disconnected(&mut self) {
        self.phase = SequencerPhase::Idle;
    }
}
