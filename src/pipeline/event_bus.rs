// src/pipeline/event_bus.rs
//
// Phase events for one run. Stages publish into the open frame batch;
// closing the batch hands it to the caller and appends it to the run
// history. Counts are tallied at publish time and survive a full history.

use crate::analysis::{HandRole, LineSignature};
use crate::types::ActionKind;
use serde::Serialize;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PhaseEvent {
    PickUp {
        frame: usize,
        role: HandRole,
    },

    TrialStarted {
        trial: u32,
        frame: usize,
    },

    ActionArmed {
        kind: ActionKind,
        frame: usize,
        signature: LineSignature,
    },

    ActionConfirmed {
        kind: ActionKind,
        frame: usize,
        signature: LineSignature,
    },

    TrialEnded {
        trial: u32,
        end_frame: usize,
        duration_frames: u64,
    },

    FrameSkipped {
        frame: usize,
        reason: String,
    },
}

impl fmt::Display for PhaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PickUp { frame, role } => write!(f, "{} pick-up at frame {}", role, frame),
            Self::TrialStarted { trial, frame } => {
                write!(f, "trial {} open from frame {}", trial, frame)
            }
            Self::ActionArmed { kind, frame, .. } => write!(f, "{} armed at {}", kind, frame),
            Self::ActionConfirmed { kind, frame, .. } => {
                write!(f, "{} confirmed at {}", kind, frame)
            }
            Self::TrialEnded {
                trial,
                end_frame,
                duration_frames,
            } => write!(
                f,
                "trial {} closed at {} after {} frames",
                trial, end_frame, duration_frames
            ),
            Self::FrameSkipped { frame, reason } => write!(f, "frame {} skipped: {}", frame, reason),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub pick_ups: u32,
    pub trials_started: u32,
    pub actions_armed: u32,
    pub actions_confirmed: u32,
    pub trials_ended: u32,
    pub frames_skipped: u32,
}

impl EventCounts {
    fn tally(&mut self, event: &PhaseEvent) {
        let slot = match event {
            PhaseEvent::PickUp { .. } => &mut self.pick_ups,
            PhaseEvent::TrialStarted { .. } => &mut self.trials_started,
            PhaseEvent::ActionArmed { .. } => &mut self.actions_armed,
            PhaseEvent::ActionConfirmed { .. } => &mut self.actions_confirmed,
            PhaseEvent::TrialEnded { .. } => &mut self.trials_ended,
            PhaseEvent::FrameSkipped { .. } => &mut self.frames_skipped,
        };
        *slot += 1;
    }
}

pub struct EventBus {
    batch: Vec<PhaseEvent>,
    history: Vec<PhaseEvent>,
    history_limit: usize,
    counts: EventCounts,
    dropped: usize,
}

impl EventBus {
    pub fn new(history_limit: usize) -> Self {
        Self {
            batch: Vec::new(),
            history: Vec::new(),
            history_limit,
            counts: EventCounts::default(),
            dropped: 0,
        }
    }

    pub fn publish(&mut self, event: PhaseEvent) {
        self.counts.tally(&event);
        self.batch.push(event);
    }

    /// Events published since the last `close_frame`.
    pub fn pending_count(&self) -> usize {
        self.batch.len()
    }

    /// Close the current frame's batch and return it. The batch joins the
    /// run history while there is room; past `history_limit` only the
    /// counts keep growing.
    pub fn close_frame(&mut self) -> Vec<PhaseEvent> {
        let batch = std::mem::take(&mut self.batch);
        let room = self.history_limit.saturating_sub(self.history.len());
        if batch.len() > room {
            if self.dropped == 0 {
                warn!(
                    "Event history full ({} events), later events are only counted",
                    self.history_limit
                );
            }
            self.dropped += batch.len() - room;
        }
        self.history.extend(batch.iter().take(room).cloned());
        batch
    }

    pub fn history(&self) -> &[PhaseEvent] {
        &self.history
    }

    pub fn counts(&self) -> EventCounts {
        self.counts
    }

    /// Events counted but left out of the history.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pick_up(frame: usize) -> PhaseEvent {
        PhaseEvent::PickUp {
            frame,
            role: HandRole::NonDominant,
        }
    }

    #[test]
    fn test_close_frame_returns_batch_and_keeps_history() {
        let mut bus = EventBus::new(16);
        bus.publish(pick_up(6));
        bus.publish(PhaseEvent::TrialStarted { trial: 1, frame: 6 });
        assert_eq!(bus.pending_count(), 2);

        let batch = bus.close_frame();
        assert_eq!(batch.len(), 2);
        assert_eq!(bus.pending_count(), 0);
        assert!(bus.close_frame().is_empty());

        bus.publish(PhaseEvent::TrialEnded {
            trial: 1,
            end_frame: 14,
            duration_frames: 8,
        });
        bus.close_frame();

        assert_eq!(bus.history().len(), 3);
        assert_eq!(bus.history()[0], pick_up(6));
        assert_eq!(bus.counts().trials_started, 1);
        assert_eq!(bus.counts().trials_ended, 1);
        assert_eq!(bus.dropped(), 0);
    }

    #[test]
    fn test_full_history_still_counts() {
        let mut bus = EventBus::new(2);
        for frame in 0..3 {
            bus.publish(pick_up(frame));
        }
        // The caller still sees the whole batch
        assert_eq!(bus.close_frame().len(), 3);

        bus.publish(PhaseEvent::FrameSkipped {
            frame: 3,
            reason: "unreadable".to_string(),
        });
        bus.close_frame();

        assert_eq!(bus.history(), &[pick_up(0), pick_up(1)]);
        assert_eq!(bus.dropped(), 2);
        assert_eq!(bus.counts().pick_ups, 3);
        assert_eq!(bus.counts().frames_skipped, 1);
    }

    #[test]
    fn test_serializes_with_tag() {
        let json = serde_json::to_value(PhaseEvent::TrialStarted { trial: 1, frame: 6 }).unwrap();
        assert_eq!(json["event"], "trial_started");
        assert_eq!(json["frame"], 6);

        let json = serde_json::to_value(pick_up(6)).unwrap();
        assert_eq!(json["role"], "non_dominant");
    }

    #[test]
    fn test_display_names_the_frame() {
        assert_eq!(pick_up(6).to_string(), "non-dominant pick-up at frame 6");
        let ended = PhaseEvent::TrialEnded {
            trial: 2,
            end_frame: 30,
            duration_frames: 9,
        };
        assert_eq!(ended.to_string(), "trial 2 closed at 30 after 9 frames");
    }
}
