// src/pipeline/run_context.rs
//
// Everything one run mutates, owned in one place and handed by `&mut`
// to each per-frame stage. Nothing here outlives the run.

use super::event_bus::{EventBus, EventCounts, PhaseEvent};
use super::metrics::{MetricsAggregator, MetricsSnapshot};
use crate::analysis::{ActionDetector, HandRole, HandRoles, TrajectoryTracker, TrialGate};
use crate::types::{ActionKind, Config, HandsConfig, PhaseLabels};
use opencv::core::Mat;
use serde::Serialize;

const EVENT_HISTORY_LIMIT: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRecord {
    pub trial: u32,
    pub start_frame: usize,
    pub end_frame: Option<usize>,
    pub duration_frames: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameDiagnostic {
    pub frame: usize,
    pub stem: String,
    pub reason: String,
}

pub struct RunContext {
    pub hands: HandsConfig,
    pub roles: HandRoles,
    pub dominant_tracker: TrajectoryTracker,
    pub non_dominant_tracker: TrajectoryTracker,
    pub gate: TrialGate,
    pub poke: ActionDetector,
    pub pen: ActionDetector,
    pub metrics: MetricsAggregator,
    pub events: EventBus,

    /// Dominant hand centre from the last frame with both hands visible
    pub last_dominant: Option<(f64, f64)>,
    /// Hand crop of the previous successfully processed frame
    pub previous_crop: Option<Mat>,

    pub trials: Vec<TrialRecord>,
    pub pick_up_frames: Vec<usize>,
    pub diagnostics: Vec<FrameDiagnostic>,
    pub frames_processed: usize,
    pub reset_actions_on_start: bool,
}

impl RunContext {
    pub fn new(config: &Config, roles: HandRoles) -> Self {
        Self {
            hands: config.hands.clone(),
            roles,
            dominant_tracker: TrajectoryTracker::new(config.trajectory.clone()),
            non_dominant_tracker: TrajectoryTracker::new(config.trajectory.clone()),
            gate: TrialGate::new(config.gate.clone()),
            poke: ActionDetector::new(ActionKind::Poke, config.poke.clone()),
            pen: ActionDetector::new(ActionKind::Pen, config.pen.clone()),
            metrics: MetricsAggregator::new(config.metrics.seconds_per_frame),
            events: EventBus::new(EVENT_HISTORY_LIMIT),
            last_dominant: None,
            previous_crop: None,
            trials: Vec::new(),
            pick_up_frames: Vec::new(),
            diagnostics: Vec::new(),
            frames_processed: 0,
            reset_actions_on_start: config.gate.reset_actions_on_start,
        }
    }

    pub fn tracker_mut(&mut self, role: HandRole) -> &mut TrajectoryTracker {
        match role {
            HandRole::Dominant => &mut self.dominant_tracker,
            HandRole::NonDominant => &mut self.non_dominant_tracker,
        }
    }

    pub fn detector(&self, kind: ActionKind) -> &ActionDetector {
        match kind {
            ActionKind::Poke => &self.poke,
            ActionKind::Pen => &self.pen,
        }
    }

    pub fn detector_mut(&mut self, kind: ActionKind) -> &mut ActionDetector {
        match kind {
            ActionKind::Poke => &mut self.poke,
            ActionKind::Pen => &mut self.pen,
        }
    }

    /// Labels as they stand after the current frame's stages.
    pub fn labels(&self) -> PhaseLabels {
        PhaseLabels {
            start: self.gate.start(),
            poke: self.poke.stage().value(),
            pen: self.pen.stage().value(),
            end: self.gate.end(),
        }
    }

    pub fn record_skip(&mut self, frame: usize, stem: &str, reason: String) {
        self.events.publish(PhaseEvent::FrameSkipped {
            frame,
            reason: reason.clone(),
        });
        self.diagnostics.push(FrameDiagnostic {
            frame,
            stem: stem.to_string(),
            reason,
        });
    }

    pub fn open_trial(&mut self, trial: u32, start_frame: usize) {
        self.trials.push(TrialRecord {
            trial,
            start_frame,
            end_frame: None,
            duration_frames: None,
        });
    }

    pub fn close_trial(&mut self, trial: u32, end_frame: usize, duration_frames: u64) {
        if let Some(record) = self.trials.iter_mut().rev().find(|t| t.trial == trial) {
            record.end_frame = Some(end_frame);
            record.duration_frames = Some(duration_frames);
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            roles: self.roles,
            frames_processed: self.frames_processed,
            frames_skipped: self.diagnostics.len(),
            final_labels: self.labels(),
            metrics: self.metrics.snapshot(),
            trials: self.trials.clone(),
            pick_up_frames: self.pick_up_frames.clone(),
            diagnostics: self.diagnostics.clone(),
            events: self.events.history().to_vec(),
            event_counts: self.events.counts(),
            events_dropped: self.events.dropped(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub roles: HandRoles,
    pub frames_processed: usize,
    pub frames_skipped: usize,
    pub final_labels: PhaseLabels,
    pub metrics: MetricsSnapshot,
    pub trials: Vec<TrialRecord>,
    pub pick_up_frames: Vec<usize>,
    pub diagnostics: Vec<FrameDiagnostic>,
    pub events: Vec<PhaseEvent>,
    pub event_counts: EventCounts,
    pub events_dropped: usize,
}
