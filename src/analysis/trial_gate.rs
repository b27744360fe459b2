// src/analysis/trial_gate.rs
//
// Opens a trial on a non-dominant pick-up, closes it when the lone
// visible hand starts returning.
//
// Direction conventions differ between the two paths and both are kept:
//   Start path (trajectory tracker): forward = y decreasing
//   End path (here):                 returning = y increasing

use super::trajectory::PickUpEvent;
use crate::types::GateConfig;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info};

const INITIAL_LAST_END_FRAME: i64 = -5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateState {
    Idle,
    TrialOpen,
    EndArmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrialStart {
    pub trial: u32,
    pub frame: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrialEnd {
    pub trial: u32,
    pub end_frame: usize,
    pub duration_frames: u64,
}

pub struct TrialGate {
    config: GateConfig,
    start: u32,
    end: u32,
    last_start_frame: Option<i64>,
    last_end_frame: i64,
    last_pick_up_frame: Option<i64>,
    /// Trigger frame of an armed end, confirmed on the following frame
    pending_end: Option<i64>,
    y_history: VecDeque<f64>,
}

impl TrialGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            y_history: VecDeque::with_capacity(config.y_history),
            config,
            start: 0,
            end: 0,
            last_start_frame: None,
            last_end_frame: INITIAL_LAST_END_FRAME,
            last_pick_up_frame: None,
            pending_end: None,
        }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn state(&self) -> GateState {
        if self.pending_end.is_some() {
            GateState::EndArmed
        } else if self.start > self.end {
            GateState::TrialOpen
        } else {
            GateState::Idle
        }
    }

    /// Resolve an end armed on an earlier frame. Call once at the top of
    /// every processed frame. The buffer lasts a single frame.
    pub fn advance(&mut self, frame: usize) -> Option<TrialEnd> {
        let frame = frame as i64;
        let trigger = match self.pending_end {
            Some(trigger) if trigger < frame => trigger,
            _ => return None,
        };
        self.pending_end = None;

        if self.end >= self.start {
            debug!("Armed end at frame {} dropped: no open trial", trigger);
            return None;
        }

        let end_frame = trigger + 1;
        self.end += 1;
        self.last_end_frame = end_frame;

        let pick_up = self.last_pick_up_frame.unwrap_or(end_frame);
        let duration_frames = (end_frame - pick_up).max(0) as u64;

        info!(
            "🏁 Trial {} ended at frame {} ({} frames)",
            self.end, end_frame, duration_frames
        );

        Some(TrialEnd {
            trial: self.end,
            end_frame: end_frame as usize,
            duration_frames,
        })
    }

    pub fn on_pick_up(&mut self, event: PickUpEvent) -> Option<TrialStart> {
        let frame = event.frame as i64;
        self.last_pick_up_frame = Some(frame);

        if self.start > self.end {
            debug!("Pick-up at frame {} ignored: trial {} still open", frame, self.start);
            return None;
        }
        if let Some(last) = self.last_start_frame {
            if (frame - last).abs() <= self.config.debounce_frames {
                debug!("Pick-up at frame {} debounced (last start {})", frame, last);
                return None;
            }
        }

        self.start += 1;
        self.last_start_frame = Some(frame);
        info!("🟢 Trial {} started at frame {}", self.start, frame);

        Some(TrialStart {
            trial: self.start,
            frame: event.frame,
        })
    }

    /// Feed the y position of the only visible hand.
    pub fn on_single_hand(&mut self, frame: usize, y: f64) {
        self.y_history.push_back(y);
        while self.y_history.len() > self.config.y_history {
            self.y_history.pop_front();
        }

        if !self.is_returning() {
            return;
        }

        let frame = frame as i64;
        if (frame - self.last_end_frame).abs() > self.config.debounce_frames {
            if self.pending_end.is_none() {
                debug!("End armed at frame {}", frame);
            }
            self.pending_end = Some(frame);
        }
    }

    /// Both hands are back in view. The next lone-hand stretch is compared
    /// only against its own samples.
    pub fn on_both_hands(&mut self) {
        self.y_history.clear();
    }

    fn is_returning(&self) -> bool {
        let n = self.y_history.len();
        if n < 2 {
            return false;
        }
        self.y_history[n - 1] - self.y_history[n - 2] > 0.0
    }

    pub fn y_history_len(&self) -> usize {
        self.y_history.len()
    }
}
