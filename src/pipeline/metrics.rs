// src/pipeline/metrics.rs
//
// Run-scoped trial metrics. Durations arrive only from the trial gate's
// end confirmation; success is sampled as a level on every frame.

use crate::types::PhaseLabels;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    mean_duration: f64,
    current_duration: u64,
    success_count: u64,
    total_trials: u64,
    completed_trials: u64,
    seconds_per_frame: f64,
    started_at: Instant,
}

impl MetricsAggregator {
    pub fn new(seconds_per_frame: f64) -> Self {
        Self {
            mean_duration: 0.0,
            current_duration: 0,
            success_count: 0,
            total_trials: 0,
            completed_trials: 0,
            seconds_per_frame,
            started_at: Instant::now(),
        }
    }

    /// Per-frame sample. Both actions at stage 2 count as a success for
    /// this frame, so a completed trial keeps counting until its stages reset.
    pub fn sample(&mut self, labels: &PhaseLabels) {
        self.total_trials += 1;
        if labels.both_actions_confirmed() {
            self.success_count += 1;
        }
    }

    pub fn record_trial(&mut self, duration_frames: u64) {
        self.current_duration = duration_frames;
        self.completed_trials += 1;

        let n = self.completed_trials as f64;
        self.mean_duration += (duration_frames as f64 - self.mean_duration) / n;
    }

    pub fn reset_current(&mut self) {
        self.current_duration = 0;
    }

    pub fn success_ratio(&self) -> f64 {
        if self.total_trials == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_trials as f64 * 100.0
    }

    pub fn mean_duration(&self) -> f64 {
        self.mean_duration
    }

    pub fn to_seconds(&self, frames: f64) -> f64 {
        frames * self.seconds_per_frame
    }

    pub fn fps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            self.total_trials as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            current_duration_frames: self.current_duration,
            mean_duration_frames: self.mean_duration,
            success_count: self.success_count,
            total_trials: self.total_trials,
            completed_trials: self.completed_trials,
            success_ratio: self.success_ratio(),
            current_duration_secs: self.to_seconds(self.current_duration as f64),
            mean_duration_secs: self.to_seconds(self.mean_duration),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub current_duration_frames: u64,
    pub mean_duration_frames: f64,
    pub success_count: u64,
    /// Frames sampled; denominator of the success ratio
    pub total_trials: u64,
    /// Trials closed by an end confirmation
    pub completed_trials: u64,
    pub success_ratio: f64,
    pub current_duration_secs: f64,
    pub mean_duration_secs: f64,
}
