// src/analysis/trajectory.rs

use crate::types::{Detection, TrajectoryConfig};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySample {
    pub x: f64,
    pub y: f64,
    pub height: f64,
}

impl TrajectorySample {
    pub fn new(x: f64, y: f64, height: f64) -> Self {
        Self { x, y, height }
    }

    pub fn of(det: &Detection) -> Self {
        Self::new(det.center_x, det.center_y, det.height)
    }

    fn distance_to(&self, other: &TrajectorySample) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PickUpEvent {
    pub frame: usize,
}

/// Recent positions of one hand. Detects the reach-contract-lift pattern
/// of picking an object up: a large upward move, the box shrinking as the
/// fingers close, then a small lift.
pub struct TrajectoryTracker {
    samples: VecDeque<TrajectorySample>,
    config: TrajectoryConfig,
}

impl TrajectoryTracker {
    pub fn new(config: TrajectoryConfig) -> Self {
        Self {
            samples: VecDeque::with_capacity(config.capacity),
            config,
        }
    }

    pub fn observe(&mut self, frame: usize, current: TrajectorySample) -> Option<PickUpEvent> {
        let event = self.detect_pick_up(frame, &current);
        if event.is_some() {
            self.samples.clear();
        }
        self.push(current);
        event
    }

    fn detect_pick_up(&self, frame: usize, current: &TrajectorySample) -> Option<PickUpEvent> {
        let n = self.samples.len();
        if n < 2 {
            return None;
        }
        let last = self.samples[n - 1];
        let second_last = self.samples[n - 2];

        // The most recent sample is the short-horizon reference, not a reach origin
        for historical in self.samples.iter().take(n - 1) {
            let reach = current.distance_to(historical) > self.config.reach_distance
                && current.y < historical.y;
            if !reach {
                continue;
            }

            let contraction = last.height - current.height;
            if contraction <= self.config.min_height_contraction {
                continue;
            }

            let dx = current.x - second_last.x;
            let dy = second_last.y - current.y;
            if dx.abs() > self.config.pickup_shift || dy.abs() > self.config.pickup_shift {
                debug!(
                    "Pick-up at frame {}: contraction={:.3} shift=({:+.3}, {:+.3})",
                    frame, contraction, dx, dy
                );
                return Some(PickUpEvent { frame });
            }
        }

        None
    }

    fn push(&mut self, sample: TrajectorySample) {
        if let Some(last) = self.samples.back() {
            if last.x == sample.x && last.y == sample.y {
                return;
            }
        }
        self.samples.push_back(sample);
        while self.samples.len() > self.config.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}
