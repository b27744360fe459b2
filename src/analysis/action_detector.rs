// src/analysis/action_detector.rs
//
// Two-stage hysteresis over line signatures. A sub-action is declared only
// after two temporally separated matching observations with the dominant
// hand moving in between:
//
//   Unarmed ──(signature matches window, tight angle)──▶ Armed (anchor hand)
//   Armed   ──(signature matches window, hand moved)───▶ Confirmed
//
// Poke clears its window on arming, pen keeps it. Both behaviours are
// driven by `ActionConfig::clear_window_on_arm`.

use super::line_signature::{ActionBounds, LineSignature};
use crate::types::{ActionConfig, ActionKind};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ActionStage {
    #[default]
    Unarmed,
    Armed,
    Confirmed,
}

impl ActionStage {
    /// Numeric label shown to the annotator (0, 1, 2)
    pub fn value(self) -> u8 {
        match self {
            Self::Unarmed => 0,
            Self::Armed => 1,
            Self::Confirmed => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionTransition {
    Armed,
    Confirmed,
}

pub struct ActionDetector {
    kind: ActionKind,
    config: ActionConfig,
    stage: ActionStage,
    anchor: Option<(f64, f64)>,
    window: VecDeque<LineSignature>,
}

impl ActionDetector {
    pub fn new(kind: ActionKind, config: ActionConfig) -> Self {
        Self {
            kind,
            window: VecDeque::with_capacity(config.window + 1),
            config,
            stage: ActionStage::Unarmed,
            anchor: None,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn stage(&self) -> ActionStage {
        self.stage
    }

    pub fn anchor(&self) -> Option<(f64, f64)> {
        self.anchor
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn bounds(&self) -> ActionBounds {
        ActionBounds::from(&self.config)
    }

    /// Whether the classifier score allows evaluating this kind on a frame.
    pub fn qualifies(&self, score: f32) -> bool {
        score > self.config.score_threshold
    }

    /// Feed one extracted signature with the dominant hand's position.
    pub fn observe(
        &mut self,
        frame: usize,
        signature: LineSignature,
        dominant: (f64, f64),
    ) -> Option<ActionTransition> {
        let transition = match self.stage {
            ActionStage::Unarmed => self.try_arm(signature, dominant),
            ActionStage::Armed => self.try_confirm(signature, dominant),
            ActionStage::Confirmed => None,
        };

        match transition {
            Some(ActionTransition::Armed) => info!(
                "✴️  {} armed at frame {} (len={:.3}, θ={:.3})",
                self.kind, frame, signature.length, signature.angle
            ),
            Some(ActionTransition::Confirmed) => info!(
                "✅ {} confirmed at frame {} (len={:.3}, θ={:.3})",
                self.kind, frame, signature.length, signature.angle
            ),
            None => debug!(
                "{} signature at frame {}: len={:.3} θ={:.3}, stage {:?}",
                self.kind, frame, signature.length, signature.angle, self.stage
            ),
        }

        self.window.push_back(signature);
        while self.window.len() > self.config.window {
            self.window.pop_front();
        }

        transition
    }

    fn length_matches(&self, a: &LineSignature, b: &LineSignature) -> bool {
        (a.length - b.length).abs() < self.config.length_tolerance
    }

    fn try_arm(&mut self, signature: LineSignature, dominant: (f64, f64)) -> Option<ActionTransition> {
        let matched = self.window.iter().any(|previous| {
            self.length_matches(previous, &signature)
                && (previous.angle - signature.angle).abs() < self.config.arm_angle_tolerance
        });
        if !matched {
            return None;
        }
        self.arm(dominant);
        Some(ActionTransition::Armed)
    }

    fn try_confirm(
        &mut self,
        signature: LineSignature,
        dominant: (f64, f64),
    ) -> Option<ActionTransition> {
        let matched = self.window.iter().any(|previous| {
            self.length_matches(previous, &signature)
                && self
                    .config
                    .confirm_angle_tolerance
                    .map_or(true, |tol| (previous.angle - signature.angle).abs() < tol)
        });
        if !matched {
            return None;
        }

        let (ax, ay) = self.anchor?;
        let displacement = ((dominant.0 - ax).powi(2) + (dominant.1 - ay).powi(2)).sqrt();
        if displacement <= self.config.min_anchor_displacement {
            debug!(
                "{} match but hand moved only {:.4} from anchor",
                self.kind, displacement
            );
            return None;
        }

        self.confirm();
        Some(ActionTransition::Confirmed)
    }

    fn arm(&mut self, dominant: (f64, f64)) {
        self.stage = ActionStage::Armed;
        self.anchor = Some(dominant);
        if self.config.clear_window_on_arm {
            self.window.clear();
        }
    }

    fn confirm(&mut self) {
        self.stage = ActionStage::Confirmed;
    }

    pub fn reset(&mut self) {
        self.stage = ActionStage::Unarmed;
        self.anchor = None;
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poke() -> ActionDetector {
        ActionDetector::new(ActionKind::Poke, ActionConfig::poke())
    }

    fn pen() -> ActionDetector {
        ActionDetector::new(ActionKind::Pen, ActionConfig::pen())
    }

    #[test]
    fn test_poke_arm_then_confirm() {
        let mut det = poke();
        let sig = LineSignature::new(31.4, 2.0);

        // First sighting only seeds the window
        assert_eq!(det.observe(8, sig, (0.60, 0.50)), None);
        assert_eq!(det.stage(), ActionStage::Unarmed);

        assert_eq!(det.observe(10, sig, (0.60, 0.50)), Some(ActionTransition::Armed));
        assert_eq!(det.stage(), ActionStage::Armed);
        assert_eq!(det.anchor(), Some((0.60, 0.50)));
        // Window cleared on arming, then holds the arming signature
        assert_eq!(det.window_len(), 1);

        let later = LineSignature::new(31.41, 2.01);
        assert_eq!(
            det.observe(15, later, (0.62, 0.50)),
            Some(ActionTransition::Confirmed)
        );
        assert_eq!(det.stage().value(), 2);
    }

    #[test]
    fn test_arm_needs_tight_angle() {
        let mut det = poke();
        det.observe(0, LineSignature::new(31.0, 2.0), (0.5, 0.5));
        assert_eq!(det.observe(1, LineSignature::new(31.0, 2.02), (0.5, 0.5)), None);
        assert_eq!(det.stage(), ActionStage::Unarmed);
    }

    #[test]
    fn test_confirm_needs_hand_displacement() {
        let mut det = poke();
        let sig = LineSignature::new(31.0, 2.0);
        det.observe(0, sig, (0.5, 0.5));
        det.observe(1, sig, (0.5, 0.5));
        assert_eq!(det.stage(), ActionStage::Armed);

        assert_eq!(det.observe(2, sig, (0.505, 0.5)), None);
        assert_eq!(det.stage(), ActionStage::Armed);
        assert_eq!(det.observe(3, sig, (0.52, 0.5)), Some(ActionTransition::Confirmed));
    }

    #[test]
    fn test_poke_confirm_rechecks_angle() {
        let mut det = poke();
        let sig = LineSignature::new(31.0, 2.0);
        det.observe(0, sig, (0.5, 0.5));
        det.observe(1, sig, (0.5, 0.5));
        let off_angle = LineSignature::new(31.0, 2.1);
        assert_eq!(det.observe(2, off_angle, (0.6, 0.5)), None);
    }

    #[test]
    fn test_pen_confirm_ignores_angle_and_keeps_window() {
        let mut det = pen();
        let sig = LineSignature::new(31.5, 1.0);
        det.observe(0, sig, (0.5, 0.5));
        assert_eq!(det.observe(1, sig, (0.5, 0.5)), Some(ActionTransition::Armed));
        // Pen does not clear on arming
        assert_eq!(det.window_len(), 2);

        // Small move is not enough for pen
        assert_eq!(det.observe(2, LineSignature::new(31.5, 1.4), (0.53, 0.5)), None);
        assert_eq!(
            det.observe(3, LineSignature::new(31.51, 1.4), (0.56, 0.5)),
            Some(ActionTransition::Confirmed)
        );
    }

    #[test]
    fn test_stage_monotonic_and_bounded() {
        let mut det = poke();
        let mut last = det.stage();
        for frame in 0..40usize {
            let sig = LineSignature::new(31.0 + (frame % 3) as f64 * 0.01, 2.0);
            let hand = (0.5 + frame as f64 * 0.01, 0.5);
            det.observe(frame, sig, hand);
            assert!(det.stage() >= last);
            assert!(det.stage() <= ActionStage::Confirmed);
            assert!(det.window_len() <= 3);
            last = det.stage();
        }
        assert_eq!(det.stage(), ActionStage::Confirmed);

        det.reset();
        assert_eq!(det.stage(), ActionStage::Unarmed);
        assert_eq!(det.window_len(), 0);
        assert_eq!(det.anchor(), None);
    }

    #[test]
    fn test_score_gate() {
        assert!(!poke().qualifies(0.3));
        assert!(poke().qualifies(0.31));
        assert!(!pen().qualifies(0.5));
        assert!(pen().qualifies(0.81));
    }
}
