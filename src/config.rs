// src/config.rs

use crate::error::PhaseError;
use crate::types::{ActionConfig, ActionKind, Config};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn action(&self, kind: ActionKind) -> &ActionConfig {
        match kind {
            ActionKind::Poke => &self.poke,
            ActionKind::Pen => &self.pen,
        }
    }

    pub fn validate(&self) -> Result<(), PhaseError> {
        let [a, b] = self.hands.hand_class_ids;
        if a == b {
            return Err(PhaseError::Config(format!(
                "hand_class_ids must differ, got [{a}, {b}]"
            )));
        }
        if self.trajectory.capacity < 2 {
            return Err(PhaseError::Config(
                "trajectory.capacity must be at least 2".to_string(),
            ));
        }
        if self.gate.y_history < 2 {
            return Err(PhaseError::Config(
                "gate.y_history must be at least 2".to_string(),
            ));
        }
        if self.line_signature.canonical_size <= 0 {
            return Err(PhaseError::Config(
                "line_signature.canonical_size must be positive".to_string(),
            ));
        }
        if self.line_signature.reference_diagonal <= 0.0 {
            return Err(PhaseError::Config(
                "line_signature.reference_diagonal must be positive".to_string(),
            ));
        }
        if self.metrics.seconds_per_frame <= 0.0 {
            return Err(PhaseError::Config(
                "metrics.seconds_per_frame must be positive".to_string(),
            ));
        }

        for kind in ActionKind::ALL {
            let action = self.action(kind);
            if action.length_range[0] > action.length_range[1] {
                return Err(PhaseError::Config(format!("{kind}.length_range is inverted")));
            }
            if action.angle_range[0] > action.angle_range[1] {
                return Err(PhaseError::Config(format!("{kind}.angle_range is inverted")));
            }
            if action.window == 0 {
                return Err(PhaseError::Config(format!("{kind}.window must be non-zero")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
input:
  labels_dir: "labels"
  images_dir: "frames"
gate:
  debounce_frames: 6
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.input.labels_dir, "labels");
        assert_eq!(config.gate.debounce_frames, 6);
        assert_eq!(config.gate.y_history, 3);
        assert_eq!(config.poke.score_threshold, 0.3);
        assert_eq!(config.pen.score_threshold, 0.8);
        assert!(config.poke.clear_window_on_arm);
        assert!(!config.pen.clear_window_on_arm);
        assert_eq!(config.pen.confirm_angle_tolerance, None);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut config = Config::default();
        config.pen.length_range = [33.0, 30.0];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pen.length_range"));
    }

    #[test]
    fn test_identical_hand_ids_rejected() {
        let mut config = Config::default();
        config.hands.hand_class_ids = [1, 1];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hands_in_skips_other_classes() {
        let det = |class_id| crate::types::Detection {
            class_id,
            center_x: 0.5,
            center_y: 0.5,
            width: 0.1,
            height: 0.1,
        };
        let detections = [det(3), det(1), det(7), det(0)];
        let hands = Config::default().hands;
        let ids: Vec<u32> = hands.hands_in(&detections).iter().map(|d| d.class_id).collect();
        assert_eq!(ids, vec![1, 0]);
    }

    #[test]
    fn test_shipped_config_parses() {
        let contents = include_str!("../config.yaml");
        let config: Config = serde_yaml::from_str(contents).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.poke.length_range, [30.14, 31.15]);
    }
}
