// src/types.rs

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub hands: HandsConfig,
    #[serde(default)]
    pub trajectory: TrajectoryConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub line_signature: LineSignatureConfig,
    #[serde(default = "ActionConfig::poke")]
    pub poke: ActionConfig,
    #[serde(default = "ActionConfig::pen")]
    pub pen: ActionConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub failure: FailureConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            output: OutputConfig::default(),
            hands: HandsConfig::default(),
            trajectory: TrajectoryConfig::default(),
            gate: GateConfig::default(),
            line_signature: LineSignatureConfig::default(),
            poke: ActionConfig::poke(),
            pen: ActionConfig::pen(),
            classifier: ClassifierConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
            failure: FailureConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Directory holding one YOLO label file per frame
    pub labels_dir: String,
    /// Directory holding the frame images, paired with labels by file stem
    pub images_dir: String,
    pub image_extensions: Vec<String>,
    /// Optional JSON file of precomputed action scores keyed by frame stem
    pub scores_path: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            labels_dir: "runs/detect/predict/labels".to_string(),
            images_dir: "frames".to_string(),
            image_extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            scores_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub save_annotated: bool,
    pub annotated_dir: String,
    pub font_scale: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_annotated: false,
            annotated_dir: "output/annotated".to_string(),
            font_scale: 1.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandsConfig {
    /// Detector class ids of the two hands
    pub hand_class_ids: [u32; 2],
    pub crop: CropConfig,
}

impl Default for HandsConfig {
    fn default() -> Self {
        Self {
            hand_class_ids: [0, 1],
            crop: CropConfig::default(),
        }
    }
}

impl HandsConfig {
    pub fn is_hand(&self, class_id: u32) -> bool {
        self.hand_class_ids.contains(&class_id)
    }

    /// Hand boxes among a frame's detections, in file order.
    pub fn hands_in<'d>(&self, detections: &'d [Detection]) -> Vec<&'d Detection> {
        detections.iter().filter(|d| self.is_hand(d.class_id)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    pub width_reduction: f64,
    pub height_reduction: f64,
    /// Fraction of the shrunk box added back on every side
    pub move_factor: f64,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            width_reduction: 0.8,
            height_reduction: 0.6,
            move_factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    pub capacity: usize,
    pub reach_distance: f64,
    pub min_height_contraction: f64,
    pub pickup_shift: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            capacity: 3,
            reach_distance: 0.2,
            min_height_contraction: 0.02,
            pickup_shift: 0.03,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum frame separation between accepted Start (or End) events
    pub debounce_frames: i64,
    pub y_history: usize,
    /// Reset the poke/pen detectors whenever a new trial starts
    pub reset_actions_on_start: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            debounce_frames: 4,
            y_history: 3,
            reset_actions_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSignatureConfig {
    pub canonical_size: i32,
    pub canny_low: f64,
    pub canny_high: f64,
    pub canny_aperture: i32,
    pub hough_rho: f64,
    pub hough_theta: f64,
    pub hough_threshold: i32,
    pub segment_half_length: f64,
    pub reference_diagonal: f64,
}

impl Default for LineSignatureConfig {
    fn default() -> Self {
        Self {
            canonical_size: 224,
            canny_low: 150.0,
            canny_high: 160.0,
            canny_aperture: 3,
            hough_rho: 1.5,
            hough_theta: PI / 180.0,
            hough_threshold: 100,
            segment_half_length: 100.0,
            reference_diagonal: 2000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Classifier score the frame must exceed before extraction runs
    pub score_threshold: f32,
    pub length_range: [f64; 2],
    pub angle_range: [f64; 2],
    pub window: usize,
    pub length_tolerance: f64,
    pub arm_angle_tolerance: f64,
    /// `None` skips the angle recheck on confirmation
    pub confirm_angle_tolerance: Option<f64>,
    pub min_anchor_displacement: f64,
    pub clear_window_on_arm: bool,
}

impl ActionConfig {
    pub fn poke() -> Self {
        Self {
            score_threshold: 0.3,
            length_range: [30.14, 31.15],
            angle_range: [FRAC_PI_2, PI],
            window: 3,
            length_tolerance: 0.03,
            arm_angle_tolerance: 0.01,
            confirm_angle_tolerance: Some(0.05),
            min_anchor_displacement: 0.01,
            clear_window_on_arm: true,
        }
    }

    pub fn pen() -> Self {
        Self {
            score_threshold: 0.8,
            length_range: [30.32, 32.33],
            angle_range: [0.1, FRAC_PI_2],
            window: 3,
            length_tolerance: 0.03,
            arm_angle_tolerance: 0.01,
            confirm_angle_tolerance: None,
            min_anchor_displacement: 0.05,
            clear_window_on_arm: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// ONNX model scoring poke/pen per frame; ignored when scores are precomputed
    pub model_path: Option<String>,
    pub input_name: String,
    pub input_width: usize,
    pub input_height: usize,
    pub poke_index: usize,
    pub pen_index: usize,
    pub num_threads: usize,
    pub use_cuda: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_name: "input".to_string(),
            input_width: 224,
            input_height: 224,
            poke_index: 1,
            pen_index: 2,
            num_threads: 4,
            use_cuda: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub seconds_per_frame: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            seconds_per_frame: 0.167,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "hand_phase_analyzer=info,ort=warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureConfig {
    /// Skip frames whose image cannot be read instead of aborting the run
    pub skip_unreadable_frames: bool,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            skip_unreadable_frames: true,
        }
    }
}

// ============================================================================
// FRAME DATA
// ============================================================================

/// One detected object, normalized to [0, 1] of the frame size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Detection {
    pub fn position(&self) -> (f64, f64) {
        (self.center_x, self.center_y)
    }
}

#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub index: usize,
    pub stem: String,
    pub label_path: PathBuf,
    pub image_path: Option<PathBuf>,
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Poke,
    Pen,
}

impl ActionKind {
    pub const ALL: [ActionKind; 2] = [ActionKind::Poke, ActionKind::Pen];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poke => "poke",
            Self::Pen => "pen",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-frame label map handed to the annotator: {start, poke, pen, end}
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseLabels {
    pub start: u32,
    pub poke: u8,
    pub pen: u8,
    pub end: u32,
}

impl PhaseLabels {
    pub fn both_actions_confirmed(&self) -> bool {
        self.poke == 2 && self.pen == 2
    }
}
