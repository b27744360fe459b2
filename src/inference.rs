// src/inference.rs
//
// Per-frame action confidences. The driver only evaluates an action kind
// on frames where its score clears the kind's threshold.

use crate::types::{ClassifierConfig, Config, FrameRecord};
use anyhow::{Context, Result};
use ndarray::Array4;
use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
};
#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Raw classifier output for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionScores(pub Vec<f32>);

impl ActionScores {
    /// Score at `index`, 0 when the model emitted fewer classes.
    pub fn get(&self, index: usize) -> f32 {
        self.0.get(index).copied().unwrap_or(0.0)
    }
}

pub trait ActionClassifier {
    fn scores(&mut self, frame: &FrameRecord, crop: &Mat) -> Result<ActionScores>;
}

// ============================================================================
// ONNX
// ============================================================================

pub struct OnnxActionClassifier {
    session: Session,
    config: ClassifierConfig,
}

impl OnnxActionClassifier {
    pub fn new(model_path: &str, config: ClassifierConfig) -> Result<Self> {
        info!("Initializing action classifier");
        info!("Model path: {}", model_path);

        #[allow(unused_mut)]
        let mut session_builder = Session::builder()?;

        #[cfg(feature = "cuda")]
        if config.use_cuda {
            info!("Enabling CUDA execution provider");
            session_builder = session_builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(0)
                    .build()])?;
        }
        #[cfg(not(feature = "cuda"))]
        if config.use_cuda {
            warn!("CUDA requested but this build has no `cuda` feature, using CPU");
        }

        let session = session_builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.num_threads)?
            .with_inter_threads(1)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load action model {}", model_path))?;

        info!("✓ Action classifier ready");
        Ok(Self { session, config })
    }

    /// Resize to the model input, BGR→RGB, scale to [0, 1], NCHW.
    fn to_tensor(&self, crop: &Mat) -> Result<Array4<f32>> {
        let (w, h) = (self.config.input_width, self.config.input_height);

        let mut resized = Mat::default();
        imgproc::resize(
            crop,
            &mut resized,
            Size::new(w as i32, h as i32),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let code = match resized.channels() {
            1 => imgproc::COLOR_GRAY2RGB,
            4 => imgproc::COLOR_BGRA2RGB,
            _ => imgproc::COLOR_BGR2RGB,
        };
        let mut rgb = Mat::default();
        imgproc::cvt_color(&resized, &mut rgb, code, 0)?;

        let data = rgb.data_bytes()?;
        let mut input = Array4::<f32>::zeros((1, 3, h, w));
        for y in 0..h {
            for x in 0..w {
                let px = (y * w + x) * 3;
                for c in 0..3 {
                    input[[0, c, y, x]] = data[px + c] as f32 / 255.0;
                }
            }
        }
        Ok(input)
    }
}

impl ActionClassifier for OnnxActionClassifier {
    fn scores(&mut self, frame: &FrameRecord, crop: &Mat) -> Result<ActionScores> {
        let input = Tensor::from_array(self.to_tensor(crop)?)?;
        let outputs = self
            .session
            .run(ort::inputs![self.config.input_name.as_str() => input])?;

        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
        let scores = data.to_vec();
        debug!("Frame {} scores: {:?}", frame.stem, scores);
        Ok(ActionScores(scores))
    }
}

// ============================================================================
// PRECOMPUTED
// ============================================================================

/// Scores replayed from a JSON object keyed by frame stem.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedScores {
    by_stem: HashMap<String, Vec<f32>>,
}

impl PrecomputedScores {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scores file {}", path.display()))?;
        let by_stem: HashMap<String, Vec<f32>> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse scores file {}", path.display()))?;
        info!("Loaded precomputed scores for {} frames", by_stem.len());
        Ok(Self { by_stem })
    }

    pub fn from_map(by_stem: HashMap<String, Vec<f32>>) -> Self {
        Self { by_stem }
    }

    pub fn len(&self) -> usize {
        self.by_stem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_stem.is_empty()
    }
}

impl ActionClassifier for PrecomputedScores {
    fn scores(&mut self, frame: &FrameRecord, _crop: &Mat) -> Result<ActionScores> {
        match self.by_stem.get(&frame.stem) {
            Some(scores) => Ok(ActionScores(scores.clone())),
            None => {
                debug!("No precomputed scores for {}", frame.stem);
                Ok(ActionScores::default())
            }
        }
    }
}

/// Precomputed scores win over a model; with neither, no frame qualifies.
pub fn build_classifier(config: &Config) -> Result<Box<dyn ActionClassifier>> {
    if let Some(path) = &config.input.scores_path {
        return Ok(Box::new(PrecomputedScores::load(path)?));
    }
    if let Some(model) = &config.classifier.model_path {
        return Ok(Box::new(OnnxActionClassifier::new(
            model,
            config.classifier.clone(),
        )?));
    }
    warn!("No action scores or model configured, poke/pen will stay unarmed");
    Ok(Box::new(PrecomputedScores::default()))
}
