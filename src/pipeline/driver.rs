// src/pipeline/driver.rs
//
// Owns the run. A resolver pre-pass over every frame's detections fixes
// hand roles, then frames stream through image work and the phase engine
// in listing order.

use super::phase_engine::{process_frame, FrameObservation};
use super::run_context::{RunContext, RunSummary};
use crate::analysis::{resolve_hand_roles, LineSignature, LineSignatureExtractor};
use crate::annotate::Annotator;
use crate::error::PhaseError;
use crate::inference::{ActionClassifier, ActionScores};
use crate::preprocessing::crop_hand_region;
use crate::types::{ActionKind, Config, FrameRecord};
use anyhow::{Context, Result};
use opencv::{core::Mat, imgcodecs, prelude::*};
use tracing::{debug, info, warn};

pub struct Driver {
    config: Config,
    classifier: Box<dyn ActionClassifier>,
    extractor: LineSignatureExtractor,
    annotator: Option<Annotator>,
}

impl Driver {
    pub fn new(config: Config, classifier: Box<dyn ActionClassifier>) -> Result<Self> {
        let annotator = if config.output.save_annotated {
            Some(Annotator::new(&config.output).context("Failed to prepare annotation output")?)
        } else {
            None
        };

        Ok(Self {
            extractor: LineSignatureExtractor::new(config.line_signature.clone()),
            classifier,
            annotator,
            config,
        })
    }

    /// Resolve hand roles from the whole sequence and build the run context.
    pub fn prepare(&self, frames: &[FrameRecord]) -> RunContext {
        let resolution = resolve_hand_roles(
            frames.iter().map(|f| f.detections.as_slice()),
            self.config.hands.hand_class_ids,
        );
        RunContext::new(&self.config, resolution.roles)
    }

    pub fn run(&mut self, frames: &[FrameRecord]) -> Result<RunSummary> {
        info!("🎬 Processing {} frames", frames.len());

        let mut ctx = self.prepare(frames);
        for frame in frames {
            self.process(&mut ctx, frame)
                .with_context(|| format!("Frame {} ({})", frame.index, frame.stem))?;
        }

        let summary = ctx.summary();
        info!(
            "✓ Run complete: {} frames, {} skipped, {} trials started, {} ended",
            summary.frames_processed,
            summary.frames_skipped,
            summary.final_labels.start,
            summary.final_labels.end
        );
        info!("  Processing Speed: {:.1} FPS", ctx.metrics.fps());
        Ok(summary)
    }

    fn process(&mut self, ctx: &mut RunContext, frame: &FrameRecord) -> Result<()> {
        let (image, crop) = match self.load_and_crop(frame) {
            Ok(loaded) => loaded,
            Err(err) => return self.skip_or_fail(ctx, frame, err),
        };

        let scores = match self.classifier.scores(frame, &crop) {
            Ok(scores) => scores,
            Err(e) => {
                let err = PhaseError::Classifier {
                    stem: frame.stem.clone(),
                    reason: format!("{e:#}"),
                };
                return self.skip_or_fail(ctx, frame, err);
            }
        };

        let signatures = match self.extract_signatures(ctx, &crop, &scores) {
            Ok(signatures) => signatures,
            Err(err) => return self.skip_or_fail(ctx, frame, err),
        };

        let mut obs = FrameObservation::new(frame.index, &frame.detections);
        for (kind, signature) in ActionKind::ALL.into_iter().zip(signatures) {
            obs.set_signature(kind, signature);
        }

        let outcome = process_frame(ctx, &obs);
        for event in &outcome.events {
            debug!("{}", event);
        }

        if let Some(annotator) = self.annotator.as_mut() {
            let metrics = ctx.metrics.snapshot();
            if let Err(e) = annotator.annotate(&image, frame, &outcome.labels, &metrics) {
                warn!("Annotation failed for {}: {}", frame.stem, e);
            }
        }

        ctx.previous_crop = Some(crop);
        Ok(())
    }

    fn load_and_crop(&self, frame: &FrameRecord) -> Result<(Mat, Mat), PhaseError> {
        let image = load_image(frame)?;
        let crop = crop_hand_region(&image, &frame.detections, &self.config.hands)?;
        Ok((image, crop))
    }

    /// Signatures in `ActionKind::ALL` order. A kind is only evaluated when
    /// its score qualifies and there is a previous crop to diff against.
    fn extract_signatures(
        &self,
        ctx: &RunContext,
        crop: &Mat,
        scores: &ActionScores,
    ) -> Result<[Option<LineSignature>; 2], PhaseError> {
        let mut out = [None, None];
        let Some(previous) = ctx.previous_crop.as_ref() else {
            return Ok(out);
        };

        for (slot, kind) in ActionKind::ALL.into_iter().enumerate() {
            let detector = ctx.detector(kind);
            let score = scores.get(self.score_index(kind));
            if !detector.qualifies(score) {
                continue;
            }
            out[slot] = self.extractor.extract(previous, crop, &detector.bounds())?;
            debug!("{} score {:.3} → {:?}", kind, score, out[slot]);
        }
        Ok(out)
    }

    fn score_index(&self, kind: ActionKind) -> usize {
        match kind {
            ActionKind::Poke => self.config.classifier.poke_index,
            ActionKind::Pen => self.config.classifier.pen_index,
        }
    }

    fn skip_or_fail(&self, ctx: &mut RunContext, frame: &FrameRecord, err: PhaseError) -> Result<()> {
        if !self.config.failure.skip_unreadable_frames {
            return Err(err.into());
        }
        warn!("⚠️  Skipping frame {} ({}): {}", frame.index, frame.stem, err);
        ctx.record_skip(frame.index, &frame.stem, err.to_string());
        ctx.events.close_frame();
        Ok(())
    }
}

fn load_image(frame: &FrameRecord) -> Result<Mat, PhaseError> {
    let path = frame.image_path.as_ref().ok_or_else(|| PhaseError::ImageLoad {
        path: frame.label_path.clone(),
        reason: "no image paired with this detection file".to_string(),
    })?;
    let path_str = path.to_str().ok_or_else(|| PhaseError::ImageLoad {
        path: path.clone(),
        reason: "non UTF-8 path".to_string(),
    })?;

    let image = imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR)?;
    if image.empty() {
        return Err(PhaseError::ImageLoad {
            path: path.clone(),
            reason: "unreadable or empty image".to_string(),
        });
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::PrecomputedScores;
    use crate::types::Detection;
    use opencv::core::{Scalar, Vector, CV_8UC3};
    use std::path::Path;

    struct FailingClassifier;

    impl ActionClassifier for FailingClassifier {
        fn scores(&mut self, _frame: &FrameRecord, _crop: &Mat) -> Result<ActionScores> {
            anyhow::bail!("model returned no action scores")
        }
    }

    fn frame(index: usize, detections: Vec<Detection>) -> FrameRecord {
        FrameRecord {
            index,
            stem: format!("frame_{index:03}"),
            label_path: format!("frame_{index:03}.txt").into(),
            image_path: None,
            detections,
        }
    }

    fn hand(class_id: u32, x: f64) -> Detection {
        Detection {
            class_id,
            center_x: x,
            center_y: 0.5,
            width: 0.1,
            height: 0.1,
        }
    }

    fn frame_with_image(dir: &Path, index: usize) -> FrameRecord {
        let path = dir.join(format!("frame_{index:03}.png"));
        let image = Mat::new_rows_cols_with_default(120, 160, CV_8UC3, Scalar::all(0.0)).unwrap();
        assert!(imgcodecs::imwrite(path.to_str().unwrap(), &image, &Vector::new()).unwrap());
        FrameRecord {
            image_path: Some(path),
            ..frame(index, vec![hand(0, 0.3), hand(1, 0.7)])
        }
    }

    fn driver(config: Config) -> Driver {
        Driver::new(config, Box::new(PrecomputedScores::default())).unwrap()
    }

    #[test]
    fn test_prepare_resolves_roles_before_streaming() {
        // Class 0 drops out twice, so it is the non-dominant hand; it sits left
        let frames = vec![
            frame(0, vec![hand(0, 0.3), hand(1, 0.7)]),
            frame(1, vec![hand(1, 0.7)]),
            frame(2, vec![hand(0, 0.3), hand(1, 0.7)]),
            frame(3, vec![hand(1, 0.7)]),
        ];
        let ctx = driver(Config::default()).prepare(&frames);
        assert_eq!(ctx.roles.non_dominant(), crate::analysis::HandSide::Left);
        assert_eq!(ctx.frames_processed, 0);
    }

    #[test]
    fn test_missing_images_are_skipped_by_default() {
        let frames = vec![frame(0, vec![hand(0, 0.3)]), frame(1, vec![])];
        let summary = driver(Config::default()).run(&frames).unwrap();
        assert_eq!(summary.frames_processed, 0);
        assert_eq!(summary.frames_skipped, 2);
        assert_eq!(summary.events.len(), 2);
        assert_eq!(summary.metrics.total_trials, 0);
    }

    #[test]
    fn test_missing_image_is_fatal_when_configured() {
        let mut config = Config::default();
        config.failure.skip_unreadable_frames = false;
        let frames = vec![frame(0, vec![])];
        assert!(driver(config).run(&frames).is_err());
    }

    #[test]
    fn test_classifier_failure_is_skipped_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![frame_with_image(dir.path(), 0)];
        let mut driver = Driver::new(Config::default(), Box::new(FailingClassifier)).unwrap();

        let summary = driver.run(&frames).unwrap();
        assert_eq!(summary.frames_processed, 0);
        assert_eq!(summary.frames_skipped, 1);
        assert!(summary.diagnostics[0].reason.contains("model returned no action scores"));
        assert_eq!(summary.event_counts.frames_skipped, 1);
        assert_eq!(summary.metrics.total_trials, 0);
    }

    #[test]
    fn test_classifier_failure_is_fatal_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.failure.skip_unreadable_frames = false;
        let frames = vec![frame_with_image(dir.path(), 0)];
        let mut driver = Driver::new(config, Box::new(FailingClassifier)).unwrap();

        let err = driver.run(&frames).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("frame_000"));
        assert!(message.contains("action classifier failed"));
    }
}
