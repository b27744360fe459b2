// src/analysis/line_signature.rs
//
// (length, angle) descriptor of the dominant straight edge in the
// difference between two hand crops.
//
//   resize → gray → absdiff → Canny → Hough (rho, theta)
//          → project fixed-length segment → first in-range candidate
//
// Candidates are taken in the order the Hough transform returns them
// (strongest accumulator first), so identical pixels give identical output.

use crate::error::Result;
use crate::types::{ActionConfig, LineSignatureConfig};
use opencv::{
    core::{self, Mat, Size, Vec2f, Vector},
    imgproc,
    prelude::*,
};
use serde::Serialize;
use std::f64::consts::PI;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineSignature {
    pub length: f64,
    pub angle: f64,
}

impl LineSignature {
    pub fn new(length: f64, angle: f64) -> Self {
        Self { length, angle }
    }
}

/// Inclusive acceptance ranges for one action kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionBounds {
    pub length: [f64; 2],
    pub angle: [f64; 2],
}

impl ActionBounds {
    pub fn accepts(&self, length: f64, angle: f64) -> bool {
        self.length[0] <= length
            && length <= self.length[1]
            && self.angle[0] <= angle
            && angle <= self.angle[1]
    }
}

impl From<&ActionConfig> for ActionBounds {
    fn from(config: &ActionConfig) -> Self {
        Self {
            length: config.length_range,
            angle: config.angle_range,
        }
    }
}

/// Hough line in normal form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarLine {
    pub rho: f64,
    pub theta: f64,
}

pub struct LineSignatureExtractor {
    config: LineSignatureConfig,
}

impl LineSignatureExtractor {
    pub fn new(config: LineSignatureConfig) -> Self {
        Self { config }
    }

    pub fn extract(
        &self,
        before: &Mat,
        after: &Mat,
        bounds: &ActionBounds,
    ) -> Result<Option<LineSignature>> {
        let candidates = self.candidate_lines(before, after)?;
        let side = self.config.canonical_size as f64;
        let signature = self.select(&candidates, side, side, bounds);

        debug!(
            "{} Hough candidates, selected {:?}",
            candidates.len(),
            signature
        );
        Ok(signature)
    }

    pub fn candidate_lines(&self, before: &Mat, after: &Mat) -> Result<Vec<PolarLine>> {
        let gray_before = self.prepare(before)?;
        let gray_after = self.prepare(after)?;

        let mut diff = Mat::default();
        core::absdiff(&gray_after, &gray_before, &mut diff)?;

        let mut edges = Mat::default();
        imgproc::canny(
            &diff,
            &mut edges,
            self.config.canny_low,
            self.config.canny_high,
            self.config.canny_aperture,
            false,
        )?;

        let mut lines = Vector::<Vec2f>::new();
        imgproc::hough_lines(
            &edges,
            &mut lines,
            self.config.hough_rho,
            self.config.hough_theta,
            self.config.hough_threshold,
            0.0,
            0.0,
            0.0,
            PI,
        )?;

        Ok(lines
            .iter()
            .map(|line| PolarLine {
                rho: line[0] as f64,
                theta: line[1] as f64,
            })
            .collect())
    }

    /// Resize to the canonical square and reduce to one channel.
    fn prepare(&self, image: &Mat) -> Result<Mat> {
        let size = Size::new(self.config.canonical_size, self.config.canonical_size);
        let mut resized = Mat::default();
        imgproc::resize(image, &mut resized, size, 0.0, 0.0, imgproc::INTER_LINEAR)?;

        let code = match resized.channels() {
            1 => return Ok(resized),
            4 => imgproc::COLOR_BGRA2GRAY,
            _ => imgproc::COLOR_BGR2GRAY,
        };
        let mut gray = Mat::default();
        imgproc::cvt_color(&resized, &mut gray, code, 0)?;
        Ok(gray)
    }

    /// Endpoint-to-endpoint length of the fixed segment drawn along `line`.
    /// Endpoints are truncated to whole pixels before measuring.
    pub fn segment_length(&self, line: &PolarLine, width: f64, height: f64) -> f64 {
        let diagonal = (width * width + height * height).sqrt();
        let half = self.config.segment_half_length * diagonal / self.config.reference_diagonal;

        let (b, a) = line.theta.sin_cos();
        let x0 = a * line.rho;
        let y0 = b * line.rho;

        let x1 = (x0 + half * -b).trunc();
        let y1 = (y0 + half * a).trunc();
        let x2 = (x0 - half * -b).trunc();
        let y2 = (y0 - half * a).trunc();

        ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt()
    }

    pub fn select(
        &self,
        candidates: &[PolarLine],
        width: f64,
        height: f64,
        bounds: &ActionBounds,
    ) -> Option<LineSignature> {
        candidates.iter().find_map(|line| {
            let length = self.segment_length(line, width, height);
            bounds
                .accepts(length, line.theta)
                .then(|| LineSignature::new(length, line.theta))
        })
    }
}
