// src/annotate.rs
//
// Writes a copy of each frame with detection boxes and a phase panel.
// Output only; nothing here feeds back into phase detection.

use crate::error::{PhaseError, Result};
use crate::pipeline::MetricsSnapshot;
use crate::types::{FrameRecord, OutputConfig, PhaseLabels};
use opencv::{
    core::{self, Mat, Vector},
    imgcodecs, imgproc,
    prelude::*,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PANEL_X: i32 = 100;
const PANEL_Y: i32 = 100;
const PANEL_WIDTH: i32 = 700;
const PANEL_HEIGHT: i32 = 500;

fn steady_color() -> core::Scalar {
    core::Scalar::new(255.0, 0.0, 0.0, 0.0)
}

fn changed_color() -> core::Scalar {
    core::Scalar::new(0.0, 255.0, 255.0, 0.0)
}

pub struct Annotator {
    out_dir: PathBuf,
    font_scale: f64,
    previous: PhaseLabels,
}

impl Annotator {
    pub fn new(config: &OutputConfig) -> Result<Self> {
        let out_dir = PathBuf::from(&config.annotated_dir);
        std::fs::create_dir_all(&out_dir)?;
        info!("🖼️  Annotated frames → {}", out_dir.display());
        Ok(Self {
            out_dir,
            font_scale: config.font_scale,
            previous: PhaseLabels::default(),
        })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Compare against the previous frame's labels and remember these.
    pub fn labels_changed(&mut self, labels: &PhaseLabels) -> bool {
        let changed = *labels != self.previous;
        self.previous = *labels;
        changed
    }

    pub fn annotate(
        &mut self,
        image: &Mat,
        frame: &FrameRecord,
        labels: &PhaseLabels,
        metrics: &MetricsSnapshot,
    ) -> Result<PathBuf> {
        let color = if self.labels_changed(labels) {
            changed_color()
        } else {
            steady_color()
        };

        let mut output = image.try_clone()?;
        let size = output.size()?;
        let (w, h) = (size.width as f64, size.height as f64);

        for det in &frame.detections {
            let x_min = ((det.center_x - det.width / 2.0) * w) as i32;
            let y_min = ((det.center_y - det.height / 2.0) * h) as i32;
            let x_max = ((det.center_x + det.width / 2.0) * w) as i32;
            let y_max = ((det.center_y + det.height / 2.0) * h) as i32;
            imgproc::rectangle(
                &mut output,
                core::Rect::new(x_min, y_min, x_max - x_min, y_max - y_min),
                color,
                2,
                imgproc::LINE_8,
                0,
            )?;
        }

        self.draw_panel(&mut output, labels, metrics, color)?;

        let path = self.output_path(frame);
        let path_str = path.to_str().ok_or_else(|| PhaseError::ImageWrite {
            path: path.clone(),
            reason: "non UTF-8 output path".to_string(),
        })?;
        if !imgcodecs::imwrite(path_str, &output, &Vector::new())? {
            return Err(PhaseError::ImageWrite {
                path,
                reason: "imwrite returned false".to_string(),
            });
        }
        debug!("Annotated frame {} → {}", frame.index, path.display());
        Ok(path)
    }

    fn draw_panel(
        &self,
        img: &mut Mat,
        labels: &PhaseLabels,
        metrics: &MetricsSnapshot,
        color: core::Scalar,
    ) -> Result<()> {
        let panel = core::Rect::new(PANEL_X, PANEL_Y, PANEL_WIDTH, PANEL_HEIGHT);

        imgproc::rectangle(
            img,
            panel,
            core::Scalar::new(235.0, 235.0, 235.0, 0.0),
            -1,
            imgproc::LINE_8,
            0,
        )?;
        imgproc::rectangle(img, panel, color, 5, imgproc::LINE_8, 0)?;

        let lines = [
            format!("Start: {}", labels.start),
            format!("Poke: {}", labels.poke),
            format!("Pen: {}", labels.pen),
            format!("End: {}", labels.end),
            format!("Avg Duration: {:.2} s", metrics.mean_duration_secs),
            format!("Current Duration: {:.2} s", metrics.current_duration_secs),
            format!("Success Ratio: {:.0}%", metrics.success_ratio),
        ];

        let line_height = (40.0 * self.font_scale).round() as i32 + 5;
        let mut y = PANEL_Y + 10 + line_height;
        for text in &lines {
            imgproc::put_text(
                img,
                text,
                core::Point::new(PANEL_X + 10, y),
                imgproc::FONT_HERSHEY_SIMPLEX,
                self.font_scale,
                core::Scalar::new(0.0, 0.0, 0.0, 0.0),
                2,
                imgproc::LINE_AA,
                false,
            )?;
            y += line_height;
        }

        Ok(())
    }

    fn output_path(&self, frame: &FrameRecord) -> PathBuf {
        match frame.image_path.as_ref().and_then(|p| p.file_name()) {
            Some(name) => self.out_dir.join(name),
            None => self.out_dir.join(format!("{}.png", frame.stem)),
        }
    }
}
