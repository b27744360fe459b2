// src/detections.rs
//
// YOLO label files: one per frame, one object per line,
// `class_id center_x center_y width height` (normalized).

use crate::error::{PhaseError, Result};
use crate::types::{Detection, FrameRecord, InputConfig};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub fn parse_detection_line(path: &Path, line_no: usize, line: &str) -> Result<Detection> {
    let malformed = |reason: String| PhaseError::MalformedDetectionLine {
        path: path.to_path_buf(),
        line: line_no,
        reason,
    };

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return Err(malformed(format!("expected 5 fields, got {}", parts.len())));
    }

    let class_id = parts[0]
        .parse::<u32>()
        .map_err(|e| malformed(format!("class id {:?}: {e}", parts[0])))?;

    let mut values = [0.0f64; 4];
    for (slot, raw) in values.iter_mut().zip(&parts[1..5]) {
        *slot = raw
            .parse::<f64>()
            .map_err(|e| malformed(format!("coordinate {raw:?}: {e}")))?;
    }

    Ok(Detection {
        class_id,
        center_x: values[0],
        center_y: values[1],
        width: values[2],
        height: values[3],
    })
}

/// Parse label file contents. Malformed lines are logged and dropped.
pub fn parse_detections(path: &Path, contents: &str) -> Vec<Detection> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(i, line)| match parse_detection_line(path, i + 1, line) {
            Ok(detection) => Some(detection),
            Err(e) => {
                debug!("Dropping line: {}", e);
                None
            }
        })
        .collect()
}

pub fn parse_detection_file(path: &Path) -> Result<Vec<Detection>> {
    let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => PhaseError::MissingDetectionFile(path.to_path_buf()),
        _ => PhaseError::Io(e),
    })?;
    Ok(parse_detections(path, &contents))
}

/// List label files in lexicographic order, parse them and pair each
/// with the frame image sharing its stem.
pub fn load_frames(input: &InputConfig) -> Result<Vec<FrameRecord>> {
    let labels_dir = Path::new(&input.labels_dir);
    if !labels_dir.is_dir() {
        return Err(PhaseError::MissingDetectionFile(labels_dir.to_path_buf()));
    }

    let label_paths = list_label_files(labels_dir);

    let images_dir = Path::new(&input.images_dir);
    let mut frames = Vec::with_capacity(label_paths.len());
    let mut unpaired = 0usize;

    for (index, label_path) in label_paths.into_iter().enumerate() {
        let stem = label_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let detections = parse_detection_file(&label_path)?;
        let image_path = find_image(images_dir, &stem, &input.image_extensions);
        if image_path.is_none() {
            unpaired += 1;
        }

        frames.push(FrameRecord {
            index,
            stem,
            label_path,
            image_path,
            detections,
        });
    }

    if unpaired > 0 {
        warn!(
            "{} of {} label files have no matching image in {}",
            unpaired,
            frames.len(),
            images_dir.display()
        );
    }
    info!(
        "Loaded {} frames from {}",
        frames.len(),
        labels_dir.display()
    );

    Ok(frames)
}

/// `.txt` files directly under `labels_dir`, sorted by file name. Entries
/// the walk cannot read are logged and left out.
fn list_label_files(labels_dir: &Path) -> Vec<PathBuf> {
    let mut label_paths = Vec::new();
    for entry in WalkDir::new(labels_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", labels_dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().and_then(|e| e.to_str()) == Some("txt")
        {
            label_paths.push(path.to_path_buf());
        }
    }
    label_paths
}

fn find_image(images_dir: &Path, stem: &str, extensions: &[String]) -> Option<PathBuf> {
    extensions
        .iter()
        .map(|ext| images_dir.join(format!("{stem}.{ext}")))
        .find(|candidate| candidate.is_file())
}
