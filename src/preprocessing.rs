// src/preprocessing.rs
//
// Hand-region cropping. Both images handed to the line-signature
// extractor are crops produced here.

use crate::error::Result;
use crate::types::{Detection, HandsConfig};
use opencv::{
    core::{Mat, Rect},
    prelude::*,
};
use tracing::debug;

/// Pixel rectangle around the visible hands, or `None` when there is no
/// hand box or the adjusted region is empty.
pub fn hand_region(
    image_width: i32,
    image_height: i32,
    detections: &[Detection],
    hands: &HandsConfig,
) -> Option<Rect> {
    let w = image_width as f64;
    let h = image_height as f64;

    let (mut x1, mut y1, mut x2, mut y2) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    let mut found = false;
    for det in hands.hands_in(detections) {
        found = true;
        x1 = x1.min((det.center_x - det.width / 2.0) * w);
        y1 = y1.min((det.center_y - det.height / 2.0) * h);
        x2 = x2.max((det.center_x + det.width / 2.0) * w);
        y2 = y2.max((det.center_y + det.height / 2.0) * h);
    }
    if !found {
        return None;
    }

    let crop = &hands.crop;

    // Shrink around the centre
    let dx = (x2 - x1) * crop.width_reduction / 2.0;
    let dy = (y2 - y1) * crop.height_reduction / 2.0;
    let (x1, y1, x2, y2) = (x1 + dx, y1 + dy, x2 - dx, y2 - dy);

    // Grow back by the shrunk size on every side
    let mx = (x2 - x1) * crop.move_factor;
    let my = (y2 - y1) * crop.move_factor;
    let x1 = (x1 - mx).clamp(0.0, w).round() as i32;
    let y1 = (y1 - my).clamp(0.0, h).round() as i32;
    let x2 = (x2 + mx).clamp(0.0, w).round() as i32;
    let y2 = (y2 + my).clamp(0.0, h).round() as i32;

    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Rect::new(x1, y1, x2 - x1, y2 - y1))
}

/// Owned copy of the hand region, or of the whole image when no region
/// can be formed.
pub fn crop_hand_region(image: &Mat, detections: &[Detection], hands: &HandsConfig) -> Result<Mat> {
    let size = image.size()?;
    match hand_region(size.width, size.height, detections, hands) {
        Some(rect) => {
            debug!("Hand crop {:?} of {}x{}", rect, size.width, size.height);
            Ok(Mat::roi(image, rect)?.try_clone()?)
        }
        None => {
            debug!("No hand region, using full {}x{} frame", size.width, size.height);
            Ok(image.try_clone()?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    fn hand(class_id: u32, x: f64, y: f64, w: f64, h: f64) -> Detection {
        Detection {
            class_id,
            center_x: x,
            center_y: y,
            width: w,
            height: h,
        }
    }

    #[test]
    fn test_region_around_two_hands() {
        let dets = [
            hand(0, 0.3, 0.5, 0.2, 0.2),
            hand(1, 0.7, 0.5, 0.2, 0.2),
        ];
        let rect = hand_region(1000, 1000, &dets, &HandsConfig::default()).unwrap();
        assert_eq!(rect, Rect::new(320, 380, 360, 240));
    }

    #[test]
    fn test_region_ignores_other_classes() {
        let dets = [hand(0, 0.5, 0.5, 0.2, 0.2), hand(7, 0.1, 0.1, 0.1, 0.1)];
        let rect = hand_region(1000, 1000, &dets, &HandsConfig::default()).unwrap();
        // 200 px box shrinks to 40 x 80, then grows by the same on each side
        assert_eq!(rect, Rect::new(440, 380, 120, 240));
    }

    #[test]
    fn test_region_is_clamped() {
        let dets = [hand(0, 0.02, 0.98, 0.3, 0.3)];
        let rect = hand_region(100, 100, &dets, &HandsConfig::default()).unwrap();
        assert_eq!(rect.x, 0);
        assert_eq!(rect.y + rect.height, 100);
    }

    #[test]
    fn test_no_hands_no_region() {
        let dets = [hand(5, 0.5, 0.5, 0.2, 0.2)];
        assert!(hand_region(640, 480, &dets, &HandsConfig::default()).is_none());
        assert!(hand_region(640, 480, &[], &HandsConfig::default()).is_none());
    }

    #[test]
    fn test_crop_falls_back_to_full_image() {
        let image = Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::all(10.0)).unwrap();
        let crop = crop_hand_region(&image, &[], &HandsConfig::default()).unwrap();
        assert_eq!(crop.cols(), 64);
        assert_eq!(crop.rows(), 48);

        let dets = [hand(0, 0.5, 0.5, 0.5, 0.5)];
        let crop = crop_hand_region(&image, &dets, &HandsConfig::default()).unwrap();
        assert!(crop.cols() < 64);
        assert!(crop.rows() < 48);
    }
}
