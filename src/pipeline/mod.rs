//! Plate recognition pipelines
//!
//! `MultiTaskPipeline` drives a joint detector (boxes + corners + layer flag) and is the
//! default path. `LegacyPipeline` is the older detector / vertex-predictor combination.

pub mod legacy;
pub mod multitask;

use image::{DynamicImage, RgbImage};

use crate::error::{LprError, Result};
use crate::vision::Recognizer;

pub use legacy::{find_adjacent_boxes, LegacyPipeline};
pub use multitask::{ClassifierLabel, DetectionCandidate, MultiTaskPipeline, CLASSIFIER_LABELS};

/// Validate the input image and convert it to 8-bit RGB
pub(crate) fn to_rgb(image: &DynamicImage) -> Result<RgbImage> {
    let channels = image.color().channel_count();
    if channels != 3 {
        return Err(LprError::InvalidInput(format!(
            "expected a 3-channel image, got {} channel(s)",
            channels
        )));
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(LprError::InvalidInput("image is empty".to_string()));
    }
    Ok(image.to_rgb8())
}

/// Recognize a crop; an empty crop yields no text without calling the recognizer
pub(crate) fn recognize_crop<R: Recognizer>(
    recognizer: &mut R,
    crop: &RgbImage,
) -> Result<(String, f32)> {
    if crop.width() == 0 || crop.height() == 0 {
        return Ok((String::new(), 0.0));
    }
    Ok(recognizer.recognize(crop)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbaImage};

    #[test]
    fn test_to_rgb_rejects_other_channel_counts() {
        let gray = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        assert!(matches!(to_rgb(&gray), Err(LprError::InvalidInput(_))));

        let rgba = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
        assert!(matches!(to_rgb(&rgba), Err(LprError::InvalidInput(_))));

        let rgb = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        assert_eq!(to_rgb(&rgb).unwrap().dimensions(), (4, 4));
    }

    #[test]
    fn test_to_rgb_rejects_empty_image() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(to_rgb(&empty), Err(LprError::InvalidInput(_))));
    }
}
