//! Image preprocessing for the plate models
//!
//! Handles resizing, normalization, and tensor conversion for the detector, recognizer and
//! classifier ONNX models.

use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use ndarray::{Array3, Array4};

/// Channel order a model was trained with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Geometry of a letterboxed detector input, needed to map outputs back
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Resize factor applied to the source image
    pub scale: f32,
    /// Left padding in model pixels
    pub pad_x: f32,
    /// Top padding in model pixels
    pub pad_y: f32,
}

impl Letterbox {
    /// Map a point from model input space back to source-image pixels
    pub fn restore(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Convert an RGB image to an HWC f32 array scaled to 0-1
pub fn rgb_to_array(image: &RgbImage, order: ChannelOrder) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut arr = Array3::<f32>::zeros((height as usize, width as usize, 3));

    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let channels = match order {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Bgr => [b, g, r],
        };
        for (c, value) in channels.iter().enumerate() {
            arr[[y as usize, x as usize, c]] = *value as f32 / 255.0;
        }
    }

    arr
}

/// Normalize image with mean and std
pub fn normalize(image: &Array3<f32>, mean: &[f32; 3], std: &[f32; 3]) -> Array3<f32> {
    let (h, w, _) = image.dim();
    let mut normalized = Array3::<f32>::zeros((h, w, 3));

    for y in 0..h {
        for x in 0..w {
            for c in 0..3 {
                normalized[[y, x, c]] = (image[[y, x, c]] - mean[c]) / std[c];
            }
        }
    }

    normalized
}

/// Convert HWC image to NCHW tensor (batch size 1)
pub fn hwc_to_nchw(image: &Array3<f32>) -> Array4<f32> {
    let (h, w, c) = image.dim();
    let mut tensor = Array4::<f32>::zeros((1, c, h, w));

    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                tensor[[0, ch, y, x]] = image[[y, x, ch]];
            }
        }
    }

    tensor
}

/// Resize into a `size x size` square keeping aspect ratio, padding with gray
pub fn letterbox(image: &RgbImage, size: u32) -> (RgbImage, Letterbox) {
    let (w, h) = image.dimensions();
    let scale = size as f32 / w.max(h).max(1) as f32;
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, size);

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([114, 114, 114]));
    imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    (
        canvas,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// Detector input: letterboxed RGB in 0-1, NCHW
pub fn preprocess_for_detection(image: &RgbImage, size: u32) -> (Array4<f32>, Letterbox) {
    let (boxed, info) = letterbox(image, size);
    let arr = rgb_to_array(&boxed, ChannelOrder::Rgb);
    (hwc_to_nchw(&arr), info)
}

/// Recognizer input: fixed (height, width), BGR mapped to [-1, 1], NCHW
pub fn preprocess_for_recognition(image: &RgbImage, input_size: (u32, u32)) -> Array4<f32> {
    let (h, w) = input_size;
    let resized = imageops::resize(image, w, h, FilterType::Triangle);
    let arr = rgb_to_array(&resized, ChannelOrder::Bgr);
    hwc_to_nchw(&normalize(&arr, &[0.5, 0.5, 0.5], &[0.5, 0.5, 0.5]))
}

/// Classifier input: fixed (height, width), BGR in 0-1, NCHW
pub fn preprocess_for_classification(image: &RgbImage, input_size: (u32, u32)) -> Array4<f32> {
    let (h, w) = input_size;
    let resized = imageops::resize(image, w, h, FilterType::Triangle);
    hwc_to_nchw(&rgb_to_array(&resized, ChannelOrder::Bgr))
}
