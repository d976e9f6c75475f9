//! Geometric warps for plate crops
//!
//! `rectify` turns a plate quadrilateral into an upright rectangular crop. The affine helpers
//! below serve the legacy pipeline, which aligns a detection box into a fixed-size square patch
//! and maps predicted vertices back into the source image.

use image::{imageops, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use tracing::debug;

use crate::config::constants::ROTATE_ASPECT_THRESHOLD;

/// A 2D point in source-image pixels
pub type Point = (f32, f32);

fn distance(a: Point, b: Point) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Rectify a quadrilateral (TL, TR, BR, BL) into an upright crop.
///
/// Returns a 0x0 image when the quad collapses to zero width or height, or when no
/// perspective transform exists for it.
pub fn rectify(image: &RgbImage, quad: &[Point; 4]) -> RgbImage {
    let [tl, tr, br, bl] = *quad;

    let width = distance(tl, tr).max(distance(bl, br)).round();
    let height = distance(tl, bl).max(distance(tr, br)).round();

    if !(width >= 1.0 && height >= 1.0) {
        debug!("Degenerate plate quad {:?}, skipping warp", quad);
        return RgbImage::new(0, 0);
    }

    let (w, h) = (width as u32, height as u32);
    let target = [(0.0, 0.0), (width, 0.0), (width, height), (0.0, height)];

    let Some(projection) = Projection::from_control_points(*quad, target) else {
        debug!("No perspective transform for quad {:?}", quad);
        return RgbImage::new(0, 0);
    };

    let mut crop = RgbImage::new(w, h);
    warp_into(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut crop);

    // Keep text horizontal for tall crops
    if height / width >= ROTATE_ASPECT_THRESHOLD {
        return imageops::rotate270(&crop);
    }

    crop
}

/// Split a rectified double-layer crop into (top band, bottom band) at `ratio` of its height
pub fn split_layers(crop: &RgbImage, ratio: f32) -> (RgbImage, RgbImage) {
    let (w, h) = crop.dimensions();
    let line = ((h as f32 * ratio) as u32).min(h);

    let top = imageops::crop_imm(crop, 0, 0, w, line).to_image();
    let bottom = imageops::crop_imm(crop, 0, line, w, h - line).to_image();

    (top, bottom)
}

/// 2x3 affine matrix `[a, b, tx, c, d, ty]` mapping `(x, y)` to `(a*x + b*y + tx, c*x + d*y + ty)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    m: [f32; 6],
}

impl AffineTransform {
    pub fn new(m: [f32; 6]) -> Self {
        Self { m }
    }

    pub fn matrix(&self) -> [f32; 6] {
        self.m
    }

    /// Map a point through the transform
    pub fn apply(&self, (x, y): Point) -> Point {
        let [a, b, tx, c, d, ty] = self.m;
        (a * x + b * y + tx, c * x + d * y + ty)
    }

    /// Inverse transform, `None` when the linear part is singular
    pub fn invert(&self) -> Option<Self> {
        let [a, b, tx, c, d, ty] = self.m;
        let det = a * d - b * c;
        if det.abs() < f32::EPSILON {
            return None;
        }

        let ia = d / det;
        let ib = -b / det;
        let ic = -c / det;
        let id = a / det;
        Some(Self::new([
            ia,
            ib,
            -(ia * tx + ib * ty),
            ic,
            id,
            -(ic * tx + id * ty),
        ]))
    }

    fn to_projection(self) -> Option<Projection> {
        let [a, b, tx, c, d, ty] = self.m;
        Projection::from_matrix([a, b, tx, c, d, ty, 0.0, 0.0, 1.0])
    }
}

/// Align a detection box into a `size x size` square patch.
///
/// The patch is centred on the box and covers `max(box_w, box_h) * scale_factor` source
/// pixels. Returns the patch and the source-to-patch transform.
pub fn align_box(
    image: &RgbImage,
    bbox: &[f32; 4],
    scale_factor: f32,
    size: u32,
) -> (RgbImage, AffineTransform) {
    let [x1, y1, x2, y2] = *bbox;
    let cx = (x1 + x2) / 2.0;
    let cy = (y1 + y2) / 2.0;
    let side = (x2 - x1).max(y2 - y1).max(1.0) * scale_factor;

    let scale = size as f32 / side;
    let half = size as f32 / 2.0;
    let mat = AffineTransform::new([scale, 0.0, half - cx * scale, 0.0, scale, half - cy * scale]);

    let mut patch = RgbImage::new(size, size);
    if let Some(projection) = mat.to_projection() {
        warp_into(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut patch);
    }

    (patch, mat)
}

/// Copy of `image` that is black everywhere except inside `bbox`
pub fn isolate_box(image: &RgbImage, bbox: &[f32; 4]) -> RgbImage {
    let (w, h) = image.dimensions();
    let x1 = (bbox[0].max(0.0) as u32).min(w);
    let y1 = (bbox[1].max(0.0) as u32).min(h);
    let x2 = (bbox[2].max(0.0) as u32).min(w);
    let y2 = (bbox[3].max(0.0) as u32).min(h);

    let mut blank = RgbImage::new(w, h);
    for y in y1..y2 {
        for x in x1..x2 {
            blank.put_pixel(x, y, *image.get_pixel(x, y));
        }
    }
    blank
}
