//! Image-to-tensor preprocessing shared by all model families.

use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;
use tracing::debug;

use crate::config::{ModelConfig, ResizeType};
use crate::error::{ModelError, Result};

/// Where the source image ended up inside the model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageMeta {
    /// Source image size (width, height).
    pub original: (u32, u32),
    /// Model input size (width, height).
    pub input: (u32, u32),
    pub scale_x: f32,
    pub scale_y: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl ImageMeta {
    /// Map a box in model-input pixels back to source pixels.
    pub fn box_to_source(&self, bbox: [f32; 4]) -> [f32; 4] {
        [
            (bbox[0] - self.pad_x) / self.scale_x,
            (bbox[1] - self.pad_y) / self.scale_y,
            (bbox[2] - self.pad_x) / self.scale_x,
            (bbox[3] - self.pad_y) / self.scale_y,
        ]
    }

    /// Map a box normalised to the model input (`0..1`) back to source pixels.
    pub fn normalized_box_to_source(&self, bbox: [f32; 4]) -> [f32; 4] {
        let (w, h) = (self.input.0 as f32, self.input.1 as f32);
        self.box_to_source([bbox[0] * w, bbox[1] * h, bbox[2] * w, bbox[3] * h])
    }
}

/// Reject images no model can take: empty ones and float HDR layouts.
pub fn validate_image(image: &DynamicImage) -> Result<()> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ModelError::Preprocess(format!(
            "image is empty ({}x{})",
            width, height
        )));
    }

    match image.color() {
        ColorType::L8
        | ColorType::La8
        | ColorType::Rgb8
        | ColorType::Rgba8
        | ColorType::L16
        | ColorType::La16
        | ColorType::Rgb16
        | ColorType::Rgba16 => Ok(()),
        other => Err(ModelError::Preprocess(format!(
            "unsupported channel layout {:?}",
            other
        ))),
    }
}

/// Resize and normalise an image into an NCHW `f32` tensor.
#[derive(Debug, Clone)]
pub struct InputTransform {
    resize_type: ResizeType,
    mean: [f32; 3],
    scale: [f32; 3],
    rgb: bool,
}

impl InputTransform {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            resize_type: config.resize_type,
            mean: config.mean_values,
            scale: config.scale_values,
            rgb: config.reverse_input_channels,
        }
    }

    /// Build the model input for `image` at `size` (width, height).
    pub fn apply(&self, image: &DynamicImage, size: (u32, u32)) -> Result<(Array4<f32>, ImageMeta)> {
        validate_image(image)?;

        let (orig_w, orig_h) = image.dimensions();
        let (target_w, target_h) = size;
        let rgb = image.to_rgb8();

        let (canvas, meta) = match self.resize_type {
            ResizeType::Standard => {
                let resized = imageops::resize(&rgb, target_w, target_h, FilterType::Triangle);
                let meta = ImageMeta {
                    original: (orig_w, orig_h),
                    input: size,
                    scale_x: target_w as f32 / orig_w as f32,
                    scale_y: target_h as f32 / orig_h as f32,
                    pad_x: 0.0,
                    pad_y: 0.0,
                };
                (resized, meta)
            }
            ResizeType::Crop => {
                let (cx, cy, cw, ch) = centre_crop((orig_w, orig_h), size);
                let cropped = imageops::crop_imm(&rgb, cx, cy, cw, ch).to_image();
                let resized = imageops::resize(&cropped, target_w, target_h, FilterType::Triangle);

                let scale_x = target_w as f32 / cw as f32;
                let scale_y = target_h as f32 / ch as f32;
                let meta = ImageMeta {
                    original: (orig_w, orig_h),
                    input: size,
                    scale_x,
                    scale_y,
                    pad_x: -(cx as f32) * scale_x,
                    pad_y: -(cy as f32) * scale_y,
                };
                (resized, meta)
            }
            ResizeType::FitToWindow | ResizeType::FitToWindowLetterbox => {
                let scale = (target_w as f32 / orig_w as f32).min(target_h as f32 / orig_h as f32);
                let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, target_w);
                let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, target_h);
                let resized = imageops::resize(&rgb, new_w, new_h, FilterType::Triangle);

                let (dx, dy) = if self.resize_type == ResizeType::FitToWindowLetterbox {
                    ((target_w - new_w) / 2, (target_h - new_h) / 2)
                } else {
                    (0, 0)
                };
                let mut canvas = RgbImage::new(target_w, target_h);
                imageops::replace(&mut canvas, &resized, dx as i64, dy as i64);

                let meta = ImageMeta {
                    original: (orig_w, orig_h),
                    input: size,
                    scale_x: scale,
                    scale_y: scale,
                    pad_x: dx as f32,
                    pad_y: dy as f32,
                };
                (canvas, meta)
            }
        };

        debug!(
            "Preprocessed {}x{} -> {}x{} ({:?})",
            orig_w, orig_h, target_w, target_h, self.resize_type
        );

        let mut tensor = Array4::<f32>::zeros((1, 3, target_h as usize, target_w as usize));
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for c in 0..3 {
                // Models default to BGR input.
                let src = if self.rgb { c } else { 2 - c };
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel[src] as f32 - self.mean[c]) / self.scale[c];
            }
        }

        Ok((tensor, meta))
    }
}

/// Largest centred region of `original` with the aspect ratio of `target`,
/// as `(x, y, width, height)`.
fn centre_crop((orig_w, orig_h): (u32, u32), (target_w, target_h): (u32, u32)) -> (u32, u32, u32, u32) {
    let aspect = target_w as f32 / target_h as f32;
    if orig_w as f32 / orig_h as f32 > aspect {
        let width = ((orig_h as f32 * aspect).round() as u32).clamp(1, orig_w);
        ((orig_w - width) / 2, 0, width, orig_h)
    } else {
        let height = ((orig_w as f32 / aspect).round() as u32).clamp(1, orig_h);
        (0, (orig_h - height) / 2, orig_w, height)
    }
}
