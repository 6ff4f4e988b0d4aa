//! kisan‑preprocess – resize + normalize leaf images into model tensors.
//!
//! Output is an (H, W, 3) `Array3<f32>` in standard layout, i.e. a flat
//! channel-interleaved sequence in row-major pixel order. The value mapping
//! is the [`Normalization`] declared by the crop's profile.

use image::{DynamicImage, RgbImage};
use kisan_model::{CropProfile, Normalization};
use log::trace;
use ndarray::Array3;
use resize::{new, Pixel, Type};
use rgb::FromSlice;
use thiserror::Error;

/// Model input tensor, shape (height, width, 3).
pub type Tensor = Array3<f32>;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("image has zero size ({width}×{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("target size must be non-zero, got {width}×{height}")]
    EmptyTarget { width: u32, height: u32 },
    #[error("NV12 buffer too small: expected {expected} bytes, got {got}")]
    BufferTooSmall { expected: usize, got: usize },
    #[error("resize failed: {0}")]
    Resize(String),
    #[error("tensor layout: {0}")]
    Layout(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, PreprocessError>;

/// An image handed over by the host.
///
/// * `Rgb`  – already decoded (photo picked from storage, test fixture)
/// * `Nv12` – raw camera frame, Y plane followed by interleaved UV plane
#[derive(Debug, Clone)]
pub enum Frame {
    Rgb(RgbImage),
    Nv12 { bytes: Vec<u8>, width: u32, height: u32 },
}

impl Frame {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Frame::Rgb(img) => img.dimensions(),
            Frame::Nv12 { width, height, .. } => (*width, *height),
        }
    }
}

impl From<RgbImage> for Frame {
    fn from(img: RgbImage) -> Self {
        Frame::Rgb(img)
    }
}

impl From<DynamicImage> for Frame {
    fn from(img: DynamicImage) -> Self {
        Frame::Rgb(img.to_rgb8())
    }
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    dst_w: u32,
    dst_h: u32,
    normalization: Normalization,
}

impl Preprocessor {
    /// Create a pre‑processor that outputs WxH RGB with the given scheme.
    pub fn new(dst_w: u32, dst_h: u32, normalization: Normalization) -> Self {
        Self { dst_w, dst_h, normalization }
    }

    /// Size and scheme taken from the crop's profile.
    pub fn for_profile(profile: &CropProfile) -> Self {
        Self::new(profile.input_width, profile.input_height, profile.normalization)
    }

    pub fn target(&self) -> (u32, u32) {
        (self.dst_w, self.dst_h)
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    /// Convert any supported frame into a tensor.
    pub fn run(&self, frame: &Frame) -> Result<Tensor> {
        match frame {
            Frame::Rgb(img) => self.to_tensor(img),
            Frame::Nv12 { bytes, width, height } => {
                let rgb = nv12_to_rgb(bytes, *width, *height)?;
                self.from_rgb_bytes(&rgb, *width, *height)
            }
        }
    }

    pub fn to_tensor(&self, image: &RgbImage) -> Result<Tensor> {
        let (w, h) = image.dimensions();
        self.from_rgb_bytes(image.as_raw(), w, h)
    }

    fn from_rgb_bytes(&self, rgb: &[u8], w: u32, h: u32) -> Result<Tensor> {
        if w == 0 || h == 0 {
            return Err(PreprocessError::EmptyImage { width: w, height: h });
        }
        if self.dst_w == 0 || self.dst_h == 0 {
            return Err(PreprocessError::EmptyTarget { width: self.dst_w, height: self.dst_h });
        }

        // 1. Resize to dst size with Lanczos3 (skipped when already there)
        let resized;
        let pixels = if (w, h) == (self.dst_w, self.dst_h) {
            rgb
        } else {
            resized = resample(rgb, w, h, self.dst_w, self.dst_h)?;
            resized.as_slice()
        };
        trace!("preprocess {w}×{h} -> {}×{}", self.dst_w, self.dst_h);

        // 2. Normalize and pack into ndarray (H,W,C)
        let values = pixels.iter().map(|&v| self.normalization.apply(v)).collect();
        Ok(Array3::from_shape_vec(
            (self.dst_h as usize, self.dst_w as usize, 3),
            values,
        )?)
    }
}

/// One-shot form of [`Preprocessor::to_tensor`].
pub fn to_tensor(
    image: &RgbImage,
    target_width: u32,
    target_height: u32,
    normalization: Normalization,
) -> Result<Tensor> {
    Preprocessor::new(target_width, target_height, normalization).to_tensor(image)
}

fn resample(rgb: &[u8], w: u32, h: u32, dst_w: u32, dst_h: u32) -> Result<Vec<u8>> {
    let mut dst = vec![0u8; dst_w as usize * dst_h as usize * 3];
    let mut resizer = new(
        w as usize,
        h as usize,
        dst_w as usize,
        dst_h as usize,
        Pixel::RGB8,
        Type::Lanczos3,
    )
    .map_err(|e| PreprocessError::Resize(e.to_string()))?;

    resizer
        .resize(rgb.as_rgb(), dst.as_rgb_mut())
        .map_err(|e| PreprocessError::Resize(e.to_string()))?;
    Ok(dst)
}

/// NV12 4:2:0 → RGB24 conversion (BT.601, full range).
///
/// Chroma rows are `width` rounded up to even bytes long.
pub fn nv12_to_rgb(nv12: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 {
        return Err(PreprocessError::EmptyImage { width, height });
    }
    let chroma_stride = w + (w & 1);
    let expected = w * h + chroma_stride * h.div_ceil(2);
    if nv12.len() < expected {
        return Err(PreprocessError::BufferTooSmall { expected, got: nv12.len() });
    }

    let (y_plane, uv_plane) = nv12.split_at(w * h);
    let mut out = vec![0u8; w * h * 3];
    for j in 0..h {
        for i in 0..w {
            let y_val = y_plane[j * w + i] as f32;
            let uv_idx = (j / 2) * chroma_stride + (i & !1);
            let u = uv_plane[uv_idx]     as f32 - 128.0;
            let v = uv_plane[uv_idx + 1] as f32 - 128.0;

            let r = (y_val + 1.402 * v).clamp(0.0, 255.0);
            let g = (y_val - 0.344_13 * u - 0.714_14 * v).clamp(0.0, 255.0);
            let b = (y_val + 1.772 * u).clamp(0.0, 255.0);

            let base = (j * w + i) * 3;
            out[base]     = r as u8;
            out[base + 1] = g as u8;
            out[base + 2] = b as u8;
        }
    }
    Ok(out)
}
