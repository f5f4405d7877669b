//! Frame type and pixel helpers: YUYV to RGB, dark detection, JPEG snapshots.

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// Pixel layout of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pixels {
    Rgb8,
    Luma8,
}

impl Pixels {
    fn channels(self) -> usize {
        match self {
            Pixels::Rgb8 => 3,
            Pixels::Luma8 => 1,
        }
    }
}

/// A decoded camera frame.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub pixels: Pixels,
    pub sequence: u32,
}

impl Frame {
    /// Average luma (0.0–255.0). RGB frames use the Rec. 601 weights.
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        match self.pixels {
            Pixels::Luma8 => self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32,
            Pixels::Rgb8 => {
                let n = self.data.len() / 3;
                if n == 0 {
                    return 0.0;
                }
                self.data
                    .chunks_exact(3)
                    .map(|px| 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32)
                    .sum::<f32>()
                    / n as f32
            }
        }
    }

    /// True if more than `threshold_pct` of pixels are in the darkest eighth.
    pub fn is_dark(&self, threshold_pct: f32) -> bool {
        let step = self.pixels.channels();
        let luma: Vec<u8> = self.data.iter().step_by(step).copied().collect();
        is_dark_frame(&luma, threshold_pct)
    }

    /// Encode as a baseline JPEG.
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        let expected = self.width as usize * self.height as usize * self.pixels.channels();
        if self.data.len() < expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: self.data.len(),
            });
        }
        let color = match self.pixels {
            Pixels::Rgb8 => ExtendedColorType::Rgb8,
            Pixels::Luma8 => ExtendedColorType::L8,
        };
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality)
            .encode(&self.data[..expected], self.width, self.height, color)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(out)
    }
}

/// A still image ready to hand to the recognition backend.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Snapshot {
    /// `data:image/jpeg;base64,...`, the form the backend accepts as `image_data`.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
        )
    }
}

/// Convert packed YUYV (4:2:2) to interleaved RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    let expected = pixels * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

/// BT.601 full-range YUV to RGB.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;
    [
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
    ]
}

/// Check if a frame is dark: more than `threshold_pct` of luma samples below 32.
pub fn is_dark_frame(luma: &[u8], threshold_pct: f32) -> bool {
    if luma.is_empty() {
        return true;
    }
    let dark_count = luma.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / luma.len() as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("jpeg encoding failed: {0}")]
    Encode(String),
}
