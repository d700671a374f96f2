//! Upload decoding and thumbnail generation.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tracing::debug;

use crate::config::BoardConfig;
use crate::error::{BoardError, Result};

/// Raster formats accepted for upload, by sniffed MIME type.
const ACCEPTED: &[(&str, ImageFormat)] = &[
    ("image/png", ImageFormat::Png),
    ("image/jpeg", ImageFormat::Jpeg),
    ("image/gif", ImageFormat::Gif),
    ("image/bmp", ImageFormat::Bmp),
    ("image/webp", ImageFormat::WebP),
];

/// A lossless full-size PNG and a JPEG thumbnail of the same upload.
#[derive(Debug, Clone)]
pub struct EncodedImages {
    pub full: Vec<u8>,
    pub thumb: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Thumbnailer {
    dimension: u32,
    quality: u8,
}

impl Thumbnailer {
    pub fn new(dimension: u32, quality: u8) -> Self {
        Self { dimension: dimension.max(1), quality: quality.clamp(1, 100) }
    }

    pub fn from_config(cfg: &BoardConfig) -> Self {
        Self::new(cfg.thumbnail_dimensions, cfg.thumbnail_quality)
    }

    pub fn sniff(bytes: &[u8]) -> Result<ImageFormat> {
        let mime = infer::get(bytes)
            .map(|t| t.mime_type())
            .ok_or_else(|| BoardError::invalid("image: unrecognised file type"))?;
        ACCEPTED
            .iter()
            .find(|(m, _)| *m == mime)
            .map(|(_, f)| *f)
            .ok_or_else(|| BoardError::invalid(format!("image: unsupported type {mime}")))
    }

    /// Longest side fit: the larger dimension becomes `dimension`.
    pub fn thumb_size(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = f64::from(self.dimension) / f64::from(width.max(height).max(1));
        let scaled = |v: u32| ((f64::from(v) * scale) as u32).max(1);
        (scaled(width), scaled(height))
    }

    pub fn process(&self, bytes: &[u8]) -> Result<EncodedImages> {
        let format = Self::sniff(bytes)?;
        let img = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| BoardError::invalid(format!("image: failed to decode: {e}")))?;

        let mut full = Cursor::new(Vec::new());
        img.write_to(&mut full, ImageFormat::Png)?;

        let thumb = self.render_thumbnail(&img);
        let mut thumb_bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut thumb_bytes, self.quality).encode_image(&thumb)?;

        debug!(?format, width = img.width(), height = img.height(), "processed upload");
        Ok(EncodedImages { full: full.into_inner(), thumb: thumb_bytes, width: img.width(), height: img.height() })
    }

    /// Resizes onto an opaque white canvas, flattening any transparency.
    fn render_thumbnail(&self, img: &DynamicImage) -> image::RgbImage {
        let (w, h) = self.thumb_size(img.width(), img.height());
        let mut canvas = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));
        let resized = imageops::resize(&img.to_rgba8(), w, h, FilterType::Triangle);
        imageops::overlay(&mut canvas, &resized, 0, 0);
        DynamicImage::ImageRgba8(canvas).to_rgb8()
    }
}
