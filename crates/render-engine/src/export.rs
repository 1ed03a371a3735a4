//! Image encoding for finished canvases.

use std::io::Write;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{ExtendedColorType, ImageEncoder};

use wlgrab_common::error::{WlgrabError, WlgrabResult};

use crate::raster::Canvas;

/// Output file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Png,
    Ppm,
    Jpeg,
}

impl ImageFormat {
    /// Accepts the names used on the command line and in the config file.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "ppm" => Some(Self::Ppm),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// File extension for generated file names.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Ppm => "ppm",
            Self::Jpeg => "jpeg",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = WlgrabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| WlgrabError::config(format!("invalid filetype '{s}'")))
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Encoder tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// PNG compression level, 0-9.
    pub png_level: u8,
    /// JPEG quality, 0-100.
    pub jpeg_quality: u8,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            png_level: 6,
            jpeg_quality: 80,
        }
    }
}

impl EncodeOptions {
    pub fn validate(&self) -> WlgrabResult<()> {
        if self.png_level > 9 {
            return Err(WlgrabError::config(
                "PNG compression level must be from 0 to 9",
            ));
        }
        if self.jpeg_quality > 100 {
            return Err(WlgrabError::config("JPEG quality must be from 0 to 100"));
        }
        Ok(())
    }
}

/// The encoder only exposes presets, so the zlib level is bucketed.
pub fn png_compression(level: u8) -> CompressionType {
    match level {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

/// Encode `canvas` into `writer`.
///
/// PNG keeps the alpha channel (un-premultiplied); PPM and JPEG have no
/// alpha, so transparent areas come out black.
pub fn encode_canvas<W: Write>(
    canvas: &Canvas,
    format: ImageFormat,
    options: &EncodeOptions,
    mut writer: W,
) -> WlgrabResult<()> {
    options.validate()?;
    let (width, height) = (canvas.width(), canvas.height());
    tracing::debug!(%format, width, height, "Encoding canvas");

    let result = match format {
        ImageFormat::Png => PngEncoder::new_with_quality(
            &mut writer,
            png_compression(options.png_level),
            FilterType::Adaptive,
        )
        .write_image(&canvas.to_rgba8(), width, height, ExtendedColorType::Rgba8),
        ImageFormat::Ppm => PnmEncoder::new(&mut writer)
            .with_subtype(PnmSubtype::Pixmap(SampleEncoding::Binary))
            .write_image(&canvas.to_rgb8(), width, height, ExtendedColorType::Rgb8),
        // The encoder writes 4:4:4; quality 0 is not accepted.
        ImageFormat::Jpeg => JpegEncoder::new_with_quality(&mut writer, options.jpeg_quality.max(1))
            .write_image(&canvas.to_rgb8(), width, height, ExtendedColorType::Rgb8),
    };
    result.map_err(|e| WlgrabError::encode(format!("failed to write {format}: {e}")))?;
    writer.flush()?;
    Ok(())
}
