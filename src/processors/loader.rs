// asset-squeeze/src/processors/loader.rs
use crate::core::{AssetFormat, ColorMode, Dimensions, ImageToolError, Result};
use crate::processors::sniffer;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat};
use std::path::Path;

/// Decoded pixels of an asset read fresh from disk for one pipeline run.
pub struct ImageAsset {
    pub format: AssetFormat,
    pub color_mode: ColorMode,
    pub image: DynamicImage,
}

impl ImageAsset {
    pub fn dimensions(&self) -> Dimensions {
        self.image.dimensions().into()
    }
}

#[derive(Clone)]
pub struct Loader {
    max_dimensions: Option<(u32, u32)>,
}

impl Loader {
    pub fn new() -> Self {
        Self {
            max_dimensions: Some((100_000, 100_000)),
        }
    }

    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_dimensions = Some((width, height));
        self
    }

    pub fn read(&self, path: &Path) -> Result<(Vec<u8>, AssetFormat)> {
        let bytes = std::fs::read(path)
            .map_err(|e| ImageToolError::UnreadableInput(format!("{}: {}", path.display(), e)))?;
        let format = sniffer::sniff(&bytes)
            .map_err(|e| ImageToolError::UnreadableInput(format!("{}: {}", path.display(), e)))?;
        Ok((bytes, format))
    }

    /// Decodes bytes that were already read and sniffed.
    pub fn decode(&self, path: &Path, bytes: &[u8], format: AssetFormat) -> Result<ImageAsset> {
        let image_format = match format {
            AssetFormat::Png => ImageFormat::Png,
            AssetFormat::Jpeg => ImageFormat::Jpeg,
            AssetFormat::WebP => ImageFormat::WebP,
            AssetFormat::Unknown => {
                return Err(ImageToolError::UnsupportedFormat(format!(
                    "{} has no recognised image signature",
                    path.display()
                )))
            }
        };

        log::debug!("Decoding {} as {}", path.display(), format);

        let image = image::load_from_memory_with_format(bytes, image_format).map_err(|e| {
            ImageToolError::UnreadableInput(format!("Failed to decode {}: {}", path.display(), e))
        })?;

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ImageToolError::InvalidGeometry(format!(
                "{} decodes to {}x{}",
                path.display(),
                width,
                height
            )));
        }

        if let Some((max_w, max_h)) = self.max_dimensions {
            if width > max_w || height > max_h {
                return Err(ImageToolError::UnreadableInput(format!(
                    "Image dimensions {}x{} exceed maximum {}x{}",
                    width, height, max_w, max_h
                )));
            }
        }

        let color_mode = sniffer::png_color_mode(bytes)
            .filter(|mode| *mode == ColorMode::Palette)
            .unwrap_or_else(|| color_mode_of(image.color()));

        log::debug!(
            "Loaded {}: {}x{} pixels, {:?}",
            path.display(),
            width,
            height,
            color_mode
        );

        Ok(ImageAsset {
            format,
            color_mode,
            image,
        })
    }

    pub fn load(&self, path: &Path) -> Result<ImageAsset> {
        let (bytes, format) = self.read(path)?;
        self.decode(path, &bytes, format)
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

pub fn color_mode_of(color: ColorType) -> ColorMode {
    match color {
        ColorType::L8 | ColorType::L16 => ColorMode::Gray,
        ColorType::La8 | ColorType::La16 => ColorMode::GrayAlpha,
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => ColorMode::Rgba,
        _ => ColorMode::Rgb,
    }
}
