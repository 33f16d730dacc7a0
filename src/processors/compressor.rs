// asset-squeeze/src/processors/compressor.rs
use crate::core::{AssetFormat, ImageToolError, Result};
use crate::processors::quantizer::Quantizer;
use crate::processors::sniffer;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{DynamicImage, RgbImage};
use oxipng::{optimize_from_memory, Options, StripChunks};
use std::panic::{self, AssertUnwindSafe};

/// Highest oxipng preset; slow but smallest.
const OXIPNG_MAX_PRESET: u8 = 6;
/// libwebp `method`: 0 is fastest, 6 compresses hardest.
const WEBP_MAX_METHOD: i32 = 6;
/// A lossy re-encode into the source's own format must save at least this share
/// of the original. Smaller gains only trade detail for noise-level savings.
pub const LOSSY_REENCODE_MIN_GAIN_PERCENT: u64 = 5;

pub struct Encoded {
    pub bytes: Vec<u8>,
    pub alpha_dropped: bool,
    /// Pixels were quantized (JPEG, lossy WEBP or pngquant).
    pub lossy: bool,
}

/// Encodes normalized pixels with the procedure for the target format.
pub struct Compressor {
    quality: u8,
    quantizer: Quantizer,
    /// Luminance table mozjpeg writes at `quality`.
    jpeg_reference: Option<[u16; 64]>,
}

impl Compressor {
    pub fn new(quality: u8, quantizer: Quantizer) -> Self {
        let quality = quality.clamp(1, 100);
        let jpeg_reference = mozjpeg_encode(&RgbImage::new(8, 8), quality as f32)
            .ok()
            .and_then(|bytes| sniffer::jpeg_luma_table(&bytes));
        if jpeg_reference.is_none() {
            log::debug!("Could not read back a reference JPEG table at quality {}", quality);
        }

        Self {
            quality,
            quantizer,
            jpeg_reference,
        }
    }

    /// True when a JPEG already quantizes at least as coarsely as a re-encode would,
    /// so encoding it again could only lose detail.
    pub fn jpeg_at_or_below_quality(&self, source: &[u8]) -> bool {
        let (Some(reference), Some(table)) = (self.jpeg_reference, sniffer::jpeg_luma_table(source))
        else {
            return false;
        };
        let sum = |t: &[u16; 64]| t.iter().map(|&q| q as u32).sum::<u32>();
        sum(&table) >= sum(&reference)
    }

    pub fn encode(&self, image: DynamicImage, target: AssetFormat) -> Result<Encoded> {
        log::debug!(
            "Encoding {}x{} {:?} as {}, quality {}",
            image.width(),
            image.height(),
            image.color(),
            target,
            self.quality
        );

        match target {
            AssetFormat::Png => self.encode_png(image),
            AssetFormat::WebP => self.encode_webp(image),
            AssetFormat::Jpeg => self.encode_jpeg(image),
            AssetFormat::Unknown => Err(ImageToolError::UnsupportedFormat(
                "no encoder for unknown format".to_string(),
            )),
        }
    }

    fn encode_png(&self, image: DynamicImage) -> Result<Encoded> {
        let (image, alpha_dropped) = drop_opaque_alpha(image);
        let plain = write_png(&image)?;

        if self.quantizer.is_available() {
            match self.quantizer.quantize(&plain) {
                Ok(bytes) => {
                    return Ok(Encoded {
                        bytes,
                        alpha_dropped,
                        lossy: true,
                    })
                }
                Err(e) => log::debug!("Quantizer declined, using internal optimizer: {}", e),
            }
        }

        Ok(Encoded {
            bytes: optimize_png_bytes(&plain)?,
            alpha_dropped,
            lossy: false,
        })
    }

    fn encode_webp(&self, image: DynamicImage) -> Result<Encoded> {
        let (image, alpha_dropped) = drop_opaque_alpha(image);

        let mut config = webp::WebPConfig::new().map_err(|_| {
            ImageToolError::EncodeFailure("libwebp rejected its default configuration".to_string())
        })?;
        config.lossless = 0;
        config.quality = self.quality as f32;
        config.method = WEBP_MAX_METHOD;

        let encoded = if image.color().has_alpha() {
            let rgba = image.to_rgba8();
            webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
                .encode_advanced(&config)
        } else {
            let rgb = image.to_rgb8();
            webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height())
                .encode_advanced(&config)
        };
        let memory = encoded
            .map_err(|e| ImageToolError::EncodeFailure(format!("WebP encoding failed: {:?}", e)))?;

        Ok(Encoded {
            bytes: memory.to_vec(),
            alpha_dropped,
            lossy: true,
        })
    }

    fn encode_jpeg(&self, image: DynamicImage) -> Result<Encoded> {
        let alpha_dropped = image.color().has_alpha();
        let bytes = mozjpeg_encode(&image.to_rgb8(), self.quality as f32)?;
        Ok(Encoded {
            bytes,
            alpha_dropped,
            lossy: true,
        })
    }
}

/// Progressive JPEG with optimized Huffman tables.
fn mozjpeg_encode(rgb: &RgbImage, quality: f32) -> Result<Vec<u8>> {
    let (width, height) = rgb.dimensions();

    // mozjpeg reports libjpeg errors by unwinding.
    let encoded = panic::catch_unwind(AssertUnwindSafe(|| -> std::io::Result<Vec<u8>> {
        let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
        comp.set_size(width as usize, height as usize);
        comp.set_quality(quality);
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);

        let mut started = comp.start_compress(Vec::new())?;
        started.write_scanlines(rgb.as_raw())?;
        started.finish()
    }));

    match encoded {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(ImageToolError::EncodeFailure(format!("JPEG encoding failed: {}", e))),
        Err(_) => Err(ImageToolError::EncodeFailure("JPEG encoder aborted".to_string())),
    }
}

/// A new encoding only replaces the original when strictly smaller. Lossy
/// re-encodes into the same format also need [`LOSSY_REENCODE_MIN_GAIN_PERCENT`].
pub fn worth_keeping(original_size: u64, new_size: u64, lossy_reencode: bool) -> bool {
    if lossy_reencode {
        new_size * 100 <= original_size * (100 - LOSSY_REENCODE_MIN_GAIN_PERCENT)
            && new_size < original_size
    } else {
        new_size < original_size
    }
}

/// True when the image has no alpha channel or every alpha sample is fully opaque.
/// Stops at the first translucent pixel.
pub fn is_fully_opaque(image: &DynamicImage) -> bool {
    match image {
        DynamicImage::ImageRgba8(buf) => buf.pixels().all(|p| p.0[3] == u8::MAX),
        DynamicImage::ImageLumaA8(buf) => buf.pixels().all(|p| p.0[1] == u8::MAX),
        DynamicImage::ImageRgba16(buf) => buf.pixels().all(|p| p.0[3] == u16::MAX),
        DynamicImage::ImageLumaA16(buf) => buf.pixels().all(|p| p.0[1] == u16::MAX),
        DynamicImage::ImageRgba32F(buf) => buf.pixels().all(|p| p.0[3] >= 1.0),
        _ => true,
    }
}

/// Removes an alpha channel that carries no information.
pub fn drop_opaque_alpha(image: DynamicImage) -> (DynamicImage, bool) {
    if !image.color().has_alpha() || !is_fully_opaque(&image) {
        return (image, false);
    }

    let stripped = match &image {
        DynamicImage::ImageLumaA8(_) => DynamicImage::ImageLuma8(image.to_luma8()),
        DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLuma16(image.to_luma16()),
        DynamicImage::ImageRgba16(_) => DynamicImage::ImageRgb16(image.to_rgb16()),
        DynamicImage::ImageRgba32F(_) => DynamicImage::ImageRgb32F(image.to_rgb32f()),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    };
    log::debug!("Alpha channel is fully opaque, encoding without it");
    (stripped, true)
}

fn write_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    // oxipng or pngquant recompresses afterwards, so a fast first pass is enough.
    let encoder = PngEncoder::new_with_quality(&mut buffer, CompressionType::Fast, PngFilter::Adaptive);
    image
        .write_with_encoder(encoder)
        .map_err(|e| ImageToolError::EncodeFailure(format!("PNG encoding failed: {}", e)))?;
    Ok(buffer)
}

fn optimize_png_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut options = Options::from_preset(OXIPNG_MAX_PRESET);
    options.strip = StripChunks::Safe;
    optimize_from_memory(data, &options)
        .map_err(|e| ImageToolError::EncodeFailure(format!("PNG optimization failed: {}", e)))
}
