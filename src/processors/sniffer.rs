// asset-squeeze/src/processors/sniffer.rs
use crate::core::{AssetFormat, ColorMode, ImageToolError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const SIGNATURE_LEN: usize = 12;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Identifies the encoded format from leading bytes.
pub fn sniff(bytes: &[u8]) -> Result<AssetFormat> {
    if bytes.len() < SIGNATURE_LEN {
        return Err(ImageToolError::UnreadableInput(format!(
            "need {} bytes to identify format, got {}",
            SIGNATURE_LEN,
            bytes.len()
        )));
    }

    let format = if bytes.starts_with(&PNG_SIGNATURE) {
        AssetFormat::Png
    } else if bytes.starts_with(&JPEG_SIGNATURE) {
        AssetFormat::Jpeg
    } else if &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        AssetFormat::WebP
    } else {
        AssetFormat::Unknown
    };

    Ok(format)
}

/// Reads only the signature prefix of a file.
pub fn sniff_file(path: &Path) -> Result<AssetFormat> {
    let mut header = Vec::with_capacity(SIGNATURE_LEN);
    File::open(path)
        .map_err(|e| ImageToolError::UnreadableInput(format!("{}: {}", path.display(), e)))?
        .take(SIGNATURE_LEN as u64)
        .read_to_end(&mut header)?;
    sniff(&header)
        .map_err(|e| ImageToolError::UnreadableInput(format!("{}: {}", path.display(), e)))
}

/// Colour mode declared in a PNG IHDR chunk. Decoders expand palettes,
/// so this is the only place an indexed source is still visible.
pub fn png_color_mode(bytes: &[u8]) -> Option<ColorMode> {
    // signature(8) + length(4) + "IHDR"(4) + width(4) + height(4) + depth(1) + color type(1)
    if bytes.len() < 26 || !bytes.starts_with(&PNG_SIGNATURE) || &bytes[12..16] != b"IHDR" {
        return None;
    }
    match bytes[25] {
        0 => Some(ColorMode::Gray),
        2 => Some(ColorMode::Rgb),
        3 => Some(ColorMode::Palette),
        4 => Some(ColorMode::GrayAlpha),
        6 => Some(ColorMode::Rgba),
        _ => None,
    }
}

/// Luminance quantization table (table 0) of a JPEG, in file order.
/// Coarser tables mean lower quality; used to tell whether a re-encode could only lose detail.
pub fn jpeg_luma_table(bytes: &[u8]) -> Option<[u16; 64]> {
    if !bytes.starts_with(&JPEG_SIGNATURE[..2]) {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        match marker {
            // fill byte
            0xFF => {
                pos += 1;
                continue;
            }
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            // tables always precede the first scan
            0xDA | 0xD9 => return None,
            _ => {}
        }

        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        let end = (pos + 2 + len).min(bytes.len());
        if marker == 0xDB {
            let mut at = pos + 4;
            while at < end {
                let precision = bytes[at] >> 4;
                let id = bytes[at] & 0x0F;
                let width = if precision == 0 { 1 } else { 2 };
                let table = bytes.get(at + 1..at + 1 + 64 * width)?;
                if id == 0 {
                    let mut out = [0u16; 64];
                    for (i, slot) in out.iter_mut().enumerate() {
                        *slot = if width == 1 {
                            table[i] as u16
                        } else {
                            u16::from_be_bytes([table[2 * i], table[2 * i + 1]])
                        };
                    }
                    return Some(out);
                }
                at += 1 + 64 * width;
            }
        }
        pos += 2 + len;
    }
    None
}

/// True when a file's extension disagrees with its sniffed content.
pub fn extension_mismatch(path: &Path, format: AssetFormat) -> bool {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format != AssetFormat::Unknown && !format.matches_extension(ext),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(8, 8, |x, y| image::Rgb([x as u8 * 30, y as u8 * 30, 90]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn sniffs_generated_buffers() {
        assert_eq!(sniff(&encoded(ImageFormat::Png)).unwrap(), AssetFormat::Png);
        assert_eq!(sniff(&encoded(ImageFormat::Jpeg)).unwrap(), AssetFormat::Jpeg);
        assert_eq!(sniff(&encoded(ImageFormat::WebP)).unwrap(), AssetFormat::WebP);
    }

    #[test]
    fn handcrafted_signatures() {
        let mut webp = b"RIFF\x00\x00\x00\x00WEBPVP8 ".to_vec();
        assert_eq!(sniff(&webp).unwrap(), AssetFormat::WebP);
        webp[8] = b'X';
        assert_eq!(sniff(&webp).unwrap(), AssetFormat::Unknown);

        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(sniff(&jpeg).unwrap(), AssetFormat::Jpeg);

        assert_eq!(sniff(b"GIF89a......").unwrap(), AssetFormat::Unknown);
    }

    #[test]
    fn short_buffer_is_unreadable() {
        let err = sniff(&PNG_SIGNATURE).unwrap_err();
        assert!(matches!(err, ImageToolError::UnreadableInput(_)));
        assert!(sniff(&[]).is_err());
    }

    #[test]
    fn reads_png_color_type() {
        assert_eq!(png_color_mode(&encoded(ImageFormat::Png)), Some(ColorMode::Rgb));
        assert_eq!(png_color_mode(&encoded(ImageFormat::Jpeg)), None);
    }

    #[test]
    fn reads_jpeg_luma_table() {
        let at_quality = |quality| {
            let mut out = Vec::new();
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality)
                .encode_image(&RgbImage::new(16, 16))
                .unwrap();
            jpeg_luma_table(&out).unwrap()
        };

        let fine: u32 = at_quality(95).iter().map(|&q| q as u32).sum();
        let coarse: u32 = at_quality(40).iter().map(|&q| q as u32).sum();
        assert!(coarse > fine);
        assert_eq!(at_quality(70), at_quality(70));

        assert_eq!(jpeg_luma_table(&encoded(ImageFormat::Png)), None);
        assert_eq!(jpeg_luma_table(&[0xFF, 0xD8, 0xFF, 0xDB, 0x00]), None);
    }

    #[test]
    fn extension_checks() {
        assert!(extension_mismatch(Path::new("a/hero.png"), AssetFormat::Jpeg));
        assert!(!extension_mismatch(Path::new("a/hero.JPEG"), AssetFormat::Jpeg));
        assert!(!extension_mismatch(Path::new("a/hero"), AssetFormat::Png));
        assert!(!extension_mismatch(Path::new("a/hero.png"), AssetFormat::Unknown));
    }
}
