// asset-squeeze/src/processors/geometry.rs
use crate::core::{AspectRatio, Dimensions, ImageToolError, ResizeAlgorithm, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Horizontal band kept by a vertical center crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBand {
    pub top: u32,
    pub height: u32,
}

impl CropBand {
    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }
}

/// Transforms to apply to one image. Resize runs before crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryPlan {
    pub original: Dimensions,
    pub resize_to: Option<Dimensions>,
    pub crop: Option<CropBand>,
}

impl GeometryPlan {
    pub fn is_identity(&self) -> bool {
        self.resize_to.is_none() && self.crop.is_none()
    }

    pub fn final_dimensions(&self) -> Dimensions {
        let scaled = self.resize_to.unwrap_or(self.original);
        match self.crop {
            Some(band) => Dimensions { width: scaled.width, height: band.height },
            None => scaled,
        }
    }
}

/// Uniform downscale so neither side exceeds `max`. Never upscales.
pub fn fit_within(width: u32, height: u32, max: u32) -> Result<Option<Dimensions>> {
    check_dimensions(width, height)?;
    if max == 0 {
        return Err(ImageToolError::InvalidGeometry("maximum dimension is 0".to_string()));
    }
    if width <= max && height <= max {
        return Ok(None);
    }

    // Scale factor is max / longer side; integer math keeps the long side exact.
    let (w, h, m) = (width as u64, height as u64, max as u64);
    let (new_w, new_h) = if w >= h {
        (m, h * m / w)
    } else {
        (w * m / h, m)
    };

    Ok(Some(Dimensions {
        width: new_w.max(1) as u32,
        height: new_h.max(1) as u32,
    }))
}

/// Vertical band of height `floor(W / R)` centered on `H / 2`, if the image is taller than that.
pub fn center_crop(width: u32, height: u32, ratio: AspectRatio) -> Result<Option<CropBand>> {
    check_dimensions(width, height)?;
    if ratio.width == 0 || ratio.height == 0 {
        return Err(ImageToolError::InvalidGeometry(format!("degenerate aspect ratio {}", ratio)));
    }

    let target_height = (width as u64 * ratio.height as u64 / ratio.width as u64) as u32;
    if height <= target_height {
        return Ok(None);
    }
    if target_height == 0 {
        return Err(ImageToolError::InvalidGeometry(format!(
            "width {} is too narrow for a {} crop",
            width, ratio
        )));
    }

    Ok(Some(CropBand {
        top: (height - target_height) / 2,
        height: target_height,
    }))
}

fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(ImageToolError::InvalidGeometry(format!(
            "image has zero dimension ({}x{})",
            width, height
        )));
    }
    Ok(())
}

pub struct GeometryNormalizer {
    algorithm: ResizeAlgorithm,
    max_dimension: Option<u32>,
    aspect_ratio: Option<AspectRatio>,
}

impl GeometryNormalizer {
    pub fn new(
        algorithm: ResizeAlgorithm,
        max_dimension: Option<u32>,
        aspect_ratio: Option<AspectRatio>,
    ) -> Self {
        Self {
            algorithm,
            max_dimension,
            aspect_ratio,
        }
    }

    pub fn plan(&self, width: u32, height: u32) -> Result<GeometryPlan> {
        check_dimensions(width, height)?;

        let resize_to = match self.max_dimension {
            Some(max) => fit_within(width, height, max)?,
            None => None,
        };
        let scaled = resize_to.unwrap_or(Dimensions { width, height });
        let crop = match self.aspect_ratio {
            Some(ratio) => center_crop(scaled.width, scaled.height, ratio)?,
            None => None,
        };

        Ok(GeometryPlan {
            original: Dimensions { width, height },
            resize_to,
            crop,
        })
    }

    pub fn apply(&self, image: DynamicImage, plan: &GeometryPlan) -> DynamicImage {
        let mut image = image;

        if let Some(size) = plan.resize_to {
            log::debug!(
                "Resizing image from {}x{} to {}",
                image.width(),
                image.height(),
                size
            );
            image = image.resize_exact(size.width, size.height, self.filter_type());
        }

        if let Some(band) = plan.crop {
            let (width, _) = image.dimensions();
            log::debug!(
                "Cropping rows {}..{} to {}x{}",
                band.top,
                band.bottom(),
                width,
                band.height
            );
            image = image.crop_imm(0, band.top, width, band.height);
        }

        image
    }

    fn filter_type(&self) -> FilterType {
        match self.algorithm {
            ResizeAlgorithm::Nearest => FilterType::Nearest,
            ResizeAlgorithm::Bilinear => FilterType::Triangle,
            ResizeAlgorithm::Bicubic => FilterType::CatmullRom,
            ResizeAlgorithm::Lanczos3 => FilterType::Lanczos3,
        }
    }
}
