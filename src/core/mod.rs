// asset-squeeze/src/core/mod.rs
pub mod processor;

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub use processor::ImageProcessor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAlgorithm {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos3,
}

/// Encoded format as identified by magic bytes, never by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AssetFormat {
    Png,
    Jpeg,
    WebP,
    Unknown,
}

impl AssetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AssetFormat::Png => "png",
            AssetFormat::Jpeg => "jpg",
            AssetFormat::WebP => "webp",
            AssetFormat::Unknown => "bin",
        }
    }

    /// Whether a file extension is a conventional spelling for this format.
    pub fn matches_extension(self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        match self {
            AssetFormat::Png => ext == "png",
            AssetFormat::Jpeg => matches!(ext.as_str(), "jpg" | "jpeg" | "jpe" | "jfif"),
            AssetFormat::WebP => ext == "webp",
            AssetFormat::Unknown => false,
        }
    }
}

impl fmt::Display for AssetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetFormat::Png => "PNG",
            AssetFormat::Jpeg => "JPEG",
            AssetFormat::WebP => "WEBP",
            AssetFormat::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColorMode {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
    Palette,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMode {
    /// PNG stays PNG and JPEG stays JPEG, rewritten in place.
    #[default]
    Preserve,
    Png,
    Webp,
    Jpeg,
}

impl CompressionMode {
    /// Output format for a sniffed source, or `None` when this mode has no procedure for it.
    pub fn target_for(self, source: AssetFormat) -> Option<AssetFormat> {
        match (self, source) {
            (_, AssetFormat::Unknown) => None,
            (CompressionMode::Preserve, AssetFormat::Png) => Some(AssetFormat::Png),
            (CompressionMode::Preserve, AssetFormat::Jpeg) => Some(AssetFormat::Jpeg),
            (CompressionMode::Preserve, AssetFormat::WebP) => None,
            (CompressionMode::Png, AssetFormat::Png) => Some(AssetFormat::Png),
            (CompressionMode::Jpeg, AssetFormat::Jpeg) => Some(AssetFormat::Jpeg),
            (CompressionMode::Webp, _) => Some(AssetFormat::WebP),
            _ => None,
        }
    }
}

/// Width:height ratio, e.g. 16:9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    pub const WIDESCREEN: AspectRatio = AspectRatio { width: 16, height: 9 };

    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ImageToolError::InvalidParameter(format!(
                "Aspect ratio components must be positive, got {}:{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::WIDESCREEN
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl FromStr for AspectRatio {
    type Err = ImageToolError;

    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s.split_once(':').ok_or_else(|| {
            ImageToolError::InvalidParameter(format!("Aspect ratio must look like W:H, got '{}'", s))
        })?;
        let parse = |part: &str| {
            part.trim().parse::<u32>().map_err(|_| {
                ImageToolError::InvalidParameter(format!("Invalid aspect ratio component '{}'", part))
            })
        };
        Self::new(parse(w)?, parse(h)?)
    }
}

/// Inclusive quality window handed to the palette quantizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityRange {
    pub min: u8,
    pub max: u8,
}

impl Default for QualityRange {
    fn default() -> Self {
        Self { min: 75, max: 100 }
    }
}

impl FromStr for QualityRange {
    type Err = ImageToolError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || ImageToolError::InvalidParameter(format!("Quality range must look like 75-100, got '{}'", s));
        let (min, max) = s.split_once('-').ok_or_else(bad)?;
        let min = min.trim().parse::<u8>().map_err(|_| bad())?;
        let max = max.trim().parse::<u8>().map_err(|_| bad())?;
        if min > max || max > 100 {
            return Err(bad());
        }
        Ok(Self { min, max })
    }
}

#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub mode: CompressionMode,
    pub quality: u8,
    pub png_quality: QualityRange,
    pub max_dimension: Option<u32>,
    pub aspect_ratio: Option<AspectRatio>,
    pub algorithm: ResizeAlgorithm,
    pub min_size_bytes: u64,
    pub delete_originals: bool,
    /// Location of `pngquant`, as found by the startup probe.
    pub quantizer: Option<PathBuf>,
}

pub const DEFAULT_MIN_SIZE_BYTES: u64 = 50 * 1024;

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            mode: CompressionMode::Preserve,
            quality: 85,
            png_quality: QualityRange::default(),
            max_dimension: Some(1024),
            aspect_ratio: Some(AspectRatio::WIDESCREEN),
            algorithm: ResizeAlgorithm::Lanczos3,
            min_size_bytes: DEFAULT_MIN_SIZE_BYTES,
            delete_originals: false,
            quantizer: None,
        }
    }
}

impl ProcessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.quality == 0 || self.quality > 100 {
            return Err(ImageToolError::InvalidParameter(
                "Quality must be between 1 and 100".to_string(),
            ));
        }

        let QualityRange { min, max } = self.png_quality;
        if min > max || max > 100 {
            return Err(ImageToolError::InvalidParameter(format!(
                "PNG quality window {}-{} is not within 0-100",
                min, max
            )));
        }

        if self.max_dimension == Some(0) {
            return Err(ImageToolError::InvalidParameter(
                "Maximum dimension must be positive".to_string(),
            ));
        }

        if let Some(ratio) = self.aspect_ratio {
            AspectRatio::new(ratio.width, ratio.height)?;
        }

        Ok(())
    }

    /// Where the encoding of `input` would be written, or `None` when this mode leaves it alone.
    pub fn destination(
        &self,
        input: &Path,
        root: &Path,
        output_dir: Option<&Path>,
        source: AssetFormat,
    ) -> Option<PathBuf> {
        self.mode
            .target_for(source)
            .map(|target| crate::utils::output_path_for(input, root, output_dir, source, target))
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub root: PathBuf,
    pub subdirs: Vec<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub backup: bool,
    pub backup_dir_name: String,
    pub output_dir: Option<PathBuf>,
    /// Worker count; 0 uses every available core.
    pub threads: usize,
    pub show_progress: bool,
}

pub const DEFAULT_BACKUP_DIR: &str = "backup_original";

impl BatchConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            subdirs: Vec::new(),
            include: vec!["*.png".to_string(), "*.jpg".to_string(), "*.jpeg".to_string()],
            exclude: Vec::new(),
            backup: false,
            backup_dir_name: DEFAULT_BACKUP_DIR.to_string(),
            output_dir: None,
            threads: 0,
            show_progress: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.backup_dir_name.is_empty() || self.backup_dir_name.contains(['/', '\\']) {
            return Err(ImageToolError::InvalidParameter(format!(
                "Backup directory name must be a single path component, got '{}'",
                self.backup_dir_name
            )));
        }

        for pattern in self.include.iter().chain(&self.exclude) {
            glob::Pattern::new(pattern).map_err(|e| {
                ImageToolError::InvalidParameter(format!("Bad glob pattern '{}': {}", pattern, e))
            })?;
        }

        if self.include.is_empty() {
            return Err(ImageToolError::InvalidParameter(
                "At least one include pattern is required".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Geometry changes applied to an asset, before and after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransformSummary {
    pub resized: bool,
    pub cropped: bool,
    pub alpha_dropped: bool,
    pub before: Dimensions,
    pub after: Dimensions,
}

impl TransformSummary {
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.resized {
            parts.push("resize");
        }
        if self.cropped {
            parts.push("crop");
        }
        if self.alpha_dropped {
            parts.push("rgb");
        }
        if parts.is_empty() {
            "-".to_string()
        } else {
            format!("{} ({} -> {})", parts.join("+"), self.before, self.after)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    BelowThreshold,
    NotApplicable,
    /// The destination already exists and is not this file.
    TargetExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum ResultStatus {
    /// A strictly smaller encoding was written.
    Saved,
    /// Re-encoding did not beat the original; nothing was written.
    AlreadyOptimal,
    Skipped(SkipReason),
}

/// Outcome for one asset. Built once, never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct CompressionResult {
    pub path: PathBuf,
    pub output_path: PathBuf,
    pub source_format: AssetFormat,
    pub output_format: AssetFormat,
    pub original_size: u64,
    pub new_size: u64,
    pub bytes_saved: u64,
    pub transform: Option<TransformSummary>,
    pub status: ResultStatus,
    pub extension_mismatch: bool,
    pub original_deleted: bool,
}

impl CompressionResult {
    pub fn skipped(path: PathBuf, format: AssetFormat, size: u64, reason: SkipReason) -> Self {
        Self {
            output_path: path.clone(),
            path,
            source_format: format,
            output_format: format,
            original_size: size,
            new_size: size,
            bytes_saved: 0,
            transform: None,
            status: ResultStatus::Skipped(reason),
            extension_mismatch: false,
            original_deleted: false,
        }
    }

    pub fn percent_saved(&self) -> f64 {
        crate::utils::percent_saved(self.original_size, self.new_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnreadableInput,
    UnsupportedFormat,
    InvalidGeometry,
    EncodeFailure,
    OutputConflict,
    Other,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ImageToolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unreadable input: {0}")]
    UnreadableInput(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Encode failure: {0}")]
    EncodeFailure(String),

    #[error("External tool unavailable: {0}")]
    ExternalToolUnavailable(String),

    #[error("Output conflict: {0}")]
    OutputConflict(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Batch declined at confirmation")]
    Declined,
}

impl ImageToolError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ImageToolError::Io(_) | ImageToolError::UnreadableInput(_) => FailureKind::UnreadableInput,
            ImageToolError::UnsupportedFormat(_) => FailureKind::UnsupportedFormat,
            ImageToolError::InvalidGeometry(_) => FailureKind::InvalidGeometry,
            ImageToolError::EncodeFailure(_) => FailureKind::EncodeFailure,
            ImageToolError::OutputConflict(_) => FailureKind::OutputConflict,
            _ => FailureKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ImageToolError>;
