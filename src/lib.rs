pub mod cli;
pub mod core;
pub mod processors;
pub mod report;
pub mod utils;

pub use crate::core::{
    AspectRatio, AssetFormat, BatchConfig, ColorMode, CompressionMode, CompressionResult,
    Dimensions, FailureKind, FileFailure, ImageProcessor, ImageToolError, ProcessConfig,
    QualityRange, ResizeAlgorithm, Result, ResultStatus, SkipReason, TransformSummary,
};
pub use processors::{
    AutoConfirm, BatchPlan, BatchProcessor, Candidate, ConfirmationGate, Compressor,
    GeometryNormalizer, GeometryPlan, Loader, Quantizer,
};
pub use report::BatchReport;
pub use utils::format_file_size;

pub mod prelude {
    pub use crate::{
        AspectRatio, AssetFormat, BatchConfig, BatchProcessor, CompressionMode, ImageProcessor,
        ProcessConfig, ResizeAlgorithm,
    };
}

// Re-export commonly used types
pub use image::DynamicImage;
