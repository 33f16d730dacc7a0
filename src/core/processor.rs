// asset-squeeze/src/core/processor.rs
use super::{
    AssetFormat, CompressionResult, ImageToolError, ProcessConfig, Result, ResultStatus,
    SkipReason, TransformSummary,
};
use crate::processors::compressor::{self, Compressor};
use crate::processors::quantizer::Quantizer;
use crate::processors::{sniffer, GeometryNormalizer, Loader};
use crate::utils::write_atomic;
use std::path::Path;

/// Runs sniff, normalize, compress and write for one file at a time.
/// Holds no per-file state, so one instance can serve every worker.
pub struct ImageProcessor {
    config: ProcessConfig,
    loader: Loader,
    normalizer: GeometryNormalizer,
    compressor: Compressor,
}

impl ImageProcessor {
    pub fn new(config: ProcessConfig) -> Self {
        let normalizer =
            GeometryNormalizer::new(config.algorithm, config.max_dimension, config.aspect_ratio);
        let quantizer = Quantizer::new(config.quantizer.clone(), config.png_quality);
        let compressor = Compressor::new(config.quality, quantizer);

        Self {
            config,
            loader: Loader::new(),
            normalizer,
            compressor,
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Processes a file in place, or alongside it for transcodes.
    pub fn process<P: AsRef<Path>>(&self, input_path: P) -> Result<CompressionResult> {
        let input_path = input_path.as_ref();
        let root = input_path.parent().unwrap_or_else(|| Path::new(""));
        self.process_into(input_path, root, None)
    }

    /// Processes a file, writing under `output_dir` (mirroring its path below `root`) when given.
    pub fn process_into(
        &self,
        input_path: &Path,
        root: &Path,
        output_dir: Option<&Path>,
    ) -> Result<CompressionResult> {
        let original_size = std::fs::metadata(input_path)
            .map_err(|e| ImageToolError::UnreadableInput(format!("{}: {}", input_path.display(), e)))?
            .len();

        if original_size < self.config.min_size_bytes {
            log::debug!(
                "Skipping {} ({} bytes, below {} byte threshold)",
                input_path.display(),
                original_size,
                self.config.min_size_bytes
            );
            let format = sniffer::sniff_file(input_path).unwrap_or(AssetFormat::Unknown);
            let mut result = CompressionResult::skipped(
                input_path.to_path_buf(),
                format,
                original_size,
                SkipReason::BelowThreshold,
            );
            result.extension_mismatch = sniffer::extension_mismatch(input_path, format);
            return Ok(result);
        }

        let (bytes, format) = self.loader.read(input_path)?;
        let original_size = bytes.len() as u64;

        let extension_mismatch = sniffer::extension_mismatch(input_path, format);
        if extension_mismatch {
            log::warn!(
                "{} is named as another format but contains {}; treating it as {}",
                input_path.display(),
                format,
                format
            );
        }

        if format == AssetFormat::Unknown {
            return Err(ImageToolError::UnsupportedFormat(format!(
                "{} is not PNG, JPEG or WEBP",
                input_path.display()
            )));
        }

        let skip = |reason| {
            let mut result =
                CompressionResult::skipped(input_path.to_path_buf(), format, original_size, reason);
            result.extension_mismatch = extension_mismatch;
            result
        };

        let (Some(target), Some(output_path)) = (
            self.config.mode.target_for(format),
            self.config.destination(input_path, root, output_dir, format),
        ) else {
            log::debug!(
                "{:?} mode has nothing to do for {} ({})",
                self.config.mode,
                input_path.display(),
                format
            );
            return Ok(skip(SkipReason::NotApplicable));
        };

        if output_path != input_path && output_path.exists() {
            log::warn!(
                "{} already exists; leaving {} alone rather than overwriting it",
                output_path.display(),
                input_path.display()
            );
            return Ok(skip(SkipReason::TargetExists));
        }

        let asset = self.loader.decode(input_path, &bytes, format)?;
        let dims = asset.dimensions();
        let plan = self.normalizer.plan(dims.width, dims.height)?;

        if format == AssetFormat::Jpeg
            && target == AssetFormat::Jpeg
            && plan.is_identity()
            && self.compressor.jpeg_at_or_below_quality(&bytes)
        {
            log::info!(
                "{}: already at or below quality {}, not re-encoding",
                input_path.display(),
                self.config.quality
            );
            let mut result = already_optimal(input_path, format, original_size, extension_mismatch);
            result.transform = Some(TransformSummary {
                resized: false,
                cropped: false,
                alpha_dropped: false,
                before: dims,
                after: dims,
            });
            return Ok(result);
        }
        drop(bytes);

        let image = self.normalizer.apply(asset.image, &plan);

        let encoded = self.compressor.encode(image, target)?;
        let new_size = encoded.bytes.len() as u64;
        let transform = TransformSummary {
            resized: plan.resize_to.is_some(),
            cropped: plan.crop.is_some(),
            alpha_dropped: encoded.alpha_dropped,
            before: plan.original,
            after: plan.final_dimensions(),
        };

        let lossy_reencode = encoded.lossy && target == format;
        if !compressor::worth_keeping(original_size, new_size, lossy_reencode) {
            log::info!(
                "{}: already optimal ({} bytes, re-encode gave {})",
                input_path.display(),
                original_size,
                new_size
            );
            let mut result = already_optimal(input_path, format, original_size, extension_mismatch);
            result.transform = Some(transform);
            return Ok(result);
        }

        write_atomic(&output_path, &encoded.bytes, Some(input_path))?;

        let mut original_deleted = false;
        if self.config.delete_originals && output_path != input_path {
            match std::fs::remove_file(input_path) {
                Ok(()) => {
                    original_deleted = true;
                    log::debug!("Deleted original {}", input_path.display());
                }
                Err(e) => log::warn!(
                    "Wrote {} but could not delete original {}: {}",
                    output_path.display(),
                    input_path.display(),
                    e
                ),
            }
        }

        log::info!(
            "{}: {} -> {} bytes ({:.1}% saved)",
            input_path.display(),
            original_size,
            new_size,
            crate::utils::percent_saved(original_size, new_size)
        );

        Ok(CompressionResult {
            path: input_path.to_path_buf(),
            output_path,
            source_format: format,
            output_format: target,
            original_size,
            new_size,
            bytes_saved: original_size - new_size,
            transform: Some(transform),
            status: ResultStatus::Saved,
            extension_mismatch,
            original_deleted,
        })
    }
}

fn already_optimal(
    path: &Path,
    format: AssetFormat,
    size: u64,
    extension_mismatch: bool,
) -> CompressionResult {
    CompressionResult {
        path: path.to_path_buf(),
        output_path: path.to_path_buf(),
        source_format: format,
        output_format: format,
        original_size: size,
        new_size: size,
        bytes_saved: 0,
        transform: None,
        status: ResultStatus::AlreadyOptimal,
        extension_mismatch,
        original_deleted: false,
    }
}
