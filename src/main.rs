use anyhow::{bail, Context};
use asset_squeeze::cli::{Cli, Commands, PipelineArgs, TerminalPrompt};
use asset_squeeze::processors::{quantizer, sniffer, AutoConfirm, BatchProcessor};
use asset_squeeze::utils::format_file_size;
use asset_squeeze::{
    BatchConfig, GeometryNormalizer, ImageProcessor, ImageToolError, Loader, ResultStatus,
};
use clap::Parser;
use log::LevelFilter;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logger; RUST_LOG still overrides the default level
    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let outcome = match cli.command {
        Commands::Batch {
            root,
            subdirs,
            include,
            exclude,
            backup,
            backup_dir,
            output,
            delete_originals,
            threads,
            yes,
            json,
            top,
            no_progress,
            pipeline,
        } => {
            let batch = BatchConfig {
                root,
                subdirs,
                include,
                exclude,
                backup,
                backup_dir_name: backup_dir,
                output_dir: output,
                threads,
                show_progress: !no_progress && !json,
            };
            let report_output = ReportOutput { json, top };
            process_batch(batch, pipeline, delete_originals, yes, report_output)
        }
        Commands::Optimize {
            input,
            delete_original,
            pipeline,
        } => process_optimize(input, pipeline, delete_original),
        Commands::Info { input, pipeline } => process_info(input, pipeline),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn probe_quantizer(pipeline: &PipelineArgs) -> Option<PathBuf> {
    if pipeline.no_quantizer {
        log::debug!("pngquant disabled, PNGs go through oxipng only");
        return None;
    }
    let found = quantizer::probe();
    match &found {
        Some(path) => log::info!("Using pngquant at {}", path.display()),
        None => log::info!("pngquant not found, PNGs go through oxipng only"),
    }
    found
}

struct ReportOutput {
    json: bool,
    top: usize,
}

fn process_batch(
    batch: BatchConfig,
    pipeline: PipelineArgs,
    delete_originals: bool,
    yes: bool,
    output: ReportOutput,
) -> anyhow::Result<ExitCode> {
    let quantizer = probe_quantizer(&pipeline);
    let config = pipeline.into_config(quantizer, delete_originals);

    let processor = BatchProcessor::new(config, batch)?;
    let processor = if yes || !std::io::stdin().is_terminal() {
        processor.with_confirmation(AutoConfirm)
    } else {
        processor.with_confirmation(TerminalPrompt)
    };

    let report = match processor.run() {
        Ok(report) => report,
        Err(ImageToolError::Declined) => {
            println!("Cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => return Err(e.into()),
    };

    if output.json {
        println!("{}", report.to_json().context("Failed to serialize report")?);
    } else {
        print!("{}", report.render_text(output.top));
    }

    if report.nothing_readable() {
        log::error!("None of the {} candidate files could be read", report.candidates);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn process_optimize(
    input: PathBuf,
    pipeline: PipelineArgs,
    delete_original: bool,
) -> anyhow::Result<ExitCode> {
    let quantizer = probe_quantizer(&pipeline);
    let config = pipeline.into_config(quantizer, delete_original);
    config.validate()?;

    let processor = ImageProcessor::new(config);
    let result = match processor.process(&input) {
        Ok(result) => result,
        Err(e @ ImageToolError::UnreadableInput(_)) => return Err(e.into()),
        Err(e) => {
            log::warn!("Left {} untouched: {}", input.display(), e);
            return Ok(ExitCode::SUCCESS);
        }
    };

    match result.status {
        ResultStatus::Saved => println!(
            "{} -> {}: {} -> {} ({:.1}% saved)",
            input.display(),
            result.output_path.display(),
            format_file_size(result.original_size),
            format_file_size(result.new_size),
            result.percent_saved()
        ),
        ResultStatus::AlreadyOptimal => {
            println!("{} is already optimal", input.display())
        }
        ResultStatus::Skipped(reason) => {
            println!("{} skipped ({:?})", input.display(), reason)
        }
    }
    if result.original_deleted {
        println!("Deleted original {}", input.display());
    }

    Ok(ExitCode::SUCCESS)
}

fn process_info(input: PathBuf, pipeline: PipelineArgs) -> anyhow::Result<ExitCode> {
    if !input.exists() {
        bail!("File does not exist: {}", input.display());
    }

    let config = pipeline.into_config(None, false);
    config.validate()?;

    let loader = Loader::new();
    let (bytes, format) = loader.read(&input)?;
    let file_size = bytes.len() as u64;
    let mismatch = sniffer::extension_mismatch(&input, format);

    println!("=== Image Information ===");
    println!("File: {}", input.display());
    println!("Size: {}", format_file_size(file_size));
    println!("Format: {}", format);
    if mismatch {
        println!("Warning: extension does not match content");
    }

    let asset = match loader.decode(&input, &bytes, format) {
        Ok(asset) => asset,
        Err(e) => {
            println!("Decode: {}", e);
            return Ok(ExitCode::SUCCESS);
        }
    };
    let dims = asset.dimensions();
    println!("Dimensions: {} pixels", dims);
    println!("Color mode: {:?}", asset.color_mode);

    match config.mode.target_for(format) {
        Some(target) => println!("Output ({:?} mode): {}", config.mode, target),
        None => println!("Output ({:?} mode): left untouched", config.mode),
    }
    if file_size < config.min_size_bytes {
        println!(
            "Below the {} threshold, would be skipped",
            format_file_size(config.min_size_bytes)
        );
    }

    let normalizer =
        GeometryNormalizer::new(config.algorithm, config.max_dimension, config.aspect_ratio);
    match normalizer.plan(dims.width, dims.height) {
        Ok(plan) if plan.is_identity() => println!("Geometry: unchanged"),
        Ok(plan) => {
            if let Some(size) = plan.resize_to {
                println!("Resize: {} -> {}", plan.original, size);
            }
            if let Some(band) = plan.crop {
                println!("Crop: rows {}..{}", band.top, band.bottom());
            }
            println!("Final: {}", plan.final_dimensions());
        }
        Err(e) => println!("Geometry: {}", e),
    }

    Ok(ExitCode::SUCCESS)
}
