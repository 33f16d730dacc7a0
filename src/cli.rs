// asset-squeeze/src/cli.rs
use crate::core::{
    AspectRatio, CompressionMode, ProcessConfig, QualityRange, ResizeAlgorithm, DEFAULT_BACKUP_DIR,
};
use crate::processors::{BatchPlan, ConfirmationGate};
use crate::report::DEFAULT_TOP;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "asset-squeeze", version, about = "Normalize and compress game art for bundling")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Normalize and compress every matching image under a directory
    Batch {
        /// Root directory to scan
        root: PathBuf,

        /// Only scan these subdirectories of the root (repeatable)
        #[arg(short, long = "subdir")]
        subdirs: Vec<String>,

        /// File name patterns to include (repeatable)
        #[arg(long, default_values = ["*.png", "*.jpg", "*.jpeg"])]
        include: Vec<String>,

        /// File name patterns to exclude (repeatable)
        #[arg(long)]
        exclude: Vec<String>,

        /// Copy originals into the backup directory before touching them
        #[arg(long)]
        backup: bool,

        /// Backup directory name under the root; never scanned
        #[arg(long, default_value = DEFAULT_BACKUP_DIR)]
        backup_dir: String,

        /// Write results under this directory instead of in place
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Delete originals after a smaller transcode was written
        #[arg(long)]
        delete_originals: bool,

        /// Worker threads (0 = all cores)
        #[arg(short, long, default_value_t = 0)]
        threads: usize,

        /// Do not ask before destructive runs
        #[arg(short, long)]
        yes: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Files listed in the text summary, by savings
        #[arg(long, default_value_t = DEFAULT_TOP)]
        top: usize,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Run the pipeline on a single file
    Optimize {
        input: PathBuf,

        /// Delete the original after a smaller transcode was written
        #[arg(long)]
        delete_original: bool,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Show detected format, dimensions and planned geometry for a file
    Info {
        input: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Compression mode
    #[arg(short, long, value_enum, default_value_t = Mode::Preserve)]
    pub mode: Mode,

    /// Lossy quality for WEBP and JPEG (1-100)
    #[arg(short, long, default_value_t = 85, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: u8,

    /// Quality window passed to pngquant
    #[arg(long, default_value = "75-100")]
    pub png_quality: QualityRange,

    /// Downscale so neither side exceeds this many pixels
    #[arg(long, default_value_t = 1024)]
    pub max_dimension: u32,

    /// Never downscale
    #[arg(long)]
    pub no_resize: bool,

    /// Target aspect ratio for the center crop, as W:H
    #[arg(long, default_value = "16:9")]
    pub aspect: AspectRatio,

    /// Never crop
    #[arg(long)]
    pub no_crop: bool,

    /// Resampling filter for downscaling
    #[arg(long, value_enum, default_value_t = Algorithm::Lanczos3)]
    pub algorithm: Algorithm,

    /// Files smaller than this many KiB are left alone
    #[arg(long, default_value_t = 50)]
    pub min_size_kb: u64,

    /// Ignore pngquant even if it is installed
    #[arg(long)]
    pub no_quantizer: bool,
}

impl PipelineArgs {
    pub fn into_config(self, quantizer: Option<PathBuf>, delete_originals: bool) -> ProcessConfig {
        ProcessConfig {
            mode: self.mode.into(),
            quality: self.quality,
            png_quality: self.png_quality,
            max_dimension: (!self.no_resize).then_some(self.max_dimension),
            aspect_ratio: (!self.no_crop).then_some(self.aspect),
            algorithm: self.algorithm.into(),
            min_size_bytes: self.min_size_kb * 1024,
            delete_originals,
            quantizer,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Mode {
    /// PNG stays PNG, JPEG stays JPEG, rewritten in place
    Preserve,
    /// Optimize PNG sources only
    Png,
    /// Transcode PNG and JPEG to lossy WEBP
    Webp,
    /// Re-encode JPEG sources only
    Jpeg,
}

impl From<Mode> for CompressionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Preserve => CompressionMode::Preserve,
            Mode::Png => CompressionMode::Png,
            Mode::Webp => CompressionMode::Webp,
            Mode::Jpeg => CompressionMode::Jpeg,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Algorithm {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl From<Algorithm> for ResizeAlgorithm {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Nearest => ResizeAlgorithm::Nearest,
            Algorithm::Bilinear => ResizeAlgorithm::Bilinear,
            Algorithm::Bicubic => ResizeAlgorithm::Bicubic,
            Algorithm::Lanczos3 => ResizeAlgorithm::Lanczos3,
        }
    }
}

/// Asks on the terminal before a destructive run.
pub struct TerminalPrompt;

impl ConfirmationGate for TerminalPrompt {
    fn confirm(&self, plan: &BatchPlan) -> bool {
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{}", plan.summary());
        let _ = writeln!(stderr, "Originals will be modified in place or deleted.");
        let _ = write!(stderr, "Proceed? (Y/N): ");
        let _ = stderr.flush();

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => answer.trim().eq_ignore_ascii_case("y"),
            Err(_) => false,
        }
    }
}
