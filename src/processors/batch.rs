// asset-squeeze/src/processors/batch.rs
use crate::core::{
    AssetFormat, BatchConfig, CompressionResult, ImageProcessor, ImageToolError, ProcessConfig,
    Result,
};
use crate::processors::sniffer;
use crate::report::BatchReport;
use crate::utils::{backup_path_for, display_name, format_file_size};
use glob::{MatchOptions, Pattern};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;
use walkdir::{DirEntry, WalkDir};

/// Largest files listed in the pre-run summary.
pub const LARGEST_SHOWN: usize = 10;

/// A file selected for processing, with its sniffed format.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    pub size: u64,
    /// `None` when the signature could not be read.
    pub format: Option<AssetFormat>,
    pub extension_mismatch: bool,
    /// Where the encoding would be written; `None` when the mode leaves this file alone.
    pub destination: Option<PathBuf>,
    /// Another candidate already claims `destination`; this one is not processed.
    pub conflicts_with: Option<PathBuf>,
}

impl Candidate {
    pub fn rewrites_in_place(&self) -> bool {
        self.destination.as_deref() == Some(self.path.as_path())
    }
}

/// What a run is about to touch; shown to the confirmation gate.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub root: PathBuf,
    pub candidates: Vec<Candidate>,
    pub destructive: bool,
}

impl BatchPlan {
    pub fn total_bytes(&self) -> u64 {
        self.candidates.iter().map(|c| c.size).sum()
    }

    /// File count and byte total for one sniffed format.
    pub fn format_totals(&self, format: AssetFormat) -> (usize, u64) {
        self.candidates
            .iter()
            .filter(|c| c.format == Some(format))
            .fold((0, 0), |(n, bytes), c| (n + 1, bytes + c.size))
    }

    pub fn mislabeled(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.extension_mismatch)
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.conflicts_with.is_some())
    }

    /// The `n` biggest candidates, largest first.
    pub fn largest(&self, n: usize) -> Vec<&Candidate> {
        let mut by_size: Vec<_> = self.candidates.iter().collect();
        by_size.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
        by_size.truncate(n);
        by_size
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "{} files, {} total under {}",
            self.candidates.len(),
            format_file_size(self.total_bytes()),
            self.root.display()
        )];
        for format in [AssetFormat::Png, AssetFormat::Jpeg, AssetFormat::WebP, AssetFormat::Unknown] {
            let (count, bytes) = self.format_totals(format);
            if count > 0 {
                lines.push(format!("  {:<8} {:>5} files  {}", format, count, format_file_size(bytes)));
            }
        }
        let mislabeled: Vec<_> = self.mislabeled().collect();
        if !mislabeled.is_empty() {
            lines.push(format!("  {} mislabeled (extension does not match content):", mislabeled.len()));
            for c in mislabeled.iter().take(5) {
                let actual = c.format.map(|f| f.to_string()).unwrap_or_default();
                lines.push(format!("    {} is {}", c.path.display(), actual));
            }
            if mislabeled.len() > 5 {
                lines.push(format!("    ... and {} more", mislabeled.len() - 5));
            }
        }
        let conflicts: Vec<_> = self.conflicts().collect();
        if !conflicts.is_empty() {
            lines.push(format!("  {} skipped, output already claimed:", conflicts.len()));
            for c in &conflicts {
                if let Some(other) = &c.conflicts_with {
                    lines.push(format!("    {} (same output as {})", c.path.display(), other.display()));
                }
            }
        }
        lines.push(format!("  Largest {}:", LARGEST_SHOWN.min(self.candidates.len())));
        for c in self.largest(LARGEST_SHOWN) {
            lines.push(format!("    {:>10}  {}", format_file_size(c.size), display_name(&c.path, &self.root)));
        }
        lines.join("\n")
    }
}

/// Decides whether a destructive run may proceed.
pub trait ConfirmationGate: Send + Sync {
    fn confirm(&self, plan: &BatchPlan) -> bool;
}

/// Always proceeds. Default for library callers and tests.
pub struct AutoConfirm;

impl ConfirmationGate for AutoConfirm {
    fn confirm(&self, _plan: &BatchPlan) -> bool {
        true
    }
}

impl<F> ConfirmationGate for F
where
    F: Fn(&BatchPlan) -> bool + Send + Sync,
{
    fn confirm(&self, plan: &BatchPlan) -> bool {
        self(plan)
    }
}

pub struct BatchProcessor {
    config: ProcessConfig,
    batch: BatchConfig,
    gate: Box<dyn ConfirmationGate>,
    thread_pool: Option<rayon::ThreadPool>,
}

impl BatchProcessor {
    pub fn new(config: ProcessConfig, batch: BatchConfig) -> Result<Self> {
        config.validate()?;
        batch.validate()?;

        let thread_pool = if batch.threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(batch.threads)
                .build()
                .map_err(|e| {
                    ImageToolError::InvalidParameter(format!("Failed to create thread pool: {}", e))
                })?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            config,
            batch,
            gate: Box::new(AutoConfirm),
            thread_pool,
        })
    }

    pub fn with_confirmation(mut self, gate: impl ConfirmationGate + 'static) -> Self {
        self.gate = Box::new(gate);
        self
    }

    pub fn run(&self) -> Result<BatchReport> {
        let plan = self.plan()?;
        let root = &self.batch.root;

        if plan.candidates.is_empty() {
            log::warn!("No matching image files found in {}", root.display());
            return Ok(BatchReport::new(root.clone(), 0, Vec::new()));
        }

        log::info!("{}", plan.summary());

        if plan.destructive && !self.gate.confirm(&plan) {
            log::info!("Run declined, no files touched");
            return Err(ImageToolError::Declined);
        }

        if self.batch.backup {
            self.back_up(&plan)?;
        }

        let processor = ImageProcessor::new(self.config.clone());
        let output_dir = self.batch.output_dir.as_deref();
        let pb = self.create_progress_bar(plan.candidates.len());

        let work = || -> Vec<(PathBuf, Result<CompressionResult>)> {
            plan.candidates
                .par_iter()
                .progress_with(pb.clone())
                .map(|candidate| {
                    let outcome = match &candidate.conflicts_with {
                        Some(other) => Err(ImageToolError::OutputConflict(format!(
                            "{} would also be written from {}",
                            candidate.destination.as_deref().unwrap_or(other.as_path()).display(),
                            other.display()
                        ))),
                        None => processor.process_into(&candidate.path, root, output_dir),
                    };
                    if let Err(e) = &outcome {
                        log::warn!("Skipping {}: {}", candidate.path.display(), e);
                    }
                    (candidate.path.clone(), outcome)
                })
                .collect()
        };

        let outcomes = match &self.thread_pool {
            Some(pool) => pool.install(work),
            None => work(),
        };

        let report = BatchReport::new(root.clone(), plan.candidates.len(), outcomes);

        pb.finish_with_message(format!(
            "Processed {} images ({:.1}% size reduction)",
            report.processed_count(),
            report.percent_saved()
        ));

        Ok(report)
    }

    /// Enumerates and sniffs candidates without modifying anything.
    ///
    /// Each output path is claimed by at most one candidate: inputs claim themselves,
    /// then transcodes claim their destination in path order. Later claimants conflict.
    pub fn plan(&self) -> Result<BatchPlan> {
        self.validate_root()?;

        let root = &self.batch.root;
        let output_dir = self.batch.output_dir.as_deref();
        let mut candidates: Vec<Candidate> = self
            .collect_image_paths()?
            .into_iter()
            .map(|path| {
                let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                let format = sniffer::sniff_file(&path).ok();
                let extension_mismatch =
                    format.is_some_and(|f| sniffer::extension_mismatch(&path, f));
                let destination = format
                    .and_then(|f| self.config.destination(&path, root, output_dir, f));
                Candidate {
                    path,
                    size,
                    format,
                    extension_mismatch,
                    destination,
                    conflicts_with: None,
                }
            })
            .collect();

        let mut claimed: HashSet<PathBuf> = candidates.iter().map(|c| c.path.clone()).collect();
        let mut claimants: Vec<(PathBuf, PathBuf)> = Vec::new();
        for candidate in &mut candidates {
            let Some(destination) = &candidate.destination else {
                continue;
            };
            if candidate.rewrites_in_place() {
                continue;
            }
            if claimed.insert(destination.clone()) {
                claimants.push((destination.clone(), candidate.path.clone()));
            } else {
                let other = claimants
                    .iter()
                    .find(|(dest, _)| dest == destination)
                    .map(|(_, source)| source.clone())
                    .unwrap_or_else(|| destination.clone());
                log::warn!(
                    "{} and {} would both be written to {}; skipping {}",
                    other.display(),
                    candidate.path.display(),
                    destination.display(),
                    candidate.path.display()
                );
                candidate.conflicts_with = Some(other);
            }
        }

        let min_size = self.config.min_size_bytes;
        let destructive = candidates
            .iter()
            .filter(|c| c.conflicts_with.is_none() && c.size >= min_size)
            .any(|c| match &c.destination {
                Some(_) if c.rewrites_in_place() => true,
                Some(_) => self.config.delete_originals,
                None => false,
            });

        Ok(BatchPlan {
            root: root.clone(),
            candidates,
            destructive,
        })
    }

    pub fn collect_image_paths(&self) -> Result<Vec<PathBuf>> {
        let root = &self.batch.root;
        let include = compile(&self.batch.include)?;
        let exclude = compile(&self.batch.exclude)?;

        let scan_roots: Vec<PathBuf> = if self.batch.subdirs.is_empty() {
            vec![root.clone()]
        } else {
            self.batch
                .subdirs
                .iter()
                .map(|sub| root.join(sub))
                .filter(|dir| {
                    let exists = dir.is_dir();
                    if !exists {
                        log::warn!("Subdirectory {} does not exist, skipping", dir.display());
                    }
                    exists
                })
                .collect()
        };

        let mut paths: Vec<PathBuf> = scan_roots
            .iter()
            .flat_map(|dir| {
                WalkDir::new(dir)
                    .into_iter()
                    .filter_entry(|entry| !self.is_excluded_dir(entry))
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .filter(|entry| {
                        let name = entry.file_name().to_string_lossy();
                        matches_any(&include, &name) && !matches_any(&exclude, &name)
                    })
                    .map(|entry| entry.into_path())
            })
            .collect();

        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    fn is_excluded_dir(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return false;
        }
        if entry.file_name() == self.batch.backup_dir_name.as_str() {
            return true;
        }
        self.batch
            .output_dir
            .as_deref()
            .is_some_and(|out| entry.path() == out)
    }

    fn back_up(&self, plan: &BatchPlan) -> Result<()> {
        let root = &self.batch.root;
        let mut copied = 0usize;

        for candidate in &plan.candidates {
            let backup = backup_path_for(&candidate.path, root, &self.batch.backup_dir_name);
            // The first backup holds the true original; later runs must not replace it.
            if backup.exists() {
                continue;
            }
            if let Some(parent) = backup.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&candidate.path, &backup)?;
            copied += 1;
        }

        log::info!(
            "Backed up {} files to {}",
            copied,
            root.join(&self.batch.backup_dir_name).display()
        );
        Ok(())
    }

    fn create_progress_bar(&self, total: usize) -> ProgressBar {
        if !self.batch.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }

    fn validate_root(&self) -> Result<()> {
        let root = &self.batch.root;
        if !root.exists() {
            return Err(ImageToolError::UnreadableInput(format!(
                "Root directory does not exist: {}",
                root.display()
            )));
        }

        if !root.is_dir() {
            return Err(ImageToolError::InvalidParameter(format!(
                "Root path is not a directory: {}",
                root.display()
            )));
        }

        if let Some(out) = &self.batch.output_dir {
            if out.exists() && !out.is_dir() {
                return Err(ImageToolError::InvalidParameter(format!(
                    "Output path exists but is not a directory: {}",
                    out.display()
                )));
            }
            if out == root {
                return Err(ImageToolError::InvalidParameter(
                    "Output directory cannot be the root itself; omit it to rewrite in place"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| {
                ImageToolError::InvalidParameter(format!("Bad glob pattern '{}': {}", p, e))
            })
        })
        .collect()
}

fn matches_any(patterns: &[Pattern], name: &str) -> bool {
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };
    patterns.iter().any(|p| p.matches_with(name, options))
}
