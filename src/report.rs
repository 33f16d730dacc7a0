// asset-squeeze/src/report.rs
use crate::core::{
    CompressionResult, FailureKind, FileFailure, ImageToolError, Result, ResultStatus, SkipReason,
};
use crate::utils::{display_name, format_file_size, percent_saved};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Rows shown by default in the text summary.
pub const DEFAULT_TOP: usize = 10;

/// Aggregated outcome of a batch run, in a deterministic order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub root: PathBuf,
    pub candidates: usize,
    /// Sorted by bytes saved, largest first, then by path.
    pub results: Vec<CompressionResult>,
    /// Sorted by path.
    pub failures: Vec<FileFailure>,
    pub total_original_bytes: u64,
    pub total_new_bytes: u64,
}

impl BatchReport {
    pub fn new(
        root: PathBuf,
        candidates: usize,
        outcomes: Vec<(PathBuf, Result<CompressionResult>)>,
    ) -> Self {
        let mut results = Vec::new();
        let mut failures = Vec::new();

        for (path, outcome) in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => failures.push(failure(path, &e)),
            }
        }

        results.sort_by(|a, b| {
            b.bytes_saved
                .cmp(&a.bytes_saved)
                .then_with(|| a.path.cmp(&b.path))
        });
        failures.sort_by(|a, b| a.path.cmp(&b.path));

        let total_original_bytes = results.iter().map(|r| r.original_size).sum();
        let total_new_bytes = results.iter().map(|r| r.new_size).sum();

        Self {
            root,
            candidates,
            results,
            failures,
            total_original_bytes,
            total_new_bytes,
        }
    }

    /// Files that went through the encoder, whether or not they shrank.
    pub fn processed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, ResultStatus::Saved | ResultStatus::AlreadyOptimal))
            .count()
    }

    pub fn saved_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == ResultStatus::Saved)
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, ResultStatus::Skipped(_)))
            .count()
    }

    pub fn bytes_saved(&self) -> u64 {
        self.results.iter().map(|r| r.bytes_saved).sum()
    }

    pub fn percent_saved(&self) -> f64 {
        percent_saved(self.total_original_bytes, self.total_new_bytes)
    }

    /// Files whose bytes could be read, including those that later failed to encode.
    pub fn readable_count(&self) -> usize {
        self.results.len()
            + self
                .failures
                .iter()
                .filter(|f| f.kind != FailureKind::UnreadableInput)
                .count()
    }

    /// True when there was something to do but not a single file could be read.
    pub fn nothing_readable(&self) -> bool {
        self.candidates > 0 && self.readable_count() == 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Text summary with the `top` files by savings; the JSON form carries every row.
    pub fn render_text(&self, top: usize) -> String {
        let mut out = String::new();
        let rule = "-".repeat(96);

        let _ = writeln!(out, "Top {} by savings:", top.min(self.results.len()));
        let _ = writeln!(
            out,
            "{:<40} {:>10} {:>10} {:>10} {:>6}  {}",
            "File", "Original", "New", "Saved", "%", "Transforms"
        );
        let _ = writeln!(out, "{}", rule);

        for r in self.results.iter().take(top) {
            let name = display_name(&r.path, &self.root);
            let mut note = match r.status {
                ResultStatus::Saved => r.transform.map(|t| t.describe()).unwrap_or_default(),
                ResultStatus::AlreadyOptimal => "already optimal".to_string(),
                ResultStatus::Skipped(SkipReason::BelowThreshold) => "skipped (small)".to_string(),
                ResultStatus::Skipped(SkipReason::NotApplicable) => "skipped (n/a)".to_string(),
                ResultStatus::Skipped(SkipReason::TargetExists) => "skipped (target exists)".to_string(),
            };
            if r.extension_mismatch {
                note.push_str(&format!(" [content is {}]", r.source_format));
            }
            if r.output_path != r.path {
                note.push_str(&format!(" -> {}", display_name(&r.output_path, &self.root)));
            }
            let _ = writeln!(
                out,
                "{:<40} {:>10} {:>10} {:>10} {:>5.1}%  {}",
                truncate(&name, 40),
                format_file_size(r.original_size),
                format_file_size(r.new_size),
                format_file_size(r.bytes_saved),
                r.percent_saved(),
                note
            );
        }

        if self.results.len() > top {
            let _ = writeln!(out, "  ... and {} more files", self.results.len() - top);
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out, "{}", rule);
            let _ = writeln!(out, "Failures:");
            for f in &self.failures {
                let _ = writeln!(
                    out,
                    "  {} [{:?}] {}",
                    display_name(&f.path, &self.root),
                    f.kind,
                    f.message
                );
            }
        }

        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(
            out,
            "Files: {} found, {} processed, {} saved, {} skipped, {} failed",
            self.candidates,
            self.processed_count(),
            self.saved_count(),
            self.skipped_count(),
            self.failures.len()
        );
        let _ = writeln!(
            out,
            "Total: {} -> {} (saved {}, {:.1}%)",
            format_file_size(self.total_original_bytes),
            format_file_size(self.total_new_bytes),
            format_file_size(self.bytes_saved()),
            self.percent_saved()
        );

        out
    }
}

fn failure(path: PathBuf, error: &ImageToolError) -> FileFailure {
    FileFailure {
        path,
        kind: error.kind(),
        message: error.to_string(),
    }
}

fn truncate(name: &str, width: usize) -> String {
    let count = name.chars().count();
    if count <= width {
        return name.to_string();
    }
    let tail: String = name.chars().skip(count - (width - 3)).collect();
    format!("...{}", tail)
}
