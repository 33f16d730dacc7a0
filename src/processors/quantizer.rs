// asset-squeeze/src/processors/quantizer.rs
use crate::core::{ImageToolError, QualityRange, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub const PNGQUANT: &str = "pngquant";

/// pngquant's exit status when the minimum quality cannot be met.
const QUALITY_TOO_LOW: i32 = 99;

/// Looks for a working `pngquant` once, at startup.
pub fn probe() -> Option<PathBuf> {
    let path = find_in_system_path(PNGQUANT)?;
    let responds = Command::new(&path)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);

    if responds {
        log::debug!("Found {} at {}", PNGQUANT, path.display());
        Some(path)
    } else {
        log::warn!("{} at {} did not answer --version", PNGQUANT, path.display());
        None
    }
}

fn find_in_system_path(tool_name: &str) -> Option<PathBuf> {
    let tool_with_ext = format!("{}{}", tool_name, env::consts::EXE_SUFFIX);

    env::split_paths(&env::var_os("PATH")?)
        .map(|dir| dir.join(&tool_with_ext))
        .find(|path| path.is_file())
}

/// Palette quantization through the external `pngquant` binary.
pub struct Quantizer {
    binary: Option<PathBuf>,
    range: QualityRange,
}

impl Quantizer {
    pub fn new(binary: Option<PathBuf>, range: QualityRange) -> Self {
        Self { binary, range }
    }

    pub fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    /// Quantizes an encoded PNG at the slowest speed, stripping metadata.
    pub fn quantize(&self, png: &[u8]) -> Result<Vec<u8>> {
        let binary = self
            .binary
            .as_deref()
            .ok_or_else(|| ImageToolError::ExternalToolUnavailable(PNGQUANT.to_string()))?;

        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join("input.png");
        let output = scratch.path().join("output.png");
        std::fs::write(&input, png)?;

        let result = self.command(binary, &input, &output).output().map_err(|e| {
            ImageToolError::ExternalToolUnavailable(format!("{}: {}", binary.display(), e))
        })?;

        if !result.status.success() {
            let reason = match result.status.code() {
                Some(QUALITY_TOO_LOW) => format!(
                    "quality {}-{} not achievable",
                    self.range.min, self.range.max
                ),
                _ => String::from_utf8_lossy(&result.stderr).trim().to_string(),
            };
            return Err(ImageToolError::EncodeFailure(format!("{}: {}", PNGQUANT, reason)));
        }

        Ok(std::fs::read(&output)?)
    }

    fn command(&self, binary: &Path, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(binary);
        cmd.arg("--quality")
            .arg(format!("{}-{}", self.range.min, self.range.max))
            .args(["--speed", "1", "--strip", "--force", "--output"])
            .arg(output)
            .arg("--")
            .arg(input)
            .stdin(Stdio::null());
        cmd
    }
}
