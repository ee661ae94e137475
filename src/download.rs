// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

//! Checkpoint and dataset artifact resolution.
//!
//! Released artifacts live under a basedir (default `~/.cache/chrombert/data`).
//! Paths given on the command line resolve against the basedir when relative
//! and must exist; inferred artifacts are downloaded from the release mirror
//! when absent, streaming to a temp file with an atomic rename.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{ImputationError, Result};
use crate::genome::{BinSize, Genome};

/// Basedir suffix under the user's home directory.
const BASEDIR_SUFFIX: &str = ".cache/chrombert/data";

/// Release mirror for checkpoint and dataset artifacts.
const MIRROR_URL: &str = "https://huggingface.co/datasets/TongjiZhanglab/chrombert/resolve/main";

/// Connection timeout in seconds.
const CONNECT_TIMEOUT: u64 = 30;

/// Read timeout in seconds.
const READ_TIMEOUT: u64 = 600;

/// Default basedir, `~/.cache/chrombert/data`.
///
/// Falls back to a relative `.cache/chrombert/data` when no home directory
/// can be determined.
#[must_use]
pub fn default_basedir() -> PathBuf {
    dirs::home_dir().map_or_else(|| PathBuf::from(BASEDIR_SUFFIX), |h| h.join(BASEDIR_SUFFIX))
}

/// File name of the pretrained checkpoint for a genome/resolution pair.
#[must_use]
pub fn pretrain_checkpoint_name(genome: Genome, bin_size: BinSize) -> String {
    format!("checkpoint/{genome}_6k_{bin_size}_pretrain.onnx")
}

/// File name of the backing reference-cistrome dataset.
#[must_use]
pub fn dataset_name(genome: Genome, bin_size: BinSize) -> String {
    format!("{genome}_6k_{bin_size}.hdf5")
}

/// Resolve a user-provided path against the basedir.
///
/// Absolute paths are taken as-is; relative paths join the basedir. The
/// resolved path must exist.
///
/// # Errors
///
/// Returns an `IoError` naming `flag` when the resolved path is missing.
pub fn resolve_explicit(basedir: &Path, path: &Path, flag: &str) -> Result<PathBuf> {
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        basedir.join(path)
    };
    if !resolved.exists() {
        return Err(ImputationError::IoError(format!(
            "{flag}={} does not exist",
            resolved.display()
        )));
    }
    Ok(resolved)
}

/// Resolve an inferred artifact under the basedir, downloading it from the
/// release mirror when absent.
///
/// # Errors
///
/// Returns an error if the artifact is missing and the download fails.
pub fn ensure_artifact(basedir: &Path, name: &str) -> Result<PathBuf> {
    let dest = basedir.join(name);
    if dest.exists() {
        return Ok(dest);
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            ImputationError::IoError(format!(
                "failed to create directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    let url = format!("{MIRROR_URL}/{name}");
    download_file(&url, &dest)?;
    Ok(dest)
}

/// Format bytes as human-readable string (e.g., "10.4MB").
fn format_bytes(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes >= GB {
        format!("{:.1}GB", bytes / GB)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes / KB)
    } else {
        format!("{bytes:.0}B")
    }
}

/// Format time duration.
fn format_time(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else {
        let mins = (seconds / 60.0) as u32;
        let secs = seconds % 60.0;
        format!("{mins}:{secs:04.1}")
    }
}

/// Generate progress bar string.
fn generate_bar(progress: f64, width: usize) -> String {
    let filled = (progress * width as f64) as usize;
    let mut bar = "━".repeat(filled.min(width));
    if filled < width {
        bar.push_str(&"─".repeat(width - filled));
    }
    bar
}

/// Download a file from URL to the specified path with a progress bar.
///
/// Streams to a temporary file, then renames atomically so partial downloads
/// never masquerade as complete artifacts.
fn download_file(url: &str, dest: &Path) -> Result<()> {
    let config = ureq::Agent::config_builder()
        .timeout_connect(Some(Duration::from_secs(CONNECT_TIMEOUT)))
        .timeout_recv_body(Some(Duration::from_secs(READ_TIMEOUT)))
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let response = agent.get(url).call().map_err(|e| {
        let msg = match &e {
            ureq::Error::Timeout(_) => format!("Connection timed out while downloading {url}"),
            ureq::Error::Io(io_err) => format!("Network error downloading {url}: {io_err}"),
            _ => format!("Failed to download {url}: {e}"),
        };
        ImputationError::IoError(msg)
    })?;

    let total_size: u64 = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s: &str| s.parse().ok())
        .unwrap_or(0);

    let temp_path = dest.with_extension("part");
    let _ = fs::remove_file(&temp_path);

    let temp_file = File::create(&temp_path).map_err(|e| {
        ImputationError::IoError(format!(
            "Failed to create temp file {}: {e}",
            temp_path.display()
        ))
    })?;
    let mut writer = BufWriter::new(temp_file);

    let mut reader = response.into_body().into_reader();
    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 65536];
    let start_time = Instant::now();
    let mut last_update = Instant::now();

    const BAR_WIDTH: usize = 12;
    const MIN_UPDATE_INTERVAL: f64 = 0.1;

    let desc = format!("Downloading {} to '{}'", url, dest.display());

    loop {
        let bytes_read = reader.read(&mut buffer).map_err(|e| {
            ImputationError::IoError(format!("Failed to read from network: {e}"))
        })?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read]).map_err(|e| {
            ImputationError::IoError(format!("Failed to write to temp file: {e}"))
        })?;
        downloaded += bytes_read as u64;

        let now = Instant::now();
        if now.duration_since(last_update).as_secs_f64() < MIN_UPDATE_INTERVAL {
            continue;
        }
        last_update = now;

        if total_size > 0 {
            let progress = downloaded as f64 / total_size as f64;
            let elapsed = start_time.elapsed().as_secs_f64();
            let speed = downloaded as f64 / elapsed.max(1e-6);
            eprint!(
                "\r{desc} {} {}/{} {}/s {}",
                generate_bar(progress, BAR_WIDTH),
                format_bytes(downloaded as f64),
                format_bytes(total_size as f64),
                format_bytes(speed),
                format_time(elapsed)
            );
        }
    }
    if total_size > 0 {
        eprintln!();
    }

    writer
        .flush()
        .map_err(|e| ImputationError::IoError(format!("Failed to flush temp file: {e}")))?;
    drop(writer);

    fs::rename(&temp_path, dest).map_err(|e| {
        ImputationError::IoError(format!(
            "Failed to move download into place at {}: {e}",
            dest.display()
        ))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        assert_eq!(
            pretrain_checkpoint_name(Genome::Hg38, BinSize::Kb1),
            "checkpoint/hg38_6k_1kb_pretrain.onnx"
        );
        assert_eq!(dataset_name(Genome::Hg38, BinSize::Kb1), "hg38_6k_1kb.hdf5");
        assert_eq!(
            dataset_name(Genome::Hg38, BinSize::Bp200),
            "hg38_6k_200bp.hdf5"
        );
    }

    #[test]
    fn test_default_basedir_suffix() {
        let basedir = default_basedir();
        assert!(basedir.ends_with(".cache/chrombert/data"));
    }

    #[test]
    fn test_resolve_explicit_relative() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.onnx"), b"x").unwrap();
        let resolved =
            resolve_explicit(dir.path(), Path::new("model.onnx"), "--pretrain-ckpt").unwrap();
        assert_eq!(resolved, dir.path().join("model.onnx"));
    }

    #[test]
    fn test_resolve_explicit_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_explicit(dir.path(), Path::new("missing.onnx"), "--hdf5-file")
            .unwrap_err();
        assert!(err.to_string().contains("--hdf5-file"));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_ensure_artifact_existing_skips_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("checkpoint")).unwrap();
        let name = "checkpoint/hg38_6k_1kb_pretrain.onnx";
        std::fs::write(dir.path().join(name), b"weights").unwrap();
        let resolved = ensure_artifact(dir.path(), name).unwrap();
        assert_eq!(resolved, dir.path().join(name));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512.0), "512B");
        assert_eq!(format_bytes(10.4 * 1024.0 * 1024.0), "10.4MB");
    }

    #[test]
    fn test_generate_bar() {
        assert_eq!(generate_bar(0.5, 4), "━━──");
        assert_eq!(generate_bar(1.0, 4), "━━━━");
    }
}
