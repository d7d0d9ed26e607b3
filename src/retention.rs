//! Bounded retention of generated PDFs and their JSON sidecars.

use crate::models::output::{PdfSidecar, RecentPdf};
use chrono::{DateTime, Local};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const OUTPUT_EXT: &str = "pdf";
const SIDECAR_EXT: &str = "json";

#[derive(Debug, Clone)]
struct OutputEntry {
    path: PathBuf,
    saved_at: SystemTime,
    size: u64,
}

impl OutputEntry {
    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub fn sidecar_path(output: &Path) -> PathBuf {
    output.with_extension(SIDECAR_EXT)
}

/// Output files in `dir`, newest first. A missing directory yields nothing.
fn list_outputs(dir: &Path) -> io::Result<Vec<OutputEntry>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(OUTPUT_EXT) {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                log::warn!("skipping unreadable output {}: {e}", path.display());
                continue;
            }
        };
        // Overwriting a file keeps its birth time, so order by last write.
        let saved_at = meta.modified().or_else(|_| meta.created()).unwrap_or(UNIX_EPOCH);
        files.push(OutputEntry { path, saved_at, size: meta.len() });
    }
    files.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then_with(|| b.path.cmp(&a.path)));
    Ok(files)
}

/// Keeps the `keep_count` newest outputs in `dir` and deletes the rest along
/// with their sidecars. Returns how many outputs were deleted.
pub fn enforce(dir: &Path, keep_count: usize) -> usize {
    let files = match list_outputs(dir) {
        Ok(files) => files,
        Err(e) => {
            log::error!("output cleanup failed to list {}: {e}", dir.display());
            return 0;
        }
    };
    remove_beyond(&files, keep_count)
}

fn remove_beyond(files: &[OutputEntry], keep_count: usize) -> usize {
    let mut removed = 0;
    for entry in files.iter().skip(keep_count) {
        if let Err(e) = std::fs::remove_file(&entry.path) {
            log::warn!("failed to delete {}: {e}", entry.path.display());
            continue;
        }
        removed += 1;
        log::info!("cleaned up old output {}", entry.file_name());

        let sidecar = sidecar_path(&entry.path);
        match std::fs::remove_file(&sidecar) {
            Ok(()) => log::info!("cleaned up metadata {}", sidecar.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("failed to delete {}: {e}", sidecar.display()),
        }
    }
    if removed > 0 {
        log::info!("output cleanup removed {removed} file(s), kept latest {keep_count}");
    }
    removed
}

#[derive(Debug, Clone)]
pub struct SavedOutput {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub scan_duration: Option<f64>,
}

/// Writes `bytes` to `dir/filename`. A parseable `scan_duration` (seconds) also
/// produces a sidecar; anything else is logged and ignored, and a sidecar left
/// by an earlier save under the same name is removed.
pub fn save_output(
    dir: &Path,
    filename: &str,
    bytes: &[u8],
    scan_duration: Option<&str>,
) -> io::Result<SavedOutput> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    std::fs::write(&path, bytes)?;

    let duration = scan_duration.and_then(|raw| match raw.trim().parse::<f64>() {
        Ok(d) if d.is_finite() => Some(d),
        _ => {
            log::warn!("invalid scan duration {raw:?} for {filename}");
            None
        }
    });
    if let Some(d) = duration {
        let sidecar = PdfSidecar {
            filename: filename.to_string(),
            scan_duration: d,
            created_at: epoch_secs(SystemTime::now()),
            file_size: bytes.len() as u64,
        };
        let json = serde_json::to_vec(&sidecar).map_err(io::Error::other)?;
        std::fs::write(sidecar_path(&path), json)?;
        log::info!("saved scan duration {d}s for {filename}");
    } else {
        match std::fs::remove_file(sidecar_path(&path)) {
            Ok(()) => log::info!("removed stale metadata for {filename}"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }

    Ok(SavedOutput { path, size_bytes: bytes.len() as u64, scan_duration: duration })
}

pub fn read_sidecar(output: &Path) -> Option<PdfSidecar> {
    let path = sidecar_path(output);
    let raw = std::fs::read(&path).ok()?;
    match serde_json::from_slice(&raw) {
        Ok(sidecar) => Some(sidecar),
        Err(e) => {
            log::warn!("failed to read metadata {}: {e}", path.display());
            None
        }
    }
}

/// The `limit` newest outputs. Everything older is deleted first.
pub fn list_recent(dir: &Path, limit: usize) -> io::Result<(Vec<RecentPdf>, usize)> {
    let files = list_outputs(dir)?;
    let cleaned = remove_beyond(&files, limit);
    let recent = files.iter().take(limit).map(describe).collect();
    Ok((recent, cleaned))
}

fn describe(entry: &OutputEntry) -> RecentPdf {
    let filename = entry.file_name();
    let display_name = entry
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.clone());
    let local: DateTime<Local> = entry.saved_at.into();
    RecentPdf {
        download_url: format!("/api/pdf/download/{filename}"),
        scan_duration: read_sidecar(&entry.path).map(|s| s.scan_duration),
        size_mb: size_mb(entry.size),
        created_at: epoch_secs(entry.saved_at),
        scan_info: local.format("%Y-%m-%d %H:%M:%S").to_string(),
        formatted_date: local.format("%m/%d %H:%M").to_string(),
        display_name,
        filename,
    }
}

/// Megabytes to two decimals; files under ~5 KiB report fractional KB instead
/// of rounding to zero.
fn size_mb(bytes: u64) -> f64 {
    let mb = (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;
    if mb == 0.0 {
        ((bytes as f64 / 1024.0) * 10.0).round() / 10.0 / 1000.0
    } else {
        mb
    }
}

fn epoch_secs(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}
