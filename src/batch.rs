//
// batch.rs
// Dicom-Harmonize
//
// Runs one independent processing session per DICOM file of a directory tree, in parallel.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::SessionConfig;
use crate::image::PngVisualizer;
use crate::protocol::ExportFormat;
use crate::session::ProcessingSession;
use crate::window::WindowSettings;

/// What to produce for every file. Outputs land under the output directory
/// at the same relative location as their source file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchTask {
    /// `<stem>.json` / `<stem>.xml` protocol export.
    Protocol(ExportFormat),
    /// `<stem>_original.png` and `<stem>_windowed.png`.
    Window(WindowSettings),
    /// `<stem>_original.png` and `<stem>_segmentation.png`.
    Segment,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: Vec<BatchFailure>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.processed + self.failed.len()
    }
}

/// Files ending in `.dcm` under `dir`, sorted for stable output.
pub fn collect_dicom_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case("dcm"))
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// A failing file is logged and counted; it never stops the rest of the batch.
pub fn process_directory(
    dir: &Path,
    output_dir: &Path,
    task: BatchTask,
    config: &SessionConfig,
) -> Result<BatchSummary> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;

    let files = collect_dicom_files(dir);
    info!(directory = %dir.display(), files = files.len(), task = ?task, "batch started");

    let outcomes: Vec<(PathBuf, Result<()>)> = files
        .par_iter()
        .map(|path| {
            let outcome = process_file(path, &mirrored_dir(dir, output_dir, path), task, config);
            (path.clone(), outcome)
        })
        .collect();

    let mut summary = BatchSummary::default();
    for (path, outcome) in outcomes {
        match outcome {
            Ok(()) => {
                debug!(path = %path.display(), "processed");
                summary.processed += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %format!("{e:#}"), "batch item failed");
                summary.failed.push(BatchFailure {
                    path,
                    error: format!("{e:#}"),
                });
            }
        }
    }

    info!(
        processed = summary.processed,
        failed = summary.failed.len(),
        "batch finished"
    );
    Ok(summary)
}

/// `output_dir` joined with the directory of `path` relative to `dir`, so
/// same-named files from different folders never share an output.
fn mirrored_dir(dir: &Path, output_dir: &Path, path: &Path) -> PathBuf {
    match path
        .strip_prefix(dir)
        .ok()
        .and_then(Path::parent)
        .filter(|relative| !relative.as_os_str().is_empty())
    {
        Some(relative) => output_dir.join(relative),
        None => output_dir.to_path_buf(),
    }
}

fn process_file(
    path: &Path,
    output_dir: &Path,
    task: BatchTask,
    config: &SessionConfig,
) -> Result<()> {
    let mut session = ProcessingSession::new(config.clone());
    session
        .load(path)
        .with_context(|| format!("Failed to load {:?}", path))?;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());

    match task {
        BatchTask::Protocol(format) => {
            let document = session.get_protocol_info(format)?;
            let target = output_dir.join(format!("{stem}.{}", format.extension()));
            std::fs::write(&target, document)
                .with_context(|| format!("Failed to write {:?}", target))?;
        }
        BatchTask::Window(window) => {
            session.adjust_window(window.width, window.level)?;
            session.visualize_results(&PngVisualizer::new(output_dir, stem))?;
        }
        BatchTask::Segment => {
            session.segment_gray_white_matter()?;
            session.visualize_results(&PngVisualizer::new(output_dir, stem))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_mirror_the_input_tree() {
        let input = Path::new("/data/in");
        let output = Path::new("/data/out");
        assert_eq!(
            mirrored_dir(input, output, Path::new("/data/in/series1/IM0001.dcm")),
            output.join("series1")
        );
        assert_eq!(
            mirrored_dir(input, output, Path::new("/data/in/a/b/IM0001.dcm")),
            output.join("a").join("b")
        );
        assert_eq!(mirrored_dir(input, output, Path::new("/data/in/top.dcm")), output);
        assert_eq!(mirrored_dir(input, output, Path::new("/elsewhere/x.dcm")), output);
    }

    #[test]
    fn only_dcm_files_are_collected_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("b")).expect("mkdir");
        for name in ["b/2.DCM", "a.dcm", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").expect("write");
        }
        let files = collect_dicom_files(dir.path());
        assert_eq!(files, vec![dir.path().join("a.dcm"), dir.path().join("b/2.DCM")]);
    }
}
