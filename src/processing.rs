use crate::constants::{IMAGE_EXTENSIONS, PREPROCESS_DEBUG_DIR};
use crate::records::{ImageRecord, RunStats};
use crate::resolver::Resolver;
use anyhow::{bail, Context, Result};
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Records in discovery order plus run statistics.
#[derive(Debug)]
pub struct RunSummary {
    pub records: Vec<ImageRecord>,
    pub stats: RunStats,
    pub elapsed: Duration,
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Lists the photos under `dir`, sorted by path. Only the top level is
/// scanned unless `recursive`; hidden entries and the preprocessing debug
/// folder are skipped.
pub fn discover_photos(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("Input directory not found: {}", dir.display());
    }

    let walker = WalkBuilder::new(dir)
        .max_depth(if recursive { None } else { Some(1) })
        .hidden(true)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .filter_entry(|entry| entry.file_name() != PREPROCESS_DEBUG_DIR)
        .build();

    let mut photos: Vec<PathBuf> = walker
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| is_supported_image(path))
        .collect();

    photos.sort();
    Ok(photos)
}

/// Resolves every photo under `input_dir` on a pool of `jobs` threads.
/// No single photo can fail the run.
pub fn run(resolver: &Resolver, input_dir: &Path, recursive: bool, jobs: usize) -> Result<RunSummary> {
    let photos = discover_photos(input_dir, recursive)?;
    info!("Found {} photo(s) in {}", photos.len(), input_dir.display());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Failed to build worker pool")?;

    let start = Instant::now();
    let records: Vec<ImageRecord> = pool.install(|| photos.par_iter().map(|path| resolver.resolve(path)).collect());
    let elapsed = start.elapsed();

    let stats = RunStats::from_records(&records, resolver.budget().used());
    info!(
        "Processed {} photo(s) in {:.2}s: {} from EXIF, {} from primary OCR, {} from fallback, {} unresolved, {} remote call(s)",
        stats.total,
        elapsed.as_secs_f64(),
        stats.from_metadata,
        stats.from_primary,
        stats.from_fallback,
        stats.unresolved,
        stats.remote_calls
    );

    Ok(RunSummary { records, stats, elapsed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn extension_filter_ignores_case() {
        assert!(is_supported_image(Path::new("a/IMG_1.JPG")));
        assert!(is_supported_image(Path::new("b.jpeg")));
        assert!(is_supported_image(Path::new("c.Png")));
        assert!(!is_supported_image(Path::new("d.heic")));
        assert!(!is_supported_image(Path::new("jpg")));
    }

    #[test]
    fn discovery_depth_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b.jpg"));
        touch(&root.join("A.PNG"));
        touch(&root.join("notes.txt"));
        touch(&root.join(".hidden.jpg"));
        touch(&root.join("sub/c.jpeg"));
        touch(&root.join(PREPROCESS_DEBUG_DIR).join("b.png"));

        let top = discover_photos(root, false).unwrap();
        let names: Vec<String> = top
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["A.PNG", "b.jpg"]);

        let all = discover_photos(root, true).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().any(|p| p.ends_with("sub/c.jpeg")));
        assert!(!all.iter().any(|p| p.starts_with(root.join(PREPROCESS_DEBUG_DIR))));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_photos(&dir.path().join("nope"), false).is_err());
    }
}
