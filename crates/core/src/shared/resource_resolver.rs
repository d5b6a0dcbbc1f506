use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("{0} not found locally and no download URL is configured")]
    NotFound(PathBuf),
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Locate a model or cascade file, downloading it when necessary.
///
/// Resolution order:
/// 1. The configured path itself
/// 2. A file with the same name in the user cache directory
/// 3. Download from `url` into the cache directory
pub fn resolve(
    configured: &Path,
    url: Option<&str>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ResolveError> {
    if configured.exists() {
        return Ok(configured.to_path_buf());
    }

    let name = configured
        .file_name()
        .ok_or_else(|| ResolveError::NotFound(configured.to_path_buf()))?;
    let cache_dir = cache_dir()?;
    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        log::debug!("Using cached {}", cached_path.display());
        return Ok(cached_path);
    }

    let Some(url) = url else {
        return Err(ResolveError::NotFound(configured.to_path_buf()));
    };
    fs::create_dir_all(&cache_dir).map_err(ResolveError::CacheDir)?;
    log::info!("Downloading {url} to {}", cached_path.display());
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Platform-specific cache directory for downloaded resources.
///
/// - macOS: `~/Library/Application Support/MaskWatch/models/`
/// - Linux: `$XDG_CACHE_HOME/MaskWatch/models/` or `~/.cache/MaskWatch/models/`
/// - Windows: `%LOCALAPPDATA%/MaskWatch/models/`
pub fn cache_dir() -> Result<PathBuf, ResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("MaskWatch").join("models"))
            .ok_or(ResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("MaskWatch").join("models"))
            .ok_or(ResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ResolveError> {
    let temp_path = dest.with_extension("part");
    let result = download_to(url, dest, &temp_path, progress);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn download_to(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ResolveError> {
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |e: std::io::Error| ResolveError::Write { path, source: e }
    };

    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;
    let mut file = fs::File::create(temp_path).map_err(write_err(temp_path))?;

    // Streamed in 1 MB chunks; the whole body is never held in memory.
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = response.read(&mut buf).map_err(write_err(temp_path))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err(temp_path))?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(write_err(temp_path))?;
    drop(file);

    fs::rename(temp_path, dest).map_err(write_err(dest))
}
