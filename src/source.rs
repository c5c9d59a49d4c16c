//! Station file discovery and line streaming.
//!
//! One file per station; the station id is the file name without extension.
//! When the local data directory is missing or holds no station files, the
//! configured archive is downloaded once, and its data sub-directory is
//! unpacked into place before scanning again.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zip::ZipArchive;

use crate::error::{Error, Result, SourceError};

// ---

/// Where station files live and how to obtain them when they don't.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    // ---
    pub data_dir: PathBuf,
    /// Zip archive fetched when `data_dir` is absent or empty. `None` disables the fallback.
    pub remote_url: Option<String>,
    /// Directory inside the archive that holds the station files.
    pub archive_subdir: String,
    /// Station file extension, without the dot.
    pub extension: String,
}

impl SourceConfig {
    pub fn local(data_dir: impl Into<PathBuf>) -> Self {
        SourceConfig {
            data_dir: data_dir.into(),
            remote_url: None,
            archive_subdir: "wx_data".to_string(),
            extension: "txt".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationFile {
    pub station_id: String,
    pub path: PathBuf,
}

/// Derive a station id from a file name: `USC00110072.txt` -> `USC00110072`.
pub fn station_id_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Resolve the station files to ingest, fetching the remote archive if needed.
pub async fn discover(config: &SourceConfig) -> Result<Vec<StationFile>> {
    // ---
    let dir = &config.data_dir;
    match fs::metadata(dir).await {
        Ok(meta) if !meta.is_dir() => {
            return Err(Error::InvalidSourceRoot {
                path: dir.clone(),
                reason: "not a directory".to_string(),
            });
        }
        Ok(_) => {
            let files = list_station_files(dir, &config.extension).await?;
            if !files.is_empty() {
                return Ok(files);
            }
            info!("No station files in {}", dir.display());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("{} not found", dir.display());
        }
        Err(e) => return Err(SourceError::io(dir, e).into()),
    }

    let Some(url) = config.remote_url.as_deref() else {
        return Err(Error::InvalidSourceRoot {
            path: dir.clone(),
            reason: "no station files and no remote archive configured".to_string(),
        });
    };

    fetch_archive(url, &config.archive_subdir, dir).await?;
    let files = list_station_files(dir, &config.extension).await?;
    if files.is_empty() {
        return Err(Error::InvalidSourceRoot {
            path: dir.clone(),
            reason: format!("archive from {url} contained no station files"),
        });
    }
    Ok(files)
}

/// List station files in `dir`, sorted by station id.
pub async fn list_station_files(
    dir: &Path,
    extension: &str,
) -> std::result::Result<Vec<StationFile>, SourceError> {
    // ---
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| SourceError::io(dir, e))?;
    let mut files = Vec::new();

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SourceError::io(dir, e))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        match station_id_from_path(&path) {
            Some(station_id) => files.push(StationFile { station_id, path }),
            None => warn!("Cannot derive station id from {}", path.display()),
        }
    }

    files.sort_by(|a, b| a.station_id.cmp(&b.station_id).then(a.path.cmp(&b.path)));
    debug!("Found {} station files in {}", files.len(), dir.display());
    Ok(files)
}

// ---

/// Lazy line reader over one station file.
///
/// Opening again from the same [`StationFile`] restarts the sequence.
pub struct StationLines {
    station_id: String,
    path: PathBuf,
    lines: Lines<BufReader<fs::File>>,
    line_number: u64,
}

impl StationLines {
    pub async fn open(file: &StationFile) -> std::result::Result<Self, SourceError> {
        // ---
        let handle = fs::File::open(&file.path)
            .await
            .map_err(|e| SourceError::io(&file.path, e))?;
        Ok(StationLines {
            station_id: file.station_id.clone(),
            path: file.path.clone(),
            lines: BufReader::new(handle).lines(),
            line_number: 0,
        })
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    /// Next `(line_number, line)`. Blank lines are returned too, so the
    /// caller counts them as malformed.
    pub async fn next_line(&mut self) -> std::result::Result<Option<(u64, String)>, SourceError> {
        // ---
        let line = self
            .lines
            .next_line()
            .await
            .map_err(|e| SourceError::io(&self.path, e))?;
        Ok(line.map(|line| {
            self.line_number += 1;
            (self.line_number, line)
        }))
    }
}

// ---

/// Download a zip archive and unpack its `subdir` into `dest`.
///
/// Unpacks into a sibling staging directory first and renames it into place,
/// so a concurrent run never sees a half-extracted data directory.
pub async fn fetch_archive(url: &str, subdir: &str, dest: &Path) -> Result<()> {
    // ---
    info!("Downloading station archive from {}", url);

    let fetch_err = |message: String| SourceError::Fetch {
        url: url.to_string(),
        message,
    };
    let response = reqwest::get(url)
        .await
        .map_err(|e| fetch_err(e.to_string()))?;
    if !response.status().is_success() {
        return Err(fetch_err(format!("HTTP {}", response.status())).into());
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| fetch_err(e.to_string()))?
        .to_vec();
    debug!("Downloaded {} bytes", bytes.len());

    let staging = staging_dir(dest);
    let (url_owned, subdir_owned, staging_owned) =
        (url.to_string(), subdir.to_string(), staging.clone());
    let extracted = tokio::task::spawn_blocking(move || {
        extract_subdir(bytes, &subdir_owned, &staging_owned, &url_owned)
    })
    .await?;

    let count = match extracted {
        Ok(count) => count,
        Err(e) => {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(e.into());
        }
    };

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| SourceError::io(parent, e))?;
    }

    // An empty `dest` is replaced; a populated one means another run got there first.
    if let Err(e) = fs::rename(&staging, dest).await {
        let _ = fs::remove_dir_all(&staging).await;
        let populated = fs::metadata(dest).await.map(|m| m.is_dir()).unwrap_or(false);
        if !populated {
            return Err(SourceError::io(dest, e).into());
        }
        debug!("{} already populated by another run", dest.display());
    }

    info!("Extracted {} station files to {}", count, dest.display());
    Ok(())
}

fn staging_dir(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("wx_data");
    dest.with_file_name(format!(".{name}.{}.partial", Uuid::new_v4()))
}

/// Extract every file below a `subdir` path component into `out`.
fn extract_subdir(
    bytes: Vec<u8>,
    subdir: &str,
    out: &Path,
    url: &str,
) -> std::result::Result<usize, SourceError> {
    // ---
    let archive_err = |message: String| SourceError::Archive {
        url: url.to_string(),
        message,
    };
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| archive_err(e.to_string()))?;
    std::fs::create_dir_all(out).map_err(|e| SourceError::io(out, e))?;

    let mut count = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| archive_err(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            continue;
        };
        let Some(relative) = strip_through(&name, subdir) else {
            continue;
        };

        let target = out.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SourceError::io(parent, e))?;
        }
        let mut file = std::fs::File::create(&target).map_err(|e| SourceError::io(&target, e))?;
        std::io::copy(&mut entry, &mut file).map_err(|e| SourceError::io(&target, e))?;
        count += 1;
    }

    if count == 0 {
        return Err(archive_err(format!("no entries under '{subdir}/'")));
    }
    Ok(count)
}

/// The part of `path` after its first `subdir` component, if any.
fn strip_through(path: &Path, subdir: &str) -> Option<PathBuf> {
    let mut components = path.components();
    components.by_ref().find(|c| c.as_os_str() == subdir)?;
    let rest: PathBuf = components.collect();
    (!rest.as_os_str().is_empty()).then_some(rest)
}
