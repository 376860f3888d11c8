//! Directory survey: file count, total size and a SHA-256 over all content

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use spindle_core::{Error, Result, SurveyConfig};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Output of one directory survey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyResult {
    /// Directory that was surveyed
    #[serde(rename = "root_path")]
    pub root: PathBuf,

    /// Number of regular files hashed
    pub file_count: u64,

    /// Sum of the sizes of those files in bytes
    #[serde(rename = "total_size_bytes")]
    pub total_size: u64,

    /// Lowercase hex SHA-256 of all file contents in traversal order
    pub content_hash: String,

    /// Wall-clock time spent surveying, serialized as seconds
    #[serde(with = "super::seconds")]
    pub duration: Duration,

    /// When the survey finished
    pub finished_at: DateTime<Utc>,
}

impl std::fmt::Display for SurveyResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} files, {} bytes, sha256 {} in {:.3} seconds",
            self.root.display(),
            self.file_count,
            self.total_size,
            self.content_hash,
            self.duration.as_secs_f64()
        )
    }
}

/// Surveys one directory tree
#[derive(Debug, Clone)]
pub struct SurveyWorker {
    root: PathBuf,
    chunk_size: usize,
}

impl SurveyWorker {
    /// Create a worker for `config.root`.
    ///
    /// Fails with [`Error::Precondition`] when the root is missing or is not
    /// a directory, so callers can reject the run before starting anything.
    pub fn new(config: &SurveyConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(Error::Configuration(
                "survey chunk size must be greater than 0".to_string(),
            ));
        }

        let metadata = std::fs::metadata(&config.root).map_err(|e| {
            Error::Precondition(format!(
                "survey root {} is not accessible: {}",
                config.root.display(),
                e
            ))
        })?;
        if !metadata.is_dir() {
            return Err(Error::Precondition(format!(
                "survey root {} is not a directory",
                config.root.display()
            )));
        }

        Ok(Self {
            root: config.root.clone(),
            chunk_size: config.chunk_size,
        })
    }

    /// Directory this worker surveys
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate once, then hash exactly the enumerated files
    pub fn run(&self) -> Result<SurveyResult> {
        let start = Instant::now();

        let files = enumerate_files(&self.root)?;
        debug!("Enumerated {} files under {}", files.len(), self.root.display());

        let (total_size, content_hash) = hash_files(&files, self.chunk_size)?;

        let result = SurveyResult {
            root: self.root.clone(),
            file_count: files.len() as u64,
            total_size,
            content_hash,
            duration: start.elapsed(),
            finished_at: Utc::now(),
        };
        info!("got info from {} files!", result.file_count);

        Ok(result)
    }
}

/// All regular files under `root`, sorted by name at every level.
///
/// Symlinks and directories are skipped. Any walk error aborts the survey.
pub fn enumerate_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(io::Error::from(e)))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Stream `files` in order through one SHA-256, returning total bytes and hex digest
pub fn hash_files(files: &[PathBuf], chunk_size: usize) -> Result<(u64, String)> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; chunk_size.max(1)];
    let mut total_size = 0_u64;

    for path in files {
        let mut file = File::open(path).map_err(|e| with_path(path, e))?;
        loop {
            let read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(with_path(path, e)),
            };
            hasher.update(&buffer[..read]);
            total_size += read as u64;
        }
    }

    Ok((total_size, hex::encode(hasher.finalize())))
}

fn with_path(path: &Path, err: io::Error) -> Error {
    Error::Io(io::Error::new(
        err.kind(),
        format!("{}: {}", path.display(), err),
    ))
}
