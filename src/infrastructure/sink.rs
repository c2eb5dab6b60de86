//! Result sink: the three append-only text artifacts of a run.
//!
//! `log.txt` is the operational log, `failed.txt` holds one line per
//! detected problem, and `results.txt` receives the final grouped summary.
//! All three are truncated when the sink is created at run start.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::error;

/// Append-only writers for the run artifacts.
pub struct ResultSink {
    log: Mutex<File>,
    failed: Mutex<File>,
    results: Mutex<File>,
    dir: PathBuf,
}

impl ResultSink {
    /// Create the output directory if needed and truncate the artifacts.
    pub async fn create(dir: &Path) -> io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        Ok(Self {
            log: Mutex::new(open_truncated(&dir.join("log.txt")).await?),
            failed: Mutex::new(open_truncated(&dir.join("failed.txt")).await?),
            results: Mutex::new(open_truncated(&dir.join("results.txt")).await?),
            dir: dir.to_path_buf(),
        })
    }

    /// Directory the artifacts live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one line to the operational log.
    pub async fn log(&self, message: impl AsRef<str>) {
        append(&self.log, message.as_ref()).await;
    }

    /// Append one line describing a detected problem.
    pub async fn failed(&self, message: impl AsRef<str>) {
        append(&self.failed, message.as_ref()).await;
    }

    /// Append to the structured results artifact.
    pub async fn results(&self, message: impl AsRef<str>) {
        append(&self.results, message.as_ref()).await;
    }
}

async fn open_truncated(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await
}

async fn append(file: &Mutex<File>, message: &str) {
    let mut file = file.lock().await;
    if let Err(err) = file.write_all(format!("{message}\n").as_bytes()).await {
        error!(%err, "failed to append to run artifact");
    }
}
