//! Snapshot storage
//!
//! A snapshot is the JSON array of data sources exactly as they were read,
//! written to `<dir>/<8 hex chars>_<YYYY-MM-DD>.json` before anything is
//! deleted.

use crate::datasource::DataSource;
use crate::error::{Error, Result};
use chrono::{Local, NaiveDate};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

/// Default snapshot directory, relative to the working directory
pub const DEFAULT_BACKUP_DIR: &str = "temp";

/// Fresh names to try before giving up on a collision
const MAX_NAME_ATTEMPTS: usize = 5;

/// A snapshot file found in the backup directory
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub path: PathBuf,
    pub file_name: String,
    pub modified: Option<SystemTime>,
    pub size: u64,
}

/// Directory of snapshot files
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `data_sources` to a new snapshot file and flush it to disk.
    ///
    /// Never overwrites: the file is opened with `create_new`, and a name
    /// collision just draws another random token.
    pub fn snapshot(&self, data_sources: &[DataSource]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_vec(data_sources)?;
        let today = Local::now().date_naive();

        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(snapshot_file_name(today));

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!("Snapshot name {:?} taken, retrying", path);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            file.write_all(&content)?;
            file.sync_all()?;
            sync_dir(&self.dir)?;

            tracing::info!("Backed up {} data source(s) to {:?}", data_sources.len(), path);
            return Ok(path);
        }

        Err(Error::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free snapshot name in {:?}", self.dir),
        )))
    }

    /// Read a snapshot back
    pub fn load(&self, path: &Path) -> Result<Vec<DataSource>> {
        let content = fs::read_to_string(path)?;
        let data_sources: Vec<DataSource> = serde_json::from_str(&content)?;
        tracing::info!("Loaded {} data source(s) from {:?}", data_sources.len(), path);
        Ok(data_sources)
    }

    /// A bare file name refers to the backup directory; anything with a
    /// directory component is taken as a path.
    pub fn resolve(&self, name: &str) -> PathBuf {
        let name = name.trim();
        let candidate = Path::new(name);
        if candidate.components().count() > 1 || candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.dir.join(candidate)
        }
    }

    /// Snapshot files in the backup directory, newest first
    pub fn list(&self) -> Result<Vec<SnapshotInfo>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            snapshots.push(SnapshotInfo {
                file_name: entry.file_name().to_string_lossy().into_owned(),
                path,
                modified: metadata.modified().ok(),
                size: metadata.len(),
            });
        }

        snapshots.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.file_name.cmp(&a.file_name))
        });
        Ok(snapshots)
    }
}

impl Default for BackupStore {
    fn default() -> Self {
        Self::new(DEFAULT_BACKUP_DIR)
    }
}

/// Flush the directory entry so a crash cannot lose a freshly created file
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

fn snapshot_file_name(date: NaiveDate) -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("{}_{}.json", &token[..8], date.format("%Y-%m-%d"))
}
