//! Append-only deployment log.
//!
//! One line per deployment: `<rfc3339 timestamp>,<subdomain>,<status>`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::RunnerResult;

/// Outcome recorded for a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeployStatus {
    Deployed,
    Failed(String),
}

impl std::fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deployed => write!(f, "deployed"),
            Self::Failed(reason) => write!(f, "failed: {}", reason.replace(['\n', '\r'], " ")),
        }
    }
}

impl DeployStatus {
    fn parse(raw: &str) -> Self {
        match raw.strip_prefix("failed: ") {
            Some(reason) => Self::Failed(reason.to_string()),
            None => Self::Deployed,
        }
    }
}

/// A parsed log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployLogEntry {
    pub timestamp: DateTime<Utc>,
    pub subdomain: String,
    pub status: DeployStatus,
}

/// Writer and reader for the deployment log file.
#[derive(Debug)]
pub struct DeploymentLog {
    path: PathBuf,
    // serializes appends from concurrent sessions
    write_lock: Mutex<()>,
}

impl DeploymentLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, subdomain: &str, status: &DeployStatus) -> RunnerResult<()> {
        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(file, "{},{},{}", Utc::now().to_rfc3339(), subdomain, status)?;
        Ok(())
    }

    /// Read all entries, skipping lines that do not parse.
    pub fn read_entries(&self) -> RunnerResult<Vec<DeployLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let mut parts = line.splitn(3, ',');
            let (Some(ts), Some(subdomain), Some(status)) = (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            let Ok(timestamp) = DateTime::parse_from_rfc3339(ts) else {
                continue;
            };
            entries.push(DeployLogEntry {
                timestamp: timestamp.with_timezone(&Utc),
                subdomain: subdomain.to_string(),
                status: DeployStatus::parse(status),
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_read() {
        let temp = TempDir::new().unwrap();
        let log = DeploymentLog::new(temp.path().join("logs").join("deployments.log"));

        log.append("space-game", &DeployStatus::Deployed).unwrap();
        log.append("broken", &DeployStatus::Failed("reload exited with 1\nstderr".into()))
            .unwrap();

        let raw = fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.lines().next().unwrap().ends_with(",space-game,deployed"));

        let entries = log.read_entries().unwrap();
        assert_eq!(entries[0].subdomain, "space-game");
        assert_eq!(entries[0].status, DeployStatus::Deployed);
        assert_eq!(
            entries[1].status,
            DeployStatus::Failed("reload exited with 1 stderr".into())
        );
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let temp = TempDir::new().unwrap();
        let log = DeploymentLog::new(temp.path().join("none.log"));
        assert!(log.read_entries().unwrap().is_empty());
    }
}
