//! Per-session log files.
//!
//! Directory structure:
//! ```text
//! <logs>/<chatId>/
//!   0-design.json      # {stage, input, output, timestamp}
//!   1-code.json
//!   session.json       # final session state, written on close
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::StageRecord;
use crate::error::{SessionError, SessionResult};
use crate::session::GenerationSession;

/// Persisted prompt/response pair of one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLog {
    pub stage: String,
    pub input: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
}

/// Writes stage logs and session archives under a root directory.
#[derive(Debug, Clone)]
pub struct StageLogWriter {
    root: PathBuf,
}

impl StageLogWriter {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, chat_id: &str) -> PathBuf {
        self.root.join(chat_id)
    }

    pub fn write_stage(&self, chat_id: &str, record: &StageRecord) -> SessionResult<PathBuf> {
        let dir = self.session_dir(chat_id);
        fs::create_dir_all(&dir)?;

        let log = StageLog {
            stage: record.stage.clone(),
            input: record.input.render(),
            output: record.output.clone(),
            timestamp: Utc::now(),
        };
        let path = dir.join(format!("{}-{}.json", record.index, record.stage));
        fs::write(&path, serde_json::to_string_pretty(&log)?)?;
        Ok(path)
    }

    /// Stage logs of a session in chain order.
    pub fn read_stages(&self, chat_id: &str) -> SessionResult<Vec<StageLog>> {
        let dir = self.session_dir(chat_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files: Vec<(usize, PathBuf)> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter_map(|path| {
                let stem = path.file_stem()?.to_str()?.to_string();
                let (index, _) = stem.split_once('-')?;
                Some((index.parse().ok()?, path))
            })
            .collect();
        files.sort_by_key(|(index, _)| *index);

        files
            .into_iter()
            .map(|(_, path)| Ok(serde_json::from_str(&fs::read_to_string(path)?)?))
            .collect()
    }

    pub fn archive_session(&self, session: &GenerationSession) -> SessionResult<PathBuf> {
        let dir = self.session_dir(&session.chat_id);
        fs::create_dir_all(&dir)?;
        let path = dir.join("session.json");
        fs::write(&path, serde_json::to_string_pretty(session)?)?;
        Ok(path)
    }

    pub fn load_session(&self, chat_id: &str) -> SessionResult<GenerationSession> {
        let path = self.session_dir(chat_id).join("session.json");
        if !path.exists() {
            return Err(SessionError::NotFound(chat_id.to_string()));
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}
