/// Player progress: completed levels and a local top-10 per level.
///
/// ## File format (`progress.toml`):
///   ```toml
///   next_seq = 3
///   completed = ["first-bite"]
///
///   [[leaderboards.first-bite]]
///   name = "Player"
///   time_ms = 5120
///   steps = 14
///   seq = 2
///   ```
///
/// Results are ranked by time, then steps, then record order.
/// Mid-level state is never persisted; a level always starts fresh.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const PROGRESS_FILE: &str = "progress.toml";
const LOG_FILE: &str = "chain-drop.log";
pub const LEADERBOARD_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed progress file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot encode progress: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub name: String,
    pub time_ms: u64,
    pub steps: u32,
    /// Record order, the last tie-breaker.
    pub seq: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default)]
    next_seq: u64,
    #[serde(default)]
    completed: Vec<String>,
    #[serde(default)]
    leaderboards: BTreeMap<String, Vec<ScoreEntry>>,
}

// ══════════════════════════════════════════════════════════════
// Queries and updates
// ══════════════════════════════════════════════════════════════

impl Progress {
    pub fn is_completed(&self, key: &str) -> bool {
        self.completed.iter().any(|k| k == key)
    }

    pub fn mark_completed(&mut self, key: &str) {
        if !self.is_completed(key) {
            self.completed.push(key.to_string());
        }
    }

    pub fn leaderboard(&self, key: &str) -> &[ScoreEntry] {
        self.leaderboards.get(key).map_or(&[], |v| v.as_slice())
    }

    /// Record a finished attempt and mark the level completed.
    /// Returns the 0-based rank, or None if it missed the top 10.
    pub fn add_result(&mut self, key: &str, name: &str, time_ms: u64, steps: u32) -> Option<usize> {
        let seq = self.next_seq;
        self.next_seq += 1;

        let board = self.leaderboards.entry(key.to_string()).or_default();
        board.push(ScoreEntry { name: name.to_string(), time_ms, steps, seq });
        board.sort_by_key(|e| (e.time_ms, e.steps, e.seq));
        board.truncate(LEADERBOARD_SIZE);
        let rank = board.iter().position(|e| e.seq == seq);

        self.mark_completed(key);
        rank
    }
}

// ══════════════════════════════════════════════════════════════
// Persistence
// ══════════════════════════════════════════════════════════════

impl Progress {
    /// Missing file is an empty progress, not an error.
    pub fn load(path: &Path) -> Result<Self, ProgressError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Progress::default()),
            Err(source) => return Err(ProgressError::Io { path: path.to_path_buf(), source }),
        };
        Ok(toml::from_str(&text)?)
    }

    /// Load, or start over when the file is unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        Progress::load(path).unwrap_or_else(|e| {
            warn!("{}; starting with empty progress", e);
            Progress::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ProgressError> {
        let text = toml::to_string(self)?;
        std::fs::write(path, text)
            .map_err(|source| ProgressError::Io { path: path.to_path_buf(), source })
    }
}

/// Where progress lives when not configured: next to the executable if that
/// directory is writable, else the XDG data home, else the CWD.
pub fn default_path() -> PathBuf {
    data_dir().join(PROGRESS_FILE)
}

/// Log file, kept beside the default progress file.
pub fn log_path() -> PathBuf {
    data_dir().join(LOG_FILE)
}

fn data_dir() -> PathBuf {
    // 1. Exe directory (portable installs)
    if let Ok(exe) = std::env::current_exe() {
        let resolved = exe.canonicalize().unwrap_or(exe);
        if let Some(parent) = resolved.parent() {
            let probe = parent.join(".write_test_chain_drop");
            if std::fs::write(&probe, "").is_ok() {
                let _ = std::fs::remove_file(&probe);
                return parent.to_path_buf();
            }
        }
    }

    // 2. XDG data home for system installs
    if let Ok(home) = std::env::var("HOME") {
        let xdg = PathBuf::from(&home).join(".local/share/chain-drop");
        if std::fs::create_dir_all(&xdg).is_ok() {
            return xdg;
        }
    }

    // 3. CWD
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
