//! Session output directories and best-effort persistence.
//!
//! Everything written here is for external inspection only. Callers log and
//! swallow failures; the in-memory loop never depends on these files.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::agent::{Message, StatsCollector};
use crate::tools::ArtifactSink;
use crate::Result;

/// One line of the tool usage log.
#[derive(Debug, Clone, Serialize)]
pub struct ToolUsageEntry {
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub arguments: Value,
    pub success: bool,
    /// Seconds.
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Write-only sink for session state.
pub trait SessionRecorder: ArtifactSink {
    /// Overwrite the chat transcript.
    fn save_history(&self, messages: &[Message]) -> Result<()>;

    /// Append one tool invocation record.
    fn append_tool_usage(&self, entry: &ToolUsageEntry) -> Result<()>;

    /// Overwrite the stats snapshot.
    fn save_stats(&self, stats: &StatsCollector) -> Result<()>;
}

/// Recorder for sessions without persistence.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecorder;

impl ArtifactSink for NullRecorder {
    fn store(&self, _payload: &[u8], _source: &str, _context: Option<&Value>) -> String {
        String::new()
    }
}

impl SessionRecorder for NullRecorder {
    fn save_history(&self, _messages: &[Message]) -> Result<()> {
        Ok(())
    }

    fn append_tool_usage(&self, _entry: &ToolUsageEntry) -> Result<()> {
        Ok(())
    }

    fn save_stats(&self, _stats: &StatsCollector) -> Result<()> {
        Ok(())
    }
}

/// Per-session output directories.
#[derive(Debug, Clone)]
pub struct SessionDirs {
    pub session_id: String,
    pub root: PathBuf,
    pub chat: PathBuf,
    pub screenshot: PathBuf,
    pub tool_output: PathBuf,
    pub log: PathBuf,
}

impl SessionDirs {
    /// Create directories for a new timestamped session under `root`.
    pub fn create(root: &Path) -> Result<Self> {
        let session_id = format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"));
        Self::create_with_id(root, &session_id)
    }

    /// Create (or reuse) directories for a named session.
    pub fn create_with_id(root: &Path, session_id: &str) -> Result<Self> {
        let dirs = Self {
            session_id: session_id.to_string(),
            root: root.to_path_buf(),
            chat: root.join("chats").join(session_id),
            screenshot: root.join("screenshots").join(session_id),
            tool_output: root.join("tool_outputs").join(session_id),
            log: root.join("logs").join(session_id),
        };

        for dir in [&dirs.chat, &dirs.screenshot, &dirs.tool_output, &dirs.log] {
            std::fs::create_dir_all(dir)?;
            debug!("Created directory: {}", dir.display());
        }

        info!("Session directories ready: {}", dirs.session_id);
        Ok(dirs)
    }

    pub fn chat_history_path(&self) -> PathBuf {
        self.chat.join("chat_history.json")
    }

    pub fn stats_path(&self) -> PathBuf {
        self.chat.join("stats.json")
    }

    pub fn tool_usage_path(&self) -> PathBuf {
        self.tool_output.join("tool_usage.jsonl")
    }
}

/// File-backed recorder writing into [`SessionDirs`].
#[derive(Debug, Clone)]
pub struct FileSessionRecorder {
    dirs: SessionDirs,
}

impl FileSessionRecorder {
    pub fn new(dirs: SessionDirs) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &SessionDirs {
        &self.dirs
    }

    fn write_screenshot(&self, payload: &[u8], source: &str, context: Option<&Value>) -> Result<PathBuf> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S_%3f");
        let path = self
            .dirs
            .screenshot
            .join(format!("{}_screenshot_{}.png", source, timestamp));

        // Tools hand over base64 text; raw PNG bytes are accepted too.
        let bytes = match std::str::from_utf8(payload) {
            Ok(text) => STANDARD
                .decode(text.trim())
                .map_err(|e| crate::Error::Other(format!("Invalid screenshot data: {}", e)))?,
            Err(_) => payload.to_vec(),
        };
        std::fs::write(&path, bytes)?;
        info!("Saved screenshot: {}", path.display());

        if let Some(context) = context {
            let context_path = path.with_file_name(format!(
                "{}_screenshot_{}_context.json",
                source, timestamp
            ));
            std::fs::write(&context_path, serde_json::to_string_pretty(context)?)?;
            debug!("Saved screenshot context: {}", context_path.display());
        }

        Ok(path)
    }
}

impl ArtifactSink for FileSessionRecorder {
    fn store(&self, payload: &[u8], source: &str, context: Option<&Value>) -> String {
        match self.write_screenshot(payload, source, context) {
            Ok(path) => path.display().to_string(),
            Err(e) => {
                error!("Error saving screenshot: {}", e);
                String::new()
            }
        }
    }
}

impl SessionRecorder for FileSessionRecorder {
    fn save_history(&self, messages: &[Message]) -> Result<()> {
        let content = serde_json::to_string_pretty(messages)?;
        std::fs::write(self.dirs.chat_history_path(), content)?;
        debug!("Saved chat history ({} messages)", messages.len());
        Ok(())
    }

    fn append_tool_usage(&self, entry: &ToolUsageEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dirs.tool_usage_path())?;
        writeln!(file, "{}", serde_json::to_string(entry)?)?;
        Ok(())
    }

    fn save_stats(&self, stats: &StatsCollector) -> Result<()> {
        let content = serde_json::to_string_pretty(stats)?;
        std::fs::write(self.dirs.stats_path(), content)?;
        Ok(())
    }
}

/// Log-and-swallow wrapper used by every caller of a recorder.
pub(crate) fn best_effort(what: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!("Failed to persist {}: {}", what, e);
    }
}

/// Recorder that fails every write, for testing that failures stay local.
#[cfg(test)]
pub(crate) struct FailingRecorder;

#[cfg(test)]
impl ArtifactSink for FailingRecorder {
    fn store(&self, _payload: &[u8], _source: &str, _context: Option<&Value>) -> String {
        String::new()
    }
}

#[cfg(test)]
impl SessionRecorder for FailingRecorder {
    fn save_history(&self, _messages: &[Message]) -> Result<()> {
        Err(crate::Error::Other("disk full".into()))
    }

    fn append_tool_usage(&self, _entry: &ToolUsageEntry) -> Result<()> {
        Err(crate::Error::Other("disk full".into()))
    }

    fn save_stats(&self, _stats: &StatsCollector) -> Result<()> {
        Err(crate::Error::Other("disk full".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn recorder(tmp: &TempDir) -> FileSessionRecorder {
        FileSessionRecorder::new(SessionDirs::create_with_id(tmp.path(), "session_test").unwrap())
    }

    #[test]
    fn test_dirs_created() {
        let tmp = TempDir::new().unwrap();
        let dirs = SessionDirs::create(tmp.path()).unwrap();
        assert!(dirs.session_id.starts_with("session_"));
        assert!(dirs.chat.is_dir());
        assert!(dirs.screenshot.is_dir());
        assert!(dirs.tool_output.is_dir());
        assert!(dirs.log.is_dir());
    }

    #[test]
    fn test_history_overwritten() {
        let tmp = TempDir::new().unwrap();
        let rec = recorder(&tmp);

        rec.save_history(&[Message::user("one"), Message::assistant("two")]).unwrap();
        rec.save_history(&[Message::user("three")]).unwrap();

        let raw = std::fs::read_to_string(rec.dirs().chat_history_path()).unwrap();
        let saved: Vec<Message> = serde_json::from_str(&raw).unwrap();
        assert_eq!(saved, vec![Message::user("three")]);
    }

    #[test]
    fn test_tool_usage_appended() {
        let tmp = TempDir::new().unwrap();
        let rec = recorder(&tmp);
        for success in [true, false] {
            rec.append_tool_usage(&ToolUsageEntry {
                timestamp: Utc::now(),
                tool: "bash".into(),
                arguments: json!({"command": "ls"}),
                success,
                duration: 0.1,
                error: (!success).then(|| "boom".to_string()),
            })
            .unwrap();
        }

        let raw = std::fs::read_to_string(rec.dirs().tool_usage_path()).unwrap();
        let lines: Vec<Value> = raw.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["tool"], "bash");
        assert!(lines[0].get("error").is_none());
        assert_eq!(lines[1]["error"], "boom");
    }

    #[test]
    fn test_stats_saved() {
        let tmp = TempDir::new().unwrap();
        let rec = recorder(&tmp);
        let mut stats = StatsCollector::new();
        stats.record_other_error();
        rec.save_stats(&stats).unwrap();

        let raw = std::fs::read_to_string(rec.dirs().stats_path()).unwrap();
        let saved: StatsCollector = serde_json::from_str(&raw).unwrap();
        assert_eq!(saved.errors.other, 1);
    }

    #[test]
    fn test_screenshot_stored_with_context() {
        let tmp = TempDir::new().unwrap();
        let rec = recorder(&tmp);
        let payload = STANDARD.encode(b"\x89PNG fake");

        let location = rec.store(payload.as_bytes(), "bash", Some(&json!({"id": "t1"})));
        assert!(location.ends_with(".png"));
        assert_eq!(std::fs::read(&location).unwrap(), b"\x89PNG fake");
        let context = location.replace(".png", "_context.json");
        assert!(Path::new(&context).exists());
    }

    #[test]
    fn test_bad_screenshot_returns_empty_location() {
        let tmp = TempDir::new().unwrap();
        let rec = recorder(&tmp);
        assert_eq!(rec.store(b"not base64 !!", "bash", None), "");
    }
}
