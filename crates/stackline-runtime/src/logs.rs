//! Log events written by simulated containers.
//!
//! Events are grouped by sink and stream. A stream is named
//! `<prefix>/<container>/<task id>`, so each task instance writes to its
//! own streams.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stackline_common::error::{Result, StacklineError};

/// One log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// When the event was written.
    pub timestamp: DateTime<Utc>,
    /// Log line.
    pub message: String,
}

/// Log events keyed by sink, then stream.
#[derive(Debug, Clone, Default)]
pub struct LogStore {
    sinks: BTreeMap<String, BTreeMap<String, Vec<LogEvent>>>,
}

/// Stream name for `container` of task `task_id`.
#[must_use]
pub fn stream_name(prefix: &str, container: &str, task_id: &str) -> String {
    format!("{prefix}/{container}/{task_id}")
}

impl LogStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line to `stream` of `sink`.
    pub fn append(&mut self, sink: &str, stream: &str, message: impl Into<String>) {
        self.sinks
            .entry(sink.to_string())
            .or_default()
            .entry(stream.to_string())
            .or_default()
            .push(LogEvent {
                timestamp: Utc::now(),
                message: message.into(),
            });
    }

    /// Lines of one stream, oldest first.
    ///
    /// Returns an empty list for unknown streams.
    #[must_use]
    pub fn read(&self, sink: &str, stream: &str) -> Vec<&str> {
        self.sinks
            .get(sink)
            .and_then(|streams| streams.get(stream))
            .map(|events| events.iter().map(|e| e.message.as_str()).collect())
            .unwrap_or_default()
    }

    /// Stream names of `sink`, sorted.
    #[must_use]
    pub fn streams(&self, sink: &str) -> Vec<&str> {
        self.sinks
            .get(sink)
            .map(|streams| streams.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Sink names, sorted.
    #[must_use]
    pub fn sinks(&self) -> Vec<&str> {
        self.sinks.keys().map(String::as_str).collect()
    }

    /// Writes every stream to `<dir>/logs/<sink>/<stream>.log`.
    ///
    /// Path separators inside sink and stream names become nested
    /// directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory or file cannot be created or written.
    pub fn export(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (sink, streams) in &self.sinks {
            for (stream, events) in streams {
                let path = log_path(dir, sink, stream);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| StacklineError::Io {
                        path: parent.to_path_buf(),
                        source: e,
                    })?;
                }
                let mut file = std::fs::File::create(&path).map_err(|e| StacklineError::Io {
                    path: path.clone(),
                    source: e,
                })?;
                for event in events {
                    writeln!(file, "{} {}", event.timestamp.to_rfc3339(), event.message).map_err(
                        |e| StacklineError::Io {
                            path: path.clone(),
                            source: e,
                        },
                    )?;
                }
                written.push(path);
            }
        }
        Ok(written)
    }
}

/// Returns the export path of a stream.
///
/// Empty, `.` and `..` segments are dropped so the path stays under
/// `<dir>/logs`.
#[must_use]
pub fn log_path(dir: &Path, sink: &str, stream: &str) -> PathBuf {
    let mut path = dir.join("logs");
    for part in sink
        .split('/')
        .chain(stream.split('/'))
        .filter(|p| !matches!(*p, "" | "." | ".."))
    {
        path.push(part);
    }
    let _ = path.set_extension("log");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_nests_sink_and_stream() {
        let p = log_path(
            Path::new("/tmp/out"),
            "/ecs/ecs-init",
            "FlaskInit/InitContainer/abc",
        );
        assert_eq!(
            p.to_str().unwrap(),
            "/tmp/out/logs/ecs/ecs-init/FlaskInit/InitContainer/abc.log"
        );
    }

    #[test]
    fn log_path_ignores_parent_segments() {
        let p = log_path(Path::new("/tmp/out"), "../../etc", "FlaskApp/../x/./Container/abc");
        assert_eq!(p.to_str().unwrap(), "/tmp/out/logs/etc/FlaskApp/x/Container/abc.log");
        assert!(p.starts_with("/tmp/out/logs"));
    }

    #[test]
    fn read_unknown_stream_returns_empty() {
        let store = LogStore::new();
        assert!(store.read("sink", "stream").is_empty());
        assert!(store.streams("sink").is_empty());
    }

    #[test]
    fn append_and_read_in_order() {
        let mut store = LogStore::new();
        store.append("app", "s1", "line one");
        store.append("app", "s1", "line two");
        assert_eq!(store.read("app", "s1"), vec!["line one", "line two"]);
    }

    #[test]
    fn streams_are_separate() {
        let mut store = LogStore::new();
        store.append("app", "a", "from a");
        store.append("app", "b", "from b");
        assert_eq!(store.read("app", "a"), vec!["from a"]);
        assert_eq!(store.streams("app"), vec!["a", "b"]);
        assert_eq!(store.sinks(), vec!["app"]);
    }

    #[test]
    fn export_writes_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = LogStore::new();
        store.append("/ecs/app", &stream_name("FlaskApp", "main", "t1"), "started");
        let written = store.export(dir.path()).expect("export");
        assert_eq!(written.len(), 1);
        let content = std::fs::read_to_string(&written[0]).expect("read");
        assert!(content.contains("started"));
        assert!(written[0].starts_with(dir.path().join("logs")));
    }

    #[test]
    fn export_stays_under_logs_dir() {
        let mut store = LogStore::new();
        store.append("../escape", "../../Container/abc", "started");
        let dir = tempfile::tempdir().expect("tempdir");
        let written = store.export(dir.path()).expect("export");
        assert_eq!(written.len(), 1);
        assert!(written[0].starts_with(dir.path().join("logs")), "got: {:?}", written[0]);
        assert!(written[0].exists());
    }
}
