//! The `log.*` publish-logging hook (§6.3).
//!
//! When enabled, every publish whose event begins with `log.` is appended
//! to a per-event file under a session directory stamped with the broker's
//! start time. `get_logs` serves those files back through the cellaserv
//! introspection method, glob-matching file names within the session
//! directory only.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use globset::Glob;
use parking_lot::Mutex;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{BrokerError, ReplyErrorType};

pub struct PublishLog {
    session_dir: PathBuf,
    files: DashMap<String, Mutex<std::fs::File>>,
}

impl PublishLog {
    /// Creates `root/<rfc3339 timestamp>/` and returns a handle rooted
    /// there. Colons in the timestamp are replaced with `-` so the
    /// directory name is valid on filesystems that reject them.
    pub fn init(root: &Path) -> Result<Arc<Self>, BrokerError> {
        let stamp = OffsetDateTime::now_utc().format(&Rfc3339)?.replace(':', "-");
        let session_dir = root.join(stamp);
        std::fs::create_dir_all(&session_dir).map_err(|source| BrokerError::LogDir {
            path: session_dir.clone(),
            source,
        })?;
        Ok(Arc::new(Self {
            session_dir,
            files: DashMap::new(),
        }))
    }

    /// Appends `data` to the file for `event`'s `log.` suffix, opening it on
    /// first observation. A no-op for events not prefixed `log.`.
    pub fn record(&self, event: &str, data: &[u8]) {
        let Some(suffix) = event.strip_prefix("log.") else {
            return;
        };
        if data.contains(&b'\n') {
            tracing::warn!(event, "publish payload contains an embedded newline");
        }

        if !self.files.contains_key(suffix) {
            let path = self.session_dir.join(suffix);
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    self.files.insert(suffix.to_owned(), Mutex::new(file));
                }
                Err(err) => {
                    tracing::error!(event, path = %path.display(), error = %err, "failed to open publish log file");
                    return;
                }
            }
        }

        if let Some(entry) = self.files.get(suffix) {
            let mut file = entry.lock();
            let result = file.write_all(data).and_then(|()| file.write_all(b"\n"));
            if let Err(err) = result {
                tracing::error!(event, error = %err, "failed to append publish log entry");
            }
        }
    }

    /// Resolves `pattern` against the session directory, rejecting any
    /// resolution that escapes it, then globs file names within the
    /// (necessarily flat) resulting directory.
    pub fn get_logs(&self, pattern: &str) -> Result<BTreeMap<String, Vec<u8>>, ReplyErrorType> {
        let resolved = self.resolve_within_root(pattern)?;
        let file_pattern = resolved
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(pattern);
        let glob = Glob::new(file_pattern)
            .map_err(|err| ReplyErrorType::Custom(format!("invalid get_logs pattern: {err}")))?
            .compile_matcher();

        let dir = resolved.parent().unwrap_or(&self.session_dir);
        let entries = std::fs::read_dir(dir)
            .map_err(|err| ReplyErrorType::Custom(format!("failed to read log directory: {err}")))?;

        let mut out = BTreeMap::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name_str) = name.to_str() else {
                continue;
            };
            if !glob.is_match(name_str) {
                continue;
            }
            match std::fs::read(entry.path()) {
                Ok(contents) => {
                    out.insert(name_str.to_owned(), contents);
                }
                Err(err) => {
                    tracing::warn!(file = name_str, error = %err, "failed to read log file for get_logs");
                }
            }
        }
        Ok(out)
    }

    fn resolve_within_root(&self, pattern: &str) -> Result<PathBuf, ReplyErrorType> {
        let joined = self.session_dir.join(pattern);
        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(ReplyErrorType::Custom("pattern escapes log root".into()));
                    }
                }
                Component::CurDir => {}
                other => normalized.push(other),
            }
        }
        if !normalized.starts_with(&self.session_dir) {
            return Err(ReplyErrorType::Custom("pattern escapes log root".into()));
        }
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_reads_back_a_log_line() {
        let tmp = tempfile::tempdir().unwrap();
        let log = PublishLog::init(tmp.path()).unwrap();
        log.record("log.cellaserv.new-service", b"hello");

        let logs = log.get_logs("cellaserv.new-service").unwrap();
        assert_eq!(logs.get("cellaserv.new-service").unwrap(), b"hello\n");
    }

    #[test]
    fn non_log_prefixed_events_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let log = PublishLog::init(tmp.path()).unwrap();
        log.record("test", b"hello");
        assert!(log.get_logs("*").unwrap().is_empty());
    }

    #[test]
    fn pattern_cannot_escape_session_root() {
        let tmp = tempfile::tempdir().unwrap();
        let log = PublishLog::init(tmp.path()).unwrap();
        let err = log.get_logs("../../../etc/passwd").unwrap_err();
        assert!(matches!(err, ReplyErrorType::Custom(_)));
    }

    #[test]
    fn glob_pattern_matches_multiple_files() {
        let tmp = tempfile::tempdir().unwrap();
        let log = PublishLog::init(tmp.path()).unwrap();
        log.record("log.a", b"1");
        log.record("log.b", b"2");
        let logs = log.get_logs("*").unwrap();
        assert_eq!(logs.len(), 2);
    }
}
