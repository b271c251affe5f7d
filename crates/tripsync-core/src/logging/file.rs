//! Append-only JSONL file per client.
//!
//! Files are named `{date}_{client}.jsonl` inside the logs directory. Each
//! client owns its file, so several clients on one machine never interleave
//! partial lines.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::warn;

use super::record::LogRecord;

/// Writer for one client's log file
pub struct ClientLogFile {
    client: String,
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl ClientLogFile {
    /// Open (or create) today's file for `client` under `logs_dir`.
    pub fn open(logs_dir: impl AsRef<Path>, client: impl Into<String>) -> std::io::Result<Self> {
        let client = client.into();
        let logs_dir = logs_dir.as_ref();
        fs::create_dir_all(logs_dir)?;

        let date = chrono::Local::now().format("%Y-%m-%d");
        let path = logs_dir.join(format!("{}_{}.jsonl", date, client));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            client,
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it.
    pub fn append(&self, record: &LogRecord) -> std::io::Result<()> {
        let line = record
            .to_json_line()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.writer.lock().flush()
    }
}

impl Drop for ClientLogFile {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Read every client's records from `logs_dir`, oldest first.
///
/// Lines that do not parse are skipped.
pub fn read_records(logs_dir: impl AsRef<Path>) -> std::io::Result<Vec<LogRecord>> {
    let logs_dir = logs_dir.as_ref();
    if !logs_dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(logs_dir)? {
        let path = entry?.path();
        if path.extension().map_or(true, |ext| ext != "jsonl") {
            continue;
        }
        for line in fs::read_to_string(&path)?.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match LogRecord::from_json_line(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(file = %path.display(), error = %e, "Unreadable log line"),
            }
        }
    }

    records.sort_by(|a, b| a.ts.cmp(&b.ts));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_directory() {
        let temp = TempDir::new().unwrap();
        let logs_dir = temp.path().join("nested/logs");

        let file = ClientLogFile::open(&logs_dir, "alice").unwrap();
        assert!(file.path().exists());
        assert!(file.path().to_string_lossy().ends_with("_alice.jsonl"));
    }

    #[test]
    fn test_records_from_two_clients_merge() {
        let temp = TempDir::new().unwrap();
        let alice = ClientLogFile::open(temp.path(), "alice").unwrap();
        let bob = ClientLogFile::open(temp.path(), "bob").unwrap();

        alice
            .append(&LogRecord::new("info", "alice", "t", "voted"))
            .unwrap();
        bob.append(&LogRecord::new("info", "bob", "t", "voted"))
            .unwrap();
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let records = read_records(temp.path()).unwrap();
        assert_eq!(records.len(), 2);
        let clients: Vec<_> = records.iter().map(|r| r.client.as_str()).collect();
        assert!(clients.contains(&"alice"));
        assert!(clients.contains(&"bob"));
    }
}
