//! Append-only record of answered questions.

use crate::config::AnswerModeKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// One answered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query: String,
    pub response: String,
    pub mode: AnswerModeKind,
    pub timestamp: DateTime<Utc>,
}

impl QueryRecord {
    pub fn now(query: impl Into<String>, response: impl Into<String>, mode: AnswerModeKind) -> Self {
        Self { query: query.into(), response: response.into(), mode, timestamp: Utc::now() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueryLogError {
    #[error("query log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode query record: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("query log line {line} is malformed: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Sink for query records. Shared by every request handler.
#[async_trait]
pub trait QueryLog: Send + Sync + std::fmt::Debug {
    async fn append(&self, record: QueryRecord) -> Result<(), QueryLogError>;

    /// All retained records, oldest first.
    async fn records(&self) -> Result<Vec<QueryRecord>, QueryLogError>;
}

/// Best-effort append: failures are logged and swallowed.
pub async fn append_best_effort(log: &dyn QueryLog, record: QueryRecord) {
    if let Err(error) = log.append(record).await {
        tracing::error!(%error, "failed to append query record");
    }
}

/// A query log that keeps the most recent records in memory.
#[derive(Debug, Clone)]
pub struct MemoryQueryLog {
    records: Arc<Mutex<VecDeque<QueryRecord>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemoryQueryLog {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of records dropped to stay within capacity.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<QueryRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryQueryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryLog for MemoryQueryLog {
    async fn append(&self, record: QueryRecord) -> Result<(), QueryLogError> {
        let mut records = self.lock();
        if records.len() >= self.capacity {
            records.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        records.push_back(record);
        Ok(())
    }

    async fn records(&self) -> Result<Vec<QueryRecord>, QueryLogError> {
        Ok(self.lock().iter().cloned().collect())
    }
}

/// A query log that appends one JSON object per line to a file.
///
/// Always writes; bring your own path.
#[derive(Debug, Clone)]
pub struct JsonlQueryLog {
    path: PathBuf,
    // Serializes appends so concurrent lines never interleave.
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl JsonlQueryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Arc::new(tokio::sync::Mutex::new(())) }
    }
}

#[async_trait]
impl QueryLog for JsonlQueryLog {
    async fn append(&self, record: QueryRecord) -> Result<(), QueryLogError> {
        use tokio::io::AsyncWriteExt;

        let mut line = serde_json::to_string(&record).map_err(QueryLogError::Encode)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file =
            tokio::fs::OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn records(&self) -> Result<Vec<QueryRecord>, QueryLogError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line)
                    .map_err(|source| QueryLogError::Decode { line: idx + 1, source })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: usize) -> QueryRecord {
        QueryRecord::now(format!("q{}", n), format!("a{}", n), AnswerModeKind::Local)
    }

    #[tokio::test]
    async fn memory_log_evicts_oldest_beyond_capacity() {
        let log = MemoryQueryLog::with_capacity(2);
        for n in 0..3 {
            log.append(record(n)).await.unwrap();
        }

        let records = log.records().await.unwrap();
        let queries: Vec<_> = records.iter().map(|r| r.query.as_str()).collect();
        assert_eq!(queries, ["q1", "q2"]);
        assert_eq!(log.evicted(), 1);
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn jsonl_log_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlQueryLog::new(dir.path().join("logs").join("queries.jsonl"));
        assert!(log.records().await.unwrap().is_empty(), "missing file reads as empty");

        let first = QueryRecord::now("Hours?", "9 to 5.", AnswerModeKind::Local);
        let second = QueryRecord::now("Refunds?", "Within 30 days.", AnswerModeKind::Remote);
        log.append(first.clone()).await.unwrap();
        log.append(second.clone()).await.unwrap();

        assert_eq!(log.records().await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn jsonl_log_reports_malformed_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.jsonl");
        let log = JsonlQueryLog::new(&path);
        log.append(record(0)).await.unwrap();
        tokio::fs::write(
            &path,
            format!("{}\nnot json\n", tokio::fs::read_to_string(&path).await.unwrap().trim_end()),
        )
        .await
        .unwrap();

        match log.records().await {
            Err(QueryLogError::Decode { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn concurrent_appends_keep_lines_whole() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(JsonlQueryLog::new(dir.path().join("queries.jsonl")));

        let handles: Vec<_> = (0..32)
            .map(|n| {
                let log = log.clone();
                tokio::spawn(async move { log.append(record(n)).await })
            })
            .collect();
        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        assert_eq!(log.records().await.unwrap().len(), 32);
    }

    #[test]
    fn record_serializes_mode_in_lowercase() {
        let json = serde_json::to_value(record(7)).unwrap();
        assert_eq!(json["mode"], "local");
        assert_eq!(json["query"], "q7");
    }
}
