//! FAQ knowledge base backed by a JSON file.
//!
//! Readers take a lock-free snapshot; `replace` persists a new document and swaps the
//! snapshot in one step, so a lookup never sees a half-written knowledge base.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Answer given when no entry matches in local lookup mode.
pub const NO_ANSWER: &str = "Sorry, I couldn't find an answer to your question.";

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeBaseError {
    #[error("failed to read knowledge base {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write knowledge base {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("knowledge base {path} is not valid JSON")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode knowledge base: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

/// On-disk document: `{"faqs": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBaseFile {
    pub faqs: Vec<FaqEntry>,
}

#[derive(Debug)]
pub struct KnowledgeBase {
    path: PathBuf,
    entries: ArcSwap<Vec<FaqEntry>>,
    // Held across write, rename and swap so the file on disk always matches `entries`.
    write_lock: tokio::sync::Mutex<()>,
}

impl KnowledgeBase {
    /// Read the knowledge base from `path`. Used at startup; errors are fatal there.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, KnowledgeBaseError> {
        let path = path.into();
        let raw = std::fs::read(&path)
            .map_err(|source| KnowledgeBaseError::Read { path: path.clone(), source })?;
        let file: KnowledgeBaseFile = serde_json::from_slice(&raw)
            .map_err(|source| KnowledgeBaseError::Decode { path: path.clone(), source })?;
        tracing::info!(path = %path.display(), entries = file.faqs.len(), "knowledge base loaded");
        Ok(Self::from_entries(path, file.faqs))
    }

    /// Build an in-memory knowledge base that persists to `path` on replace.
    pub fn from_entries(path: impl Into<PathBuf>, entries: Vec<FaqEntry>) -> Self {
        Self {
            path: path.into(),
            entries: ArcSwap::from_pointee(entries),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Case-insensitive exact match on the question text.
    pub fn lookup(&self, question: &str) -> Option<String> {
        let wanted = question.to_lowercase();
        self.entries
            .load()
            .iter()
            .find(|entry| entry.question.to_lowercase() == wanted)
            .map(|entry| entry.answer.clone())
    }

    pub fn entries(&self) -> Arc<Vec<FaqEntry>> {
        self.entries.load_full()
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    /// Persist `file` and make it the live knowledge base.
    ///
    /// Writes a sibling temp file and renames it over the original. The in-memory
    /// snapshot is only swapped once the rename succeeded. Concurrent replaces run
    /// one at a time; the last one to finish wins both on disk and in memory.
    pub async fn replace(&self, file: KnowledgeBaseFile) -> Result<(), KnowledgeBaseError> {
        let bytes = serde_json::to_vec_pretty(&file).map_err(KnowledgeBaseError::Encode)?;
        let write_err = |source| KnowledgeBaseError::Write { path: self.path.clone(), source };

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(write_err)?;

        let count = file.faqs.len();
        self.entries.store(Arc::new(file.faqs));
        tracing::info!(path = %self.path.display(), entries = count, "knowledge base replaced");
        Ok(())
    }
}
