//! File-backed answer bank: fingerprint → official answer letter.
//!
//! Lookups take the read lock. `save` holds the write lock across merge and persist,
//! so concurrent learners cannot lose each other's entries. Entries are never
//! overwritten or removed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("failed to read answer bank {path}: {source}")]
  Read { path: PathBuf, source: std::io::Error },
  #[error("failed to write answer bank {path}: {source}")]
  Write { path: PathBuf, source: std::io::Error },
  #[error("answer bank {path} is not valid JSON: {source}")]
  Decode { path: PathBuf, source: serde_json::Error },
  #[error("failed to serialize answer bank: {0}")]
  Encode(#[from] serde_json::Error),
}

pub struct AnswerBank {
  path: PathBuf,
  bank: RwLock<HashMap<String, String>>,
}

impl AnswerBank {
  /// Open the bank at `path`, creating an empty file if none exists.
  #[instrument(level = "info", skip_all)]
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
    let path = path.as_ref().to_path_buf();
    let (bank, existed) = match tokio::fs::read(&path).await {
      Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => (HashMap::new(), true),
      Ok(bytes) => {
        let map = serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode { path: path.clone(), source })?;
        (map, true)
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => (HashMap::new(), false),
      Err(source) => return Err(StoreError::Read { path, source }),
    };

    let store = Self { path, bank: RwLock::new(bank) };
    if !existed {
      info!(target: "answer_bank", "Answer bank file missing; creating an empty one");
      let bank = store.bank.read().await;
      store.persist(&bank).await?;
    }
    info!(target: "answer_bank", entries = store.len().await, path = %store.path.display(), "Answer bank loaded");
    Ok(store)
  }

  pub async fn query(&self, fingerprint: &str) -> Option<String> {
    self.bank.read().await.get(fingerprint).cloned()
  }

  pub async fn len(&self) -> usize {
    self.bank.read().await.len()
  }

  /// Insert entries whose fingerprint is not yet known; existing answers win.
  /// Returns how many were added. Nothing is written when that is zero.
  #[instrument(level = "debug", skip_all, fields(offered = new_answers.len()))]
  pub async fn save(&self, new_answers: HashMap<String, String>) -> Result<usize, StoreError> {
    let mut bank = self.bank.write().await;
    let fresh: HashMap<String, String> = new_answers
      .into_iter()
      .filter(|(fingerprint, _)| !bank.contains_key(fingerprint))
      .collect();

    if fresh.is_empty() {
      debug!(target: "answer_bank", "No new answers to learn");
      return Ok(0);
    }

    // Memory only changes once the merged map is on disk.
    let added = fresh.len();
    let mut merged = bank.clone();
    merged.extend(fresh);
    info!(target: "answer_bank", added, "Persisting new answers");
    self.persist(&merged).await?;
    *bank = merged;
    Ok(added)
  }

  async fn persist(&self, bank: &HashMap<String, String>) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(bank)?;
    tokio::fs::write(&self.path, bytes)
      .await
      .map_err(|source| StoreError::Write { path: self.path.clone(), source })?;
    info!(target: "answer_bank", entries = bank.len(), path = %self.path.display(), "Answer bank persisted");
    Ok(())
  }
}
