//! Read-only word list loaded once at startup.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DictionaryError {
  #[error("cannot read word list '{path}': {source}")]
  Read { path: String, source: std::io::Error },
  #[error("cannot parse word list '{path}': {source}")]
  Parse { path: String, source: serde_json::Error },
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dictionary {
  #[serde(default)] word_to_definition: HashMap<String, String>,
  #[serde(default)] meaning_to_word: HashMap<String, String>,
}

impl Dictionary {
  pub fn new(word_to_definition: HashMap<String, String>, meaning_to_word: HashMap<String, String>) -> Self {
    Self { word_to_definition, meaning_to_word }
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
    let path = path.as_ref();
    let shown = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|source| DictionaryError::Read { path: shown.clone(), source })?;
    let dict: Self = serde_json::from_slice(&bytes).map_err(|source| DictionaryError::Parse { path: shown.clone(), source })?;
    info!(
      target: "autoword_backend",
      path = %shown,
      words = dict.word_to_definition.len(),
      meanings = dict.meaning_to_word.len(),
      "Word list loaded"
    );
    Ok(dict)
  }

  /// Full definition text for an English headword.
  pub fn find_definition_by_word(&self, word: &str) -> Option<&str> {
    self.word_to_definition.get(word).map(String::as_str)
  }

  /// English word for a Chinese meaning.
  pub fn find_word_by_meaning(&self, meaning: &str) -> Option<&str> {
    self.meaning_to_word.get(meaning).map(String::as_str)
  }
}
