//! Post-submission learning: harvest the graded paper into the answer bank.
//!
//! Runs detached from the request. Its outcome only reaches the logs (target `learn`);
//! the join handle is returned so tests can await it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};

use crate::answer_bank::{AnswerBank, StoreError};
use crate::fingerprint::fingerprint;
use crate::quiz_api::{ApiError, PaperSource};

#[derive(Debug, Error)]
pub enum LearnError {
  #[error("fetching paper detail failed: {0}")]
  Fetch(#[from] ApiError),
  #[error("saving to answer bank failed: {0}")]
  Store(#[from] StoreError),
}

pub fn spawn_learning(
  source: Arc<dyn PaperSource>,
  bank: Arc<AnswerBank>,
  token: String,
  paper_id: String,
  settle: Duration,
) -> JoinHandle<Result<usize, LearnError>> {
  let span = tracing::info_span!(target: "learn", "learn", %paper_id);
  tokio::spawn(
    async move {
      info!(target: "learn", ?settle, "Learning task started");
      let result = learn(source.as_ref(), &bank, &token, &paper_id, settle).await;
      match &result {
        Ok(added) => info!(target: "learn", added, "Learning task finished"),
        Err(LearnError::Fetch(e)) if e.is_timeout() => {
          error!(target: "learn", error = %e, "Fatal: paper detail fetch timed out; learning aborted")
        }
        Err(e) => error!(target: "learn", error = %e, "Fatal: learning aborted"),
      }
      result
    }
    .instrument(span),
  )
}

async fn learn(
  source: &dyn PaperSource,
  bank: &AnswerBank,
  token: &str,
  paper_id: &str,
  settle: Duration,
) -> Result<usize, LearnError> {
  tokio::time::sleep(settle).await;

  let detail = source.fetch_paper_detail(token, paper_id).await?;
  let harvested: HashMap<String, String> = detail
    .list
    .iter()
    .filter(|item| !item.answer.trim().is_empty())
    .map(|item| (fingerprint(&item.question()), item.answer.trim().to_string()))
    .collect();
  info!(target: "learn", items = detail.list.len(), harvested = harvested.len(), mark = detail.mark, "Graded paper fetched");

  Ok(bank.save(harvested).await?)
}
