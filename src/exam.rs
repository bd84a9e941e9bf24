//! One automated quiz run: fetch paper, resolve answers, pace, submit, then learn.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::answer_bank::AnswerBank;
use crate::config::ExamConfig;
use crate::domain::{AnswerInput, Question, SubmissionPayload};
use crate::learning::spawn_learning;
use crate::quiz_api::{ApiError, PaperSource};
use crate::resolver::{Resolution, Resolver};
use crate::scheduler::pace_submission;

/// Submission `type` the quiz API expects for every paper.
const SUBMISSION_KIND: &str = "0";

#[derive(Debug, Error)]
pub enum ExamError {
  #[error("request frequency is too fast, please try again later")]
  RateLimited,
  #[error("current week lookup failed: {0}")]
  WeekLookup(ApiError),
  #[error("quiz API reported week 0 or no week")]
  WeekMissing,
  #[error("fetching a new paper failed: {0}")]
  FetchPaper(ApiError),
  #[error("submitting the paper failed: {0}")]
  Submit(ApiError),
}

impl ExamError {
  /// Short context for the caller; the error text goes alongside as details.
  pub fn label(&self) -> &'static str {
    match self {
      ExamError::RateLimited => "Too many requests",
      ExamError::WeekLookup(_) | ExamError::WeekMissing => "Failed to detect the current week",
      ExamError::FetchPaper(_) => "Failed to fetch paper",
      ExamError::Submit(_) => "Failed to submit paper",
    }
  }
}

#[derive(Clone, Debug, Serialize)]
pub struct ExamOutcome {
  pub paper_id: String,
  pub week: u32,
  pub message: String,
  pub cache_hits: usize,
  pub dictionary_hits: usize,
  pub ai_solved: usize,
}

pub struct ExamService {
  source: Arc<dyn PaperSource>,
  resolver: Resolver,
  bank: Arc<AnswerBank>,
  cfg: ExamConfig,
}

impl ExamService {
  pub fn new(source: Arc<dyn PaperSource>, resolver: Resolver, bank: Arc<AnswerBank>, cfg: ExamConfig) -> Self {
    Self { source, resolver, bank, cfg }
  }

  pub async fn current_week(&self, token: &str) -> Result<u32, ExamError> {
    let info = self.source.fetch_current_week(token).await.map_err(ExamError::WeekLookup)?;
    if info.week == 0 {
      return Err(ExamError::WeekMissing);
    }
    Ok(info.week)
  }

  /// `week == 0` means "ask the quiz API for the current week".
  #[instrument(level = "info", skip(self, token))]
  pub async fn process_test(
    &self,
    token: &str,
    delay_secs: u64,
    week: u32,
    exam_type: u32,
  ) -> Result<ExamOutcome, ExamError> {
    let week = if week == 0 {
      let detected = self.current_week(token).await?;
      info!(target: "exam", week = detected, "Current week detected");
      detected
    } else {
      week
    };

    let started = Instant::now();
    let paper = match self.source.get_new_paper(token, week, &exam_type.to_string()).await {
      Ok(p) => p,
      Err(ApiError::RateLimited) => return Err(ExamError::RateLimited),
      Err(e) => return Err(ExamError::FetchPaper(e)),
    };
    info!(target: "exam", paper_id = %paper.paper_id, questions = paper.list.len(), "Paper fetched");

    let resolution = self.resolver.resolve(&paper.list).await;
    let payload = build_submission(&paper.paper_id, &paper.list, &resolution);
    let blank = payload.list.iter().filter(|a| a.input.is_none()).count();
    if blank > 0 {
      warn!(target: "exam", blank, "Submitting with unanswered questions");
    }

    pace_submission(started, delay_secs, self.cfg.submit_buffer()).await;

    self.source.submit_paper(token, &payload).await.map_err(ExamError::Submit)?;
    info!(target: "exam", paper_id = %paper.paper_id, elapsed = ?started.elapsed(), "Paper submitted");

    spawn_learning(
      self.source.clone(),
      self.bank.clone(),
      token.to_string(),
      paper.paper_id.clone(),
      self.cfg.learning_delay(),
    );

    Ok(ExamOutcome {
      message: format!(
        "Test completed and submitted. Answer bank hits: {}, word list hits: {}, AI solved: {}.",
        resolution.cache_hits, resolution.dictionary_hits, resolution.ai_solved
      ),
      paper_id: paper.paper_id,
      week,
      cache_hits: resolution.cache_hits,
      dictionary_hits: resolution.dictionary_hits,
      ai_solved: resolution.ai_solved,
    })
  }
}

/// Every question is submitted in paper order; unresolved ones carry no input.
pub fn build_submission(paper_id: &str, questions: &[Question], resolution: &Resolution) -> SubmissionPayload {
  SubmissionPayload {
    paper_id: paper_id.to_string(),
    kind: SUBMISSION_KIND.to_string(),
    list: questions
      .iter()
      .map(|q| AnswerInput {
        input: resolution.answers.get(&q.paper_detail_id).cloned(),
        paper_detail_id: q.paper_detail_id.clone(),
      })
      .collect(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ai::{fake::ScriptedChat, AiSolver};
  use crate::dictionary::Dictionary;
  use crate::domain::{Paper, PaperDetail, QuestionDetail};
  use crate::fingerprint::fingerprint;
  use crate::learning::fake::FakeQuiz;
  use std::collections::HashMap;
  use std::time::Duration;

  fn question(id: &str, title: &str, opts: [&str; 4]) -> Question {
    Question {
      paper_detail_id: id.into(),
      title: title.into(),
      answer_a: opts[0].into(),
      answer_b: opts[1].into(),
      answer_c: opts[2].into(),
      answer_d: opts[3].into(),
    }
  }

  fn cfg() -> ExamConfig {
    ExamConfig { learning_delay_seconds: 0, submit_buffer_millis: 0 }
  }

  async fn service(
    dir: &tempfile::TempDir,
    quiz: Arc<FakeQuiz>,
    dict: Dictionary,
    chat: Arc<ScriptedChat>,
  ) -> (ExamService, Arc<AnswerBank>) {
    let bank = Arc::new(AnswerBank::open(dir.path().join("bank.json")).await.unwrap());
    let resolver = Resolver::new(bank.clone(), Arc::new(dict), AiSolver::new(chat).unwrap());
    (ExamService::new(quiz, resolver, bank.clone(), cfg()), bank)
  }

  #[test]
  fn submission_keeps_paper_order_and_blanks_unresolved() {
    let qs = vec![
      question("d1", "a", ["1", "2", "3", "4"]),
      question("d2", "b", ["1", "2", "3", "4"]),
    ];
    let resolution = Resolution {
      answers: HashMap::from([("d2".to_string(), "C".to_string())]),
      ..Default::default()
    };
    let payload = build_submission("P-1", &qs, &resolution);
    assert_eq!(payload.kind, "0");
    assert_eq!(payload.list[0], AnswerInput { input: None, paper_detail_id: "d1".into() });
    assert_eq!(payload.list[1], AnswerInput { input: Some("C".into()), paper_detail_id: "d2".into() });
  }

  #[tokio::test]
  async fn full_run_submits_every_question_then_learns() {
    let dir = tempfile::tempdir().unwrap();
    let cached = question("d1", "apple", ["苹果", "梨", "桃", "李"]);
    let defined = question("d2", "pear", ["苹果", "桃", "梨", "李"]);
    let unknown = question("d3", "quince", ["苹果", "榅桲", "桃", "李"]);

    let graded = |q: &Question, answer: &str| QuestionDetail {
      paper_detail_id: q.paper_detail_id.clone(),
      title: q.title.clone(),
      answer_a: q.answer_a.clone(),
      answer_b: q.answer_b.clone(),
      answer_c: q.answer_c.clone(),
      answer_d: q.answer_d.clone(),
      answer: answer.into(),
      input: None,
      right: true,
    };
    let quiz = Arc::new(FakeQuiz {
      week: 9,
      paper: Some(Paper { paper_id: "P-7".into(), list: vec![cached.clone(), defined.clone(), unknown.clone()] }),
      detail: Some(PaperDetail {
        paper_id: "P-7".into(),
        mark: 100,
        list: vec![graded(&cached, "A"), graded(&defined, "C"), graded(&unknown, "B")],
      }),
      ..Default::default()
    });
    let chat = Arc::new(ScriptedChat::new(&["A\nC\nB", "-B-"]));
    let dict = Dictionary::new(
      HashMap::from([("pear".to_string(), "n. 梨；梨树".to_string())]),
      HashMap::new(),
    );
    let (svc, bank) = service(&dir, quiz.clone(), dict, chat).await;
    bank.save(HashMap::from([(fingerprint(&cached), "A".to_string())])).await.unwrap();

    let outcome = svc.process_test("tok", 0, 0, 0).await.unwrap();
    assert_eq!(outcome.paper_id, "P-7");
    assert_eq!(outcome.week, 9);
    assert_eq!((outcome.cache_hits, outcome.dictionary_hits, outcome.ai_solved), (1, 1, 1));
    assert_eq!(*quiz.requested_weeks.lock().unwrap(), vec![9]);

    let submitted = quiz.submitted.lock().unwrap().clone();
    assert_eq!(submitted.len(), 1);
    let inputs: Vec<_> = submitted[0].list.iter().map(|a| a.input.as_deref()).collect();
    assert_eq!(inputs, vec![Some("A"), Some("C"), Some("B")]);

    // Learning runs detached; give it a moment to land.
    for _ in 0..50 {
      if bank.len().await == 3 {
        break;
      }
      tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(bank.len().await, 3);
    assert_eq!(bank.query(&fingerprint(&unknown)).await.as_deref(), Some("B"));
  }

  #[tokio::test]
  async fn rate_limit_is_distinguished_and_nothing_is_submitted() {
    let dir = tempfile::tempdir().unwrap();
    let quiz = Arc::new(FakeQuiz { rate_limited: true, ..Default::default() });
    let chat = Arc::new(ScriptedChat::default());
    let (svc, _) = service(&dir, quiz.clone(), Dictionary::default(), chat.clone()).await;

    let err = svc.process_test("tok", 0, 3, 0).await.unwrap_err();
    assert!(matches!(err, ExamError::RateLimited));
    assert_eq!(err.label(), "Too many requests");
    assert!(quiz.submitted.lock().unwrap().is_empty());
    assert_eq!(chat.call_count(), 0);
  }

  #[tokio::test]
  async fn week_zero_from_the_api_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let quiz = Arc::new(FakeQuiz::default());
    let (svc, _) = service(&dir, quiz.clone(), Dictionary::default(), Arc::new(ScriptedChat::default())).await;

    assert!(matches!(svc.process_test("tok", 0, 0, 0).await, Err(ExamError::WeekMissing)));
    assert!(quiz.requested_weeks.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn submit_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let quiz = Arc::new(FakeQuiz {
      paper: Some(Paper { paper_id: "P-1".into(), list: vec![] }),
      fail_submit: true,
      ..Default::default()
    });
    let (svc, _) = service(&dir, quiz, Dictionary::default(), Arc::new(ScriptedChat::default())).await;

    let err = svc.process_test("tok", 0, 1, 0).await.unwrap_err();
    assert!(matches!(err, ExamError::Submit(_)));
    assert_eq!(err.label(), "Failed to submit paper");
    let text = err.to_string();
    assert_eq!(text.matches("paper/save").count(), 1, "{text}");
    assert!(std::error::Error::source(&err).is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn delay_budget_holds_the_submission() {
    let dir = tempfile::tempdir().unwrap();
    let quiz = Arc::new(FakeQuiz {
      paper: Some(Paper { paper_id: "P-1".into(), list: vec![] }),
      ..Default::default()
    });
    let (svc, _) = service(&dir, quiz.clone(), Dictionary::default(), Arc::new(ScriptedChat::default())).await;

    let started = Instant::now();
    svc.process_test("tok", 30, 1, 0).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(quiz.submitted.lock().unwrap().len(), 1);
  }
}
