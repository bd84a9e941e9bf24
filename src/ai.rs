//! Prompting and answer extraction for the model-backed tier.

use std::fmt::Write as _;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::domain::{OptionKey, Question};
use crate::openai::{AiError, ChatBackend};
use crate::util::{starts_with_ascii_letter, trunc_for_log};

const BATCH_SYSTEM: &str =
  "你是一个高效的英语词义匹配助手，你需要根据指令批量处理问题并严格按顺序、按指定格式返回结果。";
const SINGLE_SYSTEM_EN: &str = "你要做的是词义匹配，找到和英文单词最贴切的中文解释";
const SINGLE_SYSTEM_ZH: &str = "你要做的是词义匹配，找到和中文意思最贴切的英语单词";

/// Lines consisting of exactly one option letter (CRLF tolerated).
const BATCH_PATTERN: &str = r"(?m)^([A-D])\r?$";
/// A single option letter wrapped in dashes, e.g. `-B-`.
const SINGLE_PATTERN: &str = r"-([A-D])-";

pub struct AiSolver {
  backend: Arc<dyn ChatBackend>,
  batch_re: Regex,
  single_re: Regex,
}

impl AiSolver {
  pub fn new(backend: Arc<dyn ChatBackend>) -> Result<Self, regex::Error> {
    Ok(Self {
      backend,
      batch_re: Regex::new(BATCH_PATTERN)?,
      single_re: Regex::new(SINGLE_PATTERN)?,
    })
  }

  /// One request for all `questions`; answers come back in input order.
  /// Any count other than `questions.len()` fails the whole batch.
  #[instrument(level = "info", skip_all, fields(questions = questions.len()))]
  pub async fn solve_batch(&self, questions: &[&Question]) -> Result<Vec<OptionKey>, AiError> {
    let prompt = batch_prompt(questions);
    let reply = self.backend.chat(BATCH_SYSTEM, &prompt).await?;
    debug!(target: "ai", reply = %trunc_for_log(&reply, 400), "Batch reply");

    let answers = self.parse_batch(&reply);
    if answers.len() != questions.len() {
      warn!(target: "ai", expected = questions.len(), got = answers.len(), "Batch answer count mismatch");
      return Err(AiError::AnswerCount { expected: questions.len(), got: answers.len() });
    }
    info!(target: "ai", solved = answers.len(), "Batch solved");
    Ok(answers)
  }

  #[instrument(level = "debug", skip_all, fields(id = %question.paper_detail_id))]
  pub async fn solve_one(&self, question: &Question) -> Result<OptionKey, AiError> {
    let system = if starts_with_ascii_letter(&question.title) { SINGLE_SYSTEM_EN } else { SINGLE_SYSTEM_ZH };
    let reply = self.backend.chat(system, &single_prompt(question)).await?;
    self.parse_single(&reply).ok_or_else(|| AiError::Unparseable(trunc_for_log(&reply, 120)))
  }

  fn parse_batch(&self, reply: &str) -> Vec<OptionKey> {
    self.batch_re
      .captures_iter(reply)
      .filter_map(|c| c.get(1).and_then(|m| OptionKey::parse(m.as_str())))
      .collect()
  }

  fn parse_single(&self, reply: &str) -> Option<OptionKey> {
    self.single_re.captures(reply).and_then(|c| c.get(1)).and_then(|m| OptionKey::parse(m.as_str()))
  }
}

fn batch_prompt(questions: &[&Question]) -> String {
  let n = questions.len();
  let mut p = String::new();
  p.push_str("你需要一次性解决以下所有词义匹配问题。\n");
  p.push_str("请严格按照问题的顺序，在独立的一行中只回答一个大写字母选项 (A, B, C, 或 D)。\n");
  let _ = write!(p, "总共有 {n} 个问题，所以你的回答也应该恰好是 {n} 行，每行只有一个字母。\n\n");
  for (i, q) in questions.iter().enumerate() {
    let _ = writeln!(p, "--- 问题 {} ---", i + 1);
    let _ = writeln!(p, "题目: {}", q.title);
    for key in OptionKey::ALL {
      let _ = writeln!(p, "{}. {}", key, q.option(key));
    }
    p.push('\n');
  }
  p
}

fn single_prompt(q: &Question) -> String {
  format!(
    "你要做的是词义匹配，找到和问题最贴切的选项。\n\
     最终只回答一个被'-'包起来的大写字母作为答案, 例如\"-B-\"。\n\
     不要包含任何其他解释或文字。\n\n\
     问题: {}\nA. {}\nB. {}\nC. {}\nD. {}",
    q.title, q.answer_a, q.answer_b, q.answer_c, q.answer_d
  )
}

#[cfg(test)]
pub(crate) mod fake {
  use super::*;
  use async_trait::async_trait;
  use std::collections::VecDeque;
  use std::sync::Mutex;

  /// Scripted chat backend: pops one reply per call and records every prompt.
  #[derive(Default)]
  pub struct ScriptedChat {
    replies: Mutex<VecDeque<Result<String, String>>>,
    pub calls: Mutex<Vec<(String, String)>>,
  }

  impl ScriptedChat {
    pub fn new(replies: &[&str]) -> Self {
      Self {
        replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
        calls: Mutex::default(),
      }
    }

    pub fn push_failure(&self, message: &str) {
      self.replies.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn call_count(&self) -> usize {
      self.calls.lock().unwrap().len()
    }
  }

  #[async_trait]
  impl ChatBackend for ScriptedChat {
    async fn chat(&self, system: &str, user: &str) -> Result<String, AiError> {
      self.calls.lock().unwrap().push((system.to_string(), user.to_string()));
      match self.replies.lock().unwrap().pop_front() {
        Some(Ok(reply)) => Ok(reply),
        Some(Err(message)) => Err(AiError::Status { status: reqwest::StatusCode::BAD_GATEWAY, message }),
        None => Err(AiError::EmptyChoices),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::fake::ScriptedChat;
  use super::*;

  fn q(id: &str, title: &str) -> Question {
    Question {
      paper_detail_id: id.into(),
      title: title.into(),
      answer_a: "苹果".into(),
      answer_b: "梨".into(),
      answer_c: "桃".into(),
      answer_d: "李".into(),
    }
  }

  fn solver(chat: Arc<ScriptedChat>) -> AiSolver {
    AiSolver::new(chat).unwrap()
  }

  #[tokio::test]
  async fn batch_reads_only_single_letter_lines() {
    let chat = Arc::new(ScriptedChat::new(&["Sure!\nA\r\nC\n  \nanswer: D\nB"]));
    let (q1, q2, q3) = (q("1", "apple"), q("2", "pear"), q("3", "peach"));
    let got = solver(chat.clone()).solve_batch(&[&q1, &q2, &q3]).await.unwrap();
    assert_eq!(got, vec![OptionKey::A, OptionKey::C, OptionKey::B]);

    let (system, user) = chat.calls.lock().unwrap()[0].clone();
    assert_eq!(system, BATCH_SYSTEM);
    assert!(user.contains("总共有 3 个问题"));
    assert!(user.contains("--- 问题 3 ---\n题目: peach\nA. 苹果\nB. 梨\nC. 桃\nD. 李\n"));
  }

  #[tokio::test]
  async fn batch_with_wrong_count_fails() {
    let chat = Arc::new(ScriptedChat::new(&["A\nB"]));
    let (q1, q2, q3) = (q("1", "a"), q("2", "b"), q("3", "c"));
    let err = solver(chat).solve_batch(&[&q1, &q2, &q3]).await.unwrap_err();
    assert!(matches!(err, AiError::AnswerCount { expected: 3, got: 2 }));
  }

  #[tokio::test]
  async fn single_picks_system_prompt_by_title_language() {
    let chat = Arc::new(ScriptedChat::new(&["I think -D- is right", "-A-"]));
    let s = solver(chat.clone());
    assert_eq!(s.solve_one(&q("1", "apple")).await.unwrap(), OptionKey::D);
    assert_eq!(s.solve_one(&q("2", "苹果")).await.unwrap(), OptionKey::A);

    let calls = chat.calls.lock().unwrap();
    assert_eq!(calls[0].0, SINGLE_SYSTEM_EN);
    assert_eq!(calls[1].0, SINGLE_SYSTEM_ZH);
    assert!(calls[0].1.contains("问题: apple\nA. 苹果"));
  }

  #[tokio::test]
  async fn single_without_dashed_letter_is_unparseable() {
    let chat = Arc::new(ScriptedChat::new(&["The answer is B"]));
    let err = solver(chat).solve_one(&q("1", "apple")).await.unwrap_err();
    assert!(matches!(err, AiError::Unparseable(_)));
  }
}
