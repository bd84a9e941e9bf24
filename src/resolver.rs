//! Tiered answer resolution: answer bank, then word list, then the model.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tracing::{info, instrument, warn};

use crate::ai::AiSolver;
use crate::answer_bank::AnswerBank;
use crate::dictionary::Dictionary;
use crate::domain::{OptionKey, Question};
use crate::fingerprint::{clean_field, fingerprint};
use crate::util::starts_with_ascii_letter;

#[derive(Debug, Default)]
pub struct Resolution {
  /// paperDetailId → answer letter. Questions no tier could answer are absent.
  pub answers: HashMap<String, String>,
  pub cache_hits: usize,
  pub dictionary_hits: usize,
  pub ai_solved: usize,
}

enum Tier {
  Cache(String),
  Dictionary(OptionKey),
  Unsolved,
}

pub struct Resolver {
  bank: Arc<AnswerBank>,
  dictionary: Arc<Dictionary>,
  ai: AiSolver,
}

impl Resolver {
  pub fn new(bank: Arc<AnswerBank>, dictionary: Arc<Dictionary>, ai: AiSolver) -> Self {
    Self { bank, dictionary, ai }
  }

  #[instrument(level = "info", skip_all, fields(questions = questions.len()))]
  pub async fn resolve(&self, questions: &[Question]) -> Resolution {
    let answers = Mutex::new(HashMap::with_capacity(questions.len()));
    let shared = &answers;

    let tiers = join_all(questions.iter().map(|q| async move {
      let tier = self.local_tiers(q).await;
      let letter = match &tier {
        Tier::Cache(a) => Some(a.clone()),
        Tier::Dictionary(k) => Some(k.as_str().to_string()),
        Tier::Unsolved => None,
      };
      if let Some(letter) = letter {
        lock(shared).insert(q.paper_detail_id.clone(), letter);
      }
      tier
    }))
    .await;

    let mut out = Resolution::default();
    let mut unsolved = Vec::new();
    for (q, tier) in questions.iter().zip(&tiers) {
      match tier {
        Tier::Cache(_) => out.cache_hits += 1,
        Tier::Dictionary(_) => out.dictionary_hits += 1,
        Tier::Unsolved => unsolved.push(q),
      }
    }
    info!(
      target: "exam",
      cache_hits = out.cache_hits,
      dictionary_hits = out.dictionary_hits,
      pending = unsolved.len(),
      "Local tiers done"
    );

    if !unsolved.is_empty() {
      out.ai_solved = self.model_tier(&unsolved, &answers).await;
    }

    out.answers = answers.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    out
  }

  async fn local_tiers(&self, q: &Question) -> Tier {
    if let Some(answer) = self.bank.query(&fingerprint(q)).await.filter(|a| !a.is_empty()) {
      return Tier::Cache(answer);
    }
    match self.dictionary_pick(q) {
      Some(key) => Tier::Dictionary(key),
      None => Tier::Unsolved,
    }
  }

  /// English titles: first option contained in the word's definition.
  /// Chinese titles: first option equal to the word for that meaning.
  /// Options are checked A, B, C, D.
  fn dictionary_pick(&self, q: &Question) -> Option<OptionKey> {
    let title = clean_field(&q.title);
    let mut options = OptionKey::ALL
      .into_iter()
      .map(|k| (k, clean_field(q.option(k))))
      .filter(|(_, text)| !text.is_empty());

    if starts_with_ascii_letter(title) {
      let definition = self.dictionary.find_definition_by_word(title)?;
      options.find(|(_, text)| definition.contains(*text)).map(|(k, _)| k)
    } else {
      let word = self.dictionary.find_word_by_meaning(title)?;
      options.find(|(_, text)| *text == word).map(|(k, _)| k)
    }
  }

  /// Batch first; on any batch failure every pending question is asked on its own.
  async fn model_tier(&self, unsolved: &[&Question], answers: &Mutex<HashMap<String, String>>) -> usize {
    match self.ai.solve_batch(unsolved).await {
      Ok(keys) => {
        let mut map = lock(answers);
        for (q, key) in unsolved.iter().zip(keys) {
          map.insert(q.paper_detail_id.clone(), key.as_str().to_string());
        }
        unsolved.len()
      }
      Err(e) => {
        warn!(target: "exam", error = %e, pending = unsolved.len(), "Batch AI failed; asking per question");
        let mut solved = 0;
        for q in unsolved {
          match self.ai.solve_one(q).await {
            Ok(key) => {
              lock(answers).insert(q.paper_detail_id.clone(), key.as_str().to_string());
              solved += 1;
            }
            Err(e) => warn!(target: "exam", id = %q.paper_detail_id, title = %q.title, error = %e, "Question left unanswered"),
          }
        }
        info!(target: "exam", solved, pending = unsolved.len(), "Per-question AI finished");
        solved
      }
    }
  }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ai::fake::ScriptedChat;

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

  async fn resolver(
    dir: &tempfile::TempDir,
    bank: &[(String, &str)],
    dict: Dictionary,
    chat: Arc<ScriptedChat>,
  ) -> Resolver {
    let store = AnswerBank::open(dir.path().join("bank.json")).await.unwrap();
    store.save(bank.iter().map(|(k, v)| (k.clone(), v.to_string())).collect()).await.unwrap();
    Resolver::new(Arc::new(store), Arc::new(dict), AiSolver::new(chat).unwrap())
  }

  fn owned(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  fn dict(words: &[(&str, &str)], meanings: &[(&str, &str)]) -> Dictionary {
    Dictionary::new(owned(words), owned(meanings))
  }

  #[tokio::test]
  async fn cached_question_never_reaches_other_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let q = question("d1", "apple.", ["苹果", "梨", "桃", "李"]);
    let chat = Arc::new(ScriptedChat::new(&["B"]));
    let r = resolver(
      &dir,
      &[(fingerprint(&q), "D")],
      dict(&[("apple", "n. 苹果")], &[]),
      chat.clone(),
    )
    .await;

    let res = r.resolve(std::slice::from_ref(&q)).await;
    assert_eq!(res.answers["d1"], "D");
    assert_eq!((res.cache_hits, res.dictionary_hits, res.ai_solved), (1, 0, 0));
    assert_eq!(chat.call_count(), 0);
  }

  #[tokio::test]
  async fn dictionary_definition_and_meaning_matches() {
    let dir = tempfile::tempdir().unwrap();
    let english = question("d1", "apple", ["梨", "苹果.", "桃", "李"]);
    let chinese = question("d2", "桃子", ["pear", "apple", "peach", "plum"]);
    let chat = Arc::new(ScriptedChat::default());
    let r = resolver(
      &dir,
      &[],
      dict(&[("apple", "n. 苹果；苹果树")], &[("桃子", "peach")]),
      chat.clone(),
    )
    .await;

    let res = r.resolve(&[english, chinese]).await;
    assert_eq!(res.answers["d1"], "B");
    assert_eq!(res.answers["d2"], "C");
    assert_eq!(res.dictionary_hits, 2);
    assert_eq!(chat.call_count(), 0);
  }

  #[tokio::test]
  async fn dictionary_ties_go_to_the_earliest_option() {
    let dir = tempfile::tempdir().unwrap();
    let q = question("d1", "bank", ["河岸", "银行", "堤", "树"]);
    let r = resolver(&dir, &[], dict(&[("bank", "n. 银行；河岸")], &[]), Arc::new(ScriptedChat::default())).await;
    let res = r.resolve(&[q]).await;
    assert_eq!(res.answers["d1"], "A");
  }

  #[tokio::test]
  async fn short_batch_falls_back_to_every_question_individually() {
    let dir = tempfile::tempdir().unwrap();
    let qs: Vec<Question> = (0..3).map(|i| question(&format!("d{i}"), &format!("w{i}"), ["a", "b", "c", "d"])).collect();
    let chat = Arc::new(ScriptedChat::new(&["A\nB", "-C-", "-D-", "-A-"]));
    let r = resolver(&dir, &[], Dictionary::default(), chat.clone()).await;

    let res = r.resolve(&qs).await;
    assert_eq!(chat.call_count(), 4);
    assert_eq!(res.ai_solved, 3);
    assert_eq!(res.answers["d0"], "C");
    assert_eq!(res.answers["d1"], "D");
    assert_eq!(res.answers["d2"], "A");
  }

  #[tokio::test]
  async fn failed_individual_answer_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let qs = vec![
      question("d0", "w0", ["a", "b", "c", "d"]),
      question("d1", "w1", ["a", "b", "c", "d"]),
    ];
    let chat = Arc::new(ScriptedChat::new(&["nonsense", "no letter here", "-B-"]));
    let r = resolver(&dir, &[], Dictionary::default(), chat.clone()).await;

    let res = r.resolve(&qs).await;
    assert_eq!(res.ai_solved, 1);
    assert!(!res.answers.contains_key("d0"));
    assert_eq!(res.answers["d1"], "B");
  }

  #[tokio::test]
  async fn batch_transport_error_also_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let qs = vec![question("d0", "w0", ["a", "b", "c", "d"])];
    let chat = Arc::new(ScriptedChat::default());
    chat.push_failure("upstream down");
    chat.push_failure("still down");
    let r = resolver(&dir, &[], Dictionary::default(), chat.clone()).await;

    let res = r.resolve(&qs).await;
    assert_eq!(chat.call_count(), 2);
    assert_eq!(res.ai_solved, 0);
    assert!(res.answers.is_empty());
  }

  #[tokio::test]
  async fn three_tiers_in_one_paper() {
    let dir = tempfile::tempdir().unwrap();
    let cached = question("d1", "apple", ["苹果", "梨", "桃", "李"]);
    let defined = question("d2", "pear", ["苹果", "桃", "梨", "李"]);
    let unknown = question("d3", "quince", ["苹果", "榅桲", "桃", "李"]);
    // The batch reply carries three letters for one pending question, so it is
    // rejected and the question is asked on its own.
    let chat = Arc::new(ScriptedChat::new(&["A\nC\nB", "-B-"]));
    let r = resolver(
      &dir,
      &[(fingerprint(&cached), "A")],
      dict(&[("pear", "n. 梨；梨树")], &[]),
      chat.clone(),
    )
    .await;

    let res = r.resolve(&[cached, defined, unknown]).await;
    assert_eq!(res.answers.len(), 3);
    assert_eq!(res.answers["d1"], "A");
    assert_eq!(res.answers["d2"], "C");
    assert_eq!(res.answers["d3"], "B");
    assert_eq!((res.cache_hits, res.dictionary_hits, res.ai_solved), (1, 1, 1));
  }
}
