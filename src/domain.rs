//! Domain models exchanged with the quiz API: papers, questions, graded details and submissions.

use serde::{Deserialize, Deserializer, Serialize};

/// One of the four answer options. The declaration order is the tie-break order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OptionKey {
  A,
  B,
  C,
  D,
}

impl OptionKey {
  pub const ALL: [OptionKey; 4] = [OptionKey::A, OptionKey::B, OptionKey::C, OptionKey::D];

  pub fn as_str(self) -> &'static str {
    match self {
      OptionKey::A => "A",
      OptionKey::B => "B",
      OptionKey::C => "C",
      OptionKey::D => "D",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "A" => Some(OptionKey::A),
      "B" => Some(OptionKey::B),
      "C" => Some(OptionKey::C),
      "D" => Some(OptionKey::D),
      _ => None,
    }
  }
}

impl std::fmt::Display for OptionKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A quiz question as served by `paper/new`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  #[serde(default, deserialize_with = "null_as_empty")] pub paper_detail_id: String,
  #[serde(default, deserialize_with = "null_as_empty")] pub title: String,
  #[serde(default, deserialize_with = "null_as_empty")] pub answer_a: String,
  #[serde(default, deserialize_with = "null_as_empty")] pub answer_b: String,
  #[serde(default, deserialize_with = "null_as_empty")] pub answer_c: String,
  #[serde(default, deserialize_with = "null_as_empty")] pub answer_d: String,
}

impl Question {
  pub fn option(&self, key: OptionKey) -> &str {
    match key {
      OptionKey::A => &self.answer_a,
      OptionKey::B => &self.answer_b,
      OptionKey::C => &self.answer_c,
      OptionKey::D => &self.answer_d,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
  pub paper_id: String,
  #[serde(default)] pub list: Vec<Question>,
}

/// A graded item from `paper/detail`, carrying the official answer letter.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDetail {
  #[serde(default, deserialize_with = "null_as_empty")] pub paper_detail_id: String,
  #[serde(default, deserialize_with = "null_as_empty")] pub title: String,
  #[serde(default, deserialize_with = "null_as_empty")] pub answer_a: String,
  #[serde(default, deserialize_with = "null_as_empty")] pub answer_b: String,
  #[serde(default, deserialize_with = "null_as_empty")] pub answer_c: String,
  #[serde(default, deserialize_with = "null_as_empty")] pub answer_d: String,
  #[serde(default, deserialize_with = "null_as_empty")] pub answer: String,
  #[serde(default)] pub input: Option<String>,
  #[serde(default)] pub right: bool,
}

impl QuestionDetail {
  /// The question part of the item, used to recompute its fingerprint.
  pub fn question(&self) -> Question {
    Question {
      paper_detail_id: self.paper_detail_id.clone(),
      title: self.title.clone(),
      answer_a: self.answer_a.clone(),
      answer_b: self.answer_b.clone(),
      answer_c: self.answer_c.clone(),
      answer_d: self.answer_d.clone(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperDetail {
  pub paper_id: String,
  #[serde(default)] pub mark: i64,
  #[serde(default)] pub list: Vec<QuestionDetail>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CourseInfo {
  #[serde(default)] pub week: u32,
}

/// Body of a `paper/save` call.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
  pub paper_id: String,
  #[serde(rename = "type")]
  pub kind: String,
  pub list: Vec<AnswerInput>,
}

/// A blank answer is sent without `input`; the quiz API treats it as left empty.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerInput {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub input: Option<String>,
  pub paper_detail_id: String,
}

/// Missing and `null` text fields both decode as "".
fn null_as_empty<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
  Ok(Option::<String>::deserialize(de)?.unwrap_or_default())
}

/// Error envelope returned by the quiz API on 4xx.
#[derive(Clone, Debug, Deserialize)]
pub struct ApiErrorBody {
  #[serde(default)] pub code: i64,
  #[serde(default, deserialize_with = "null_as_empty")] pub msg: String,
}
