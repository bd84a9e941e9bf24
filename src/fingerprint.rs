//! Cache keys for questions.
//!
//! The key is the literal joined text (no hashing) so the answer bank file stays
//! readable by hand.

use crate::domain::Question;

const SEPARATOR: &str = "|";

/// Strip trailing `.`/space, then surrounding whitespace.
pub fn clean_field(s: &str) -> &str {
  s.trim_end_matches(|c| c == '.' || c == ' ').trim()
}

/// `title|A|B|C|D` over the cleaned fields. Option order is preserved as served.
pub fn fingerprint(q: &Question) -> String {
  [
    clean_field(&q.title),
    clean_field(&q.answer_a),
    clean_field(&q.answer_b),
    clean_field(&q.answer_c),
    clean_field(&q.answer_d),
  ]
  .join(SEPARATOR)
}
