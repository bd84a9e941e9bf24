//! Small utility helpers used across modules.

use rand::{rngs::OsRng, RngCore};

/// Alphabet the quiz frontend draws its per-request tickets from.
pub const TICKET_ALPHABET: &[u8; 64] = b"useandom-26T198340PX75pxJACKVERYMINDBUSHWOLF_GQZbfghjklqvwyzrict";

/// Length of a quiz API ticket.
pub const TICKET_LEN: usize = 21;

/// Fresh opaque ticket for one quiz API call.
/// Each OS-random byte is masked to 6 bits and mapped through `TICKET_ALPHABET`.
pub fn generate_ticket() -> String {
  let mut bytes = [0u8; TICKET_LEN];
  OsRng.fill_bytes(&mut bytes);
  bytes
    .iter()
    .map(|b| TICKET_ALPHABET[(b & 63) as usize] as char)
    .collect()
}

/// Random hex token (`n` bytes, so `2n` characters) for the SSO `state` parameter.
pub fn generate_state_token(n: usize) -> String {
  let mut bytes = vec![0u8; n];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

/// True if the text starts with an ASCII letter, i.e. the question asks about an
/// English word rather than a Chinese meaning.
pub fn starts_with_ascii_letter(s: &str) -> bool {
  s.chars().next().map_or(false, |c| c.is_ascii_alphabetic())
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}
