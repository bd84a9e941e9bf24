//! Submission pacing: hold the submit until a minimum time has passed since the
//! request started.

use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

/// Time still to wait so that `elapsed` reaches `budget` (plus `buffer`).
/// `None` when the budget is zero or already used up.
pub fn remaining_wait(elapsed: Duration, budget: Duration, buffer: Duration) -> Option<Duration> {
  if budget.is_zero() {
    return None;
  }
  (budget + buffer).checked_sub(elapsed).filter(|d| !d.is_zero())
}

/// Sleep until `started + budget_secs` (plus `buffer`) if resolution was quick.
pub async fn pace_submission(started: Instant, budget_secs: u64, buffer: Duration) {
  let elapsed = started.elapsed();
  match remaining_wait(elapsed, Duration::from_secs(budget_secs), buffer) {
    Some(wait) => {
      info!(target: "exam", ?elapsed, ?wait, budget_secs, "Holding submission");
      tokio::time::sleep(wait).await;
    }
    None if budget_secs > 0 => {
      info!(target: "exam", ?elapsed, budget_secs, "Budget already spent; submitting now");
    }
    None => {}
  }
}
