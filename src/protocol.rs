//! Public request/response bodies for the HTTP API (serde ready).

use serde::{Deserialize, Serialize};

use crate::exam::ExamOutcome;

/// Body of `POST /api/v1/start-test`. Every field is optional; `week: 0` means auto-detect.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartTestIn {
    pub week: u32,
    /// 0 = self test, 1 = exam.
    pub exam_type: u32,
    pub submit_delay_seconds: u64,
}

#[derive(Deserialize)]
pub struct LoginAndStartIn {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub week: u32,
    #[serde(default)]
    pub exam_type: u32,
    #[serde(default)]
    pub submit_delay_seconds: u64,
}

// Hand-written so the password never reaches logs.
impl std::fmt::Debug for LoginAndStartIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginAndStartIn")
            .field("username", &self.username)
            .field("week", &self.week)
            .field("exam_type", &self.exam_type)
            .field("submit_delay_seconds", &self.submit_delay_seconds)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
pub struct TestOut {
    #[serde(flatten)]
    pub outcome: ExamOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_auth_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub status: &'static str,
}
