//! Client for the vocabulary quiz API.
//!
//! Every call carries the bearer token in `X-Auth-Token` and a fresh `skl-ticket`.
//! The exam service and the learning loop only see the `PaperSource` trait.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE, ORIGIN, PRAGMA, REFERER, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{ApiErrorBody, CourseInfo, Paper, PaperDetail, SubmissionPayload};
use crate::util::{generate_ticket, trunc_for_log};

/// Error code + message fragment the API uses for "retry later".
const RATE_LIMIT_CODE: i64 = 2;
const RATE_LIMIT_MSG: &str = "请勿在短时间重试";

const BROWSER_UA: &str =
  "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/141.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("request frequency is too fast")]
  RateLimited,
  #[error("{endpoint} request failed: {source}")]
  Request { endpoint: &'static str, source: reqwest::Error },
  #[error("{endpoint} returned HTTP {status}")]
  Status { endpoint: &'static str, status: StatusCode },
  #[error("{endpoint} response could not be decoded: {source}")]
  Decode { endpoint: &'static str, source: serde_json::Error },
}

impl ApiError {
  pub fn is_timeout(&self) -> bool {
    matches!(self, ApiError::Request { source, .. } if source.is_timeout())
  }
}

/// The quiz operations the core depends on.
#[async_trait]
pub trait PaperSource: Send + Sync {
  async fn fetch_current_week(&self, token: &str) -> Result<CourseInfo, ApiError>;
  async fn get_new_paper(&self, token: &str, week: u32, exam_type: &str) -> Result<Paper, ApiError>;
  async fn fetch_paper_detail(&self, token: &str, paper_id: &str) -> Result<PaperDetail, ApiError>;
  async fn submit_paper(&self, token: &str, payload: &SubmissionPayload) -> Result<(), ApiError>;
}

#[derive(Clone)]
pub struct SklClient {
  client: Client,
  base_url: String,
  site_origin: String,
}

impl SklClient {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
    let base_url = base_url.into().trim_end_matches('/').to_string();
    let site_origin = reqwest::Url::parse(&base_url)
      .map(|u| u.origin().ascii_serialization())
      .unwrap_or_else(|_| base_url.clone());
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, base_url, site_origin })
  }

  fn with_common_headers(&self, req: RequestBuilder, token: &str) -> RequestBuilder {
    req
      .header(ACCEPT, "application/json, text/plain, */*")
      .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9,zh-CN;q=0.8,zh;q=0.7")
      .header(REFERER, format!("{}/", self.site_origin))
      .header(USER_AGENT, BROWSER_UA)
      .header("X-Auth-Token", token)
      .header("skl-ticket", generate_ticket())
  }

  async fn send(&self, req: RequestBuilder, endpoint: &'static str) -> Result<(StatusCode, String), ApiError> {
    let resp = req.send().await.map_err(|source| ApiError::Request { endpoint, source })?;
    let status = resp.status();
    let body = resp.text().await.map_err(|source| ApiError::Request { endpoint, source })?;
    debug!(target: "quiz_api", endpoint, %status, bytes = body.len(), "Quiz API responded");
    Ok((status, body))
  }

  fn decode<T: DeserializeOwned>(body: &str, endpoint: &'static str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|source| {
      error!(target: "quiz_api", endpoint, body = %trunc_for_log(body, 512), "Failed to decode response");
      ApiError::Decode { endpoint, source }
    })
  }
}

/// True for the API's 400 "do not retry in a short time" envelope.
pub fn is_rate_limited(status: StatusCode, body: &str) -> bool {
  if status != StatusCode::BAD_REQUEST {
    return false;
  }
  serde_json::from_str::<ApiErrorBody>(body)
    .map(|e| e.code == RATE_LIMIT_CODE && e.msg.contains(RATE_LIMIT_MSG))
    .unwrap_or(false)
}

#[async_trait]
impl PaperSource for SklClient {
  #[instrument(level = "info", skip_all)]
  async fn fetch_current_week(&self, token: &str) -> Result<CourseInfo, ApiError> {
    const EP: &str = "course";
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let req = self
      .with_common_headers(self.client.get(format!("{}/course", self.base_url)), token)
      .query(&[("startTime", today)])
      .header(CACHE_CONTROL, "no-cache")
      .header(PRAGMA, "no-cache");
    let (status, body) = self.send(req, EP).await?;
    if status != StatusCode::OK {
      return Err(ApiError::Status { endpoint: EP, status });
    }
    Self::decode(&body, EP)
  }

  #[instrument(level = "info", skip(self, token))]
  async fn get_new_paper(&self, token: &str, week: u32, exam_type: &str) -> Result<Paper, ApiError> {
    const EP: &str = "paper/new";
    let start_time = chrono::Utc::now().timestamp_millis();
    let req = self
      .with_common_headers(self.client.get(format!("{}/paper/new", self.base_url)), token)
      .query(&[("type", exam_type.to_string()), ("week", week.to_string()), ("startTime", start_time.to_string())]);
    let (status, body) = self.send(req, EP).await?;
    if status != StatusCode::OK {
      if is_rate_limited(status, &body) {
        warn!(target: "quiz_api", "Quiz API reports rate limiting");
        return Err(ApiError::RateLimited);
      }
      return Err(ApiError::Status { endpoint: EP, status });
    }
    let paper: Paper = Self::decode(&body, EP)?;
    info!(target: "quiz_api", paper_id = %paper.paper_id, questions = paper.list.len(), "Fetched new paper");
    Ok(paper)
  }

  #[instrument(level = "info", skip(self, token))]
  async fn fetch_paper_detail(&self, token: &str, paper_id: &str) -> Result<PaperDetail, ApiError> {
    const EP: &str = "paper/detail";
    let req = self
      .with_common_headers(self.client.get(format!("{}/paper/detail", self.base_url)), token)
      .query(&[("paperId", paper_id)])
      .header(CACHE_CONTROL, "no-cache")
      .header(PRAGMA, "no-cache");
    let (status, body) = self.send(req, EP).await?;
    if status != StatusCode::OK {
      error!(target: "quiz_api", %status, body = %trunc_for_log(&body, 512), "Paper detail request rejected");
      return Err(ApiError::Status { endpoint: EP, status });
    }
    Self::decode(&body, EP)
  }

  #[instrument(level = "info", skip_all, fields(paper_id = %payload.paper_id, answers = payload.list.len()))]
  async fn submit_paper(&self, token: &str, payload: &SubmissionPayload) -> Result<(), ApiError> {
    const EP: &str = "paper/save";
    let req = self
      .with_common_headers(self.client.post(format!("{}/paper/save", self.base_url)), token)
      .header(CONTENT_TYPE, "application/json")
      .header(ORIGIN, self.site_origin.as_str())
      .json(payload);
    let (status, _) = self.send(req, EP).await?;
    if status != StatusCode::OK {
      return Err(ApiError::Status { endpoint: EP, status });
    }
    Ok(())
  }
}
