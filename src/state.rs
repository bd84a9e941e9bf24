//! Application state: the exam service and the SSO authenticator, wired from config.
//!
//! The answer bank is the only mutable state shared across requests; it is owned
//! here (through the exam service) and injected into the resolver and learning loop.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use crate::ai::AiSolver;
use crate::answer_bank::{AnswerBank, StoreError};
use crate::auth::Authenticator;
use crate::config::AppConfig;
use crate::dictionary::{Dictionary, DictionaryError};
use crate::exam::ExamService;
use crate::openai::OpenAI;
use crate::quiz_api::SklClient;
use crate::resolver::Resolver;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
    #[error(transparent)]
    AnswerBank(#[from] StoreError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("invalid answer pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub struct AppState {
    pub exam: ExamService,
    pub auth: Authenticator,
}

impl AppState {
    pub fn new(exam: ExamService, auth: Authenticator) -> Self {
        Self { exam, auth }
    }

    /// Load the word list and answer bank, then build every outbound client.
    #[instrument(level = "info", skip_all)]
    pub async fn from_config(cfg: &AppConfig) -> Result<Self, StartupError> {
        let dictionary = Arc::new(Dictionary::load(&cfg.database.json_path)?);
        let bank = Arc::new(AnswerBank::open(&cfg.database.answer_bank_path).await?);

        let quiz = Arc::new(SklClient::new(
            cfg.hdu_api.base_url.clone(),
            std::time::Duration::from_secs(cfg.hdu_api.timeout_seconds),
        )?);
        let ai = AiSolver::new(Arc::new(OpenAI::new(&cfg.ai_service)?))?;
        if cfg.ai_service.api_key.is_empty() {
            tracing::warn!(target: "autoword_backend", "ai_service.api_key is empty; AI tier calls will be rejected");
        }

        let resolver = Resolver::new(bank.clone(), dictionary, ai);
        let exam = ExamService::new(quiz, resolver, bank, cfg.exam.clone());
        let auth = Authenticator::new(cfg.sso.clone());

        info!(
            target: "autoword_backend",
            quiz_api = %cfg.hdu_api.base_url,
            model = %cfg.ai_service.model,
            "Application state ready"
        );
        Ok(Self::new(exam, auth))
    }
}
