//! Campus SSO login: turns a username/password into a quiz bearer token.
//!
//! Flow (one isolated cookie jar per call, redirects never auto-followed):
//!   1. GET the login page with a `service` callback carrying a random state token.
//!   2. Scrape the AES key (`p#login-croypto`) and flow key (`#login-page-flowkey`).
//!   3. Encrypt the password with that key (AES-ECB, PKCS#7, base64).
//!   4. POST the form; only a 302 with `Location` counts as success.
//!   5. Walk the redirect chain by hand. A `token=` in a Location fragment wins;
//!      otherwise the final page's `X-Auth-Token` cookie on the quiz origin is used.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{LOCATION, REFERER, USER_AGENT};
use reqwest::{redirect, Client, Response, StatusCode, Url};
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::SsoConfig;
use crate::crypto::{encrypt_credential, CipherError};
use crate::util::generate_state_token;

const STATE_TOKEN_BYTES: usize = 12;
const AUTH_COOKIE: &str = "X-Auth-Token";
const BROWSER_UA: &str =
  "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/141.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum AuthError {
  #[error("failed to build HTTP client: {0}")]
  Client(reqwest::Error),
  #[error("invalid SSO URL '{url}': {source}")]
  BadUrl { url: String, source: url::ParseError },
  #[error("{stage} request failed: {source}")]
  Request { stage: &'static str, source: reqwest::Error },
  #[error("login page did not contain the crypto key or execution token")]
  TokenExtraction,
  #[error("password encryption failed: {0}")]
  Cipher(#[from] CipherError),
  #[error("login rejected: expected a 302 redirect, got {status}")]
  InvalidCredentialsOrFlow { status: StatusCode },
  #[error("redirect from {url} has no usable Location header")]
  MissingLocation { url: String },
  #[error("redirect chain ended without a token in any fragment or cookie")]
  TokenNotFound,
  #[error("gave up after {max} redirects without finding a token")]
  TooManyRedirects { max: usize },
}

/// Values scraped from the SSO login page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTokens {
  pub crypto_key: String,
  pub execution: String,
}

/// Per-login state. Dropped when the login call returns.
struct AuthSession {
  client: Client,
  jar: Arc<Jar>,
}

impl AuthSession {
  fn new(timeout: Duration) -> Result<Self, AuthError> {
    let jar = Arc::new(Jar::default());
    let client = Client::builder()
      .cookie_provider(jar.clone())
      .redirect(redirect::Policy::none())
      .timeout(timeout)
      .build()
      .map_err(AuthError::Client)?;
    Ok(Self { client, jar })
  }

  async fn get(&self, url: Url, referer: Option<&str>, stage: &'static str) -> Result<Response, AuthError> {
    let mut req = self.client.get(url).header(USER_AGENT, BROWSER_UA);
    if let Some(r) = referer {
      req = req.header(REFERER, r);
    }
    req.send().await.map_err(|source| AuthError::Request { stage, source })
  }

  fn cookie(&self, origin: &Url, name: &str) -> Option<String> {
    let header = self.jar.cookies(origin)?;
    let raw = header.to_str().ok()?;
    raw.split(';').find_map(|pair| {
      let (k, v) = pair.trim().split_once('=')?;
      (k == name).then(|| v.to_string())
    })
  }
}

#[derive(Clone)]
pub struct Authenticator {
  cfg: SsoConfig,
}

impl Authenticator {
  pub fn new(cfg: SsoConfig) -> Self {
    Self { cfg }
  }

  /// Full SSO handshake. Any failure aborts the attempt; no partial token is returned.
  #[instrument(level = "info", skip_all, fields(%username))]
  pub async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
    let session = AuthSession::new(Duration::from_secs(self.cfg.timeout_seconds))?;
    let state = generate_state_token(STATE_TOKEN_BYTES);
    let service = format!("{}?state={}&index=", self.cfg.service_url, state);
    debug!(target: "auth", %state, "Generated state token");

    let (tokens, page_url) = self.fetch_login_tokens(&session, &service).await?;
    debug!(target: "auth", execution_len = tokens.execution.len(), "Login page tokens extracted");

    let encrypted = encrypt_credential(&tokens.crypto_key, password)?;
    let ticket_url = self.post_login_form(&session, username, &encrypted, &tokens, &page_url).await?;
    info!(target: "auth", "Credentials accepted; exchanging ticket for token");

    let token = self.exchange_ticket_for_token(&session, ticket_url, page_url.as_str()).await?;
    info!(target: "auth", "SSO login succeeded");
    Ok(token)
  }

  async fn fetch_login_tokens(&self, session: &AuthSession, service: &str) -> Result<(LoginTokens, Url), AuthError> {
    let url = Url::parse_with_params(&self.cfg.login_url, &[("service", service)])
      .map_err(|source| AuthError::BadUrl { url: self.cfg.login_url.clone(), source })?;
    let resp = session.get(url, None, "login page").await?;
    let page_url = resp.url().clone();
    let html = resp
      .text()
      .await
      .map_err(|source| AuthError::Request { stage: "login page body", source })?;
    let tokens = parse_login_page(&html).ok_or(AuthError::TokenExtraction)?;
    Ok((tokens, page_url))
  }

  async fn post_login_form(
    &self,
    session: &AuthSession,
    username: &str,
    encrypted_password: &str,
    tokens: &LoginTokens,
    referer: &Url,
  ) -> Result<Url, AuthError> {
    let form = [
      ("username", username),
      ("type", "UsernamePassword"),
      ("_eventId", "submit"),
      ("geolocation", ""),
      ("execution", tokens.execution.as_str()),
      ("password", encrypted_password),
      ("croypto", tokens.crypto_key.as_str()),
      ("captcha_code", ""),
      ("captcha_payload", ""),
    ];
    let resp = session
      .client
      .post(&self.cfg.login_url)
      .header(USER_AGENT, BROWSER_UA)
      .header(REFERER, referer.as_str())
      .form(&form)
      .send()
      .await
      .map_err(|source| AuthError::Request { stage: "login form", source })?;

    let status = resp.status();
    if status != StatusCode::FOUND {
      warn!(target: "auth", %status, "Login form was not answered with a redirect");
      return Err(AuthError::InvalidCredentialsOrFlow { status });
    }
    location_of(&resp).ok_or(AuthError::InvalidCredentialsOrFlow { status })
  }

  async fn exchange_ticket_for_token(&self, session: &AuthSession, ticket_url: Url, referer: &str) -> Result<String, AuthError> {
    let max = self.cfg.max_redirects;
    let mut current = ticket_url;
    let mut referer = referer.to_string();

    for hop in 1..=max {
      let resp = session.get(current.clone(), Some(referer.as_str()), "redirect hop").await?;
      let status = resp.status();

      if is_redirect(status) {
        let next = location_of(&resp).ok_or_else(|| AuthError::MissingLocation { url: current.to_string() })?;
        if let Some(token) = token_from_fragment(&next) {
          info!(target: "auth", hop, "Token found in redirect fragment");
          return Ok(token);
        }
        debug!(target: "auth", hop, %status, next = %next, "Following redirect");
        referer = current.to_string();
        current = next;
        continue;
      }

      debug!(target: "auth", hop, %status, "Redirect chain ended; checking cookies");
      let origin = Url::parse(&self.cfg.quiz_origin)
        .map_err(|source| AuthError::BadUrl { url: self.cfg.quiz_origin.clone(), source })?;
      return match session.cookie(&origin, AUTH_COOKIE) {
        Some(token) if !token.is_empty() => {
          info!(target: "auth", "Token found in cookie jar");
          Ok(token)
        }
        _ => Err(AuthError::TokenNotFound),
      };
    }

    Err(AuthError::TooManyRedirects { max })
  }
}

/// Extract the crypto key and execution token; `None` if either is missing or empty.
pub fn parse_login_page(html: &str) -> Option<LoginTokens> {
  let doc = Html::parse_document(html);
  let text_of = |css: &str| -> Option<String> {
    let sel = Selector::parse(css).ok()?;
    let text: String = doc.select(&sel).flat_map(|el| el.text()).collect();
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
  };
  Some(LoginTokens {
    crypto_key: text_of("p#login-croypto")?,
    execution: text_of("#login-page-flowkey")?,
  })
}

/// `token` from a URL fragment such as `#/?token=abc` or `#token=abc&x=1`.
pub fn token_from_fragment(url: &Url) -> Option<String> {
  let fragment = url.fragment()?;
  if !fragment.contains("token=") {
    return None;
  }
  let query = fragment.rsplit_once('?').map_or(fragment, |(_, q)| q);
  url::form_urlencoded::parse(query.as_bytes())
    .find(|(k, _)| k == "token")
    .map(|(_, v)| v.into_owned())
    .filter(|v| !v.is_empty())
}

fn is_redirect(status: StatusCode) -> bool {
  matches!(
    status,
    StatusCode::MOVED_PERMANENTLY
      | StatusCode::FOUND
      | StatusCode::SEE_OTHER
      | StatusCode::TEMPORARY_REDIRECT
      | StatusCode::PERMANENT_REDIRECT
  )
}

/// Location header resolved against the response URL.
fn location_of(resp: &Response) -> Option<Url> {
  let raw = resp.headers().get(LOCATION)?.to_str().ok()?;
  resp.url().join(raw).ok()
}
