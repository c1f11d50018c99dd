use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants::constants;

/// A timestamped sub-clip of a video whose subtitle text matched the query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Match {
  pub start: f64,
  pub end: f64,
  pub text: String,
}

/// One search hit: a video and the matches inside it, in playback order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VideoResult {
  pub id: String,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub matches: Vec<Match>,
}

/// One fetched batch of videos plus the token for the batch after it.
/// A missing token means the backend has nothing further.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
  pub videos: Vec<VideoResult>,
  pub next_page_token: Option<String>,
}

/// Form body posted to the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
  pub query: String,
  pub language: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
  #[error("search backend rate limit reached")]
  RateLimited,
  #[error("search backend returned HTTP {0}")]
  Status(u16),
  #[error("search request failed: {0}")]
  Transport(String),
  #[error("malformed search response: {0}")]
  Decode(String),
  #[error("search task ended without a result")]
  TaskFailed,
}

impl SearchError {
  /// Message shown in the error banner.
  pub fn user_message(&self) -> &'static str {
    match self {
      SearchError::RateLimited => "Search quota exceeded. Please try again later.",
      _ => "Search failed. Please try again.",
    }
  }
}

/// Anything that can answer a paginated search request.
pub trait SearchBackend: Send + Sync + 'static {
  fn search(&self, request: SearchRequest) -> impl Future<Output = Result<ResultPage, SearchError>> + Send;
}

#[derive(Deserialize)]
struct SearchResponse {
  #[serde(default)]
  videos: Option<Vec<VideoResult>>,
  #[serde(default)]
  next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
  error: Option<String>,
  message: Option<String>,
}

/// Decode a search response body into a page.
///
/// Videos without any match are dropped since there is nothing to play, and an
/// empty continuation token is treated the same as a missing one.
pub fn parse_response(body: &str) -> Result<ResultPage, SearchError> {
  let response: SearchResponse = serde_json::from_str(body).map_err(|e| SearchError::Decode(e.to_string()))?;
  let videos: Vec<VideoResult> = response
    .videos
    .unwrap_or_default()
    .into_iter()
    .filter(|v| {
      if v.matches.is_empty() {
        debug!(video_id = %v.id, "search: dropping video without matches");
        return false;
      }
      true
    })
    .collect();
  let next_page_token = response.next_page_token.filter(|t| !t.is_empty());
  Ok(ResultPage { videos, next_page_token })
}

/// HTTP client for the `/search` endpoint of the backend.
pub struct SearchClient {
  http: Client,
  endpoint: String,
}

impl SearchClient {
  pub fn new(server: &str) -> Result<Self> {
    let http = Client::builder()
      .timeout(Duration::from_secs(constants().request_timeout_secs))
      .build()
      .context("Failed to build HTTP client")?;
    Ok(Self { http, endpoint: search_endpoint(server) })
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }
}

fn search_endpoint(server: &str) -> String {
  format!("{}/search", server.trim_end_matches('/'))
}

impl SearchBackend for SearchClient {
  async fn search(&self, request: SearchRequest) -> Result<ResultPage, SearchError> {
    info!(
      query = %request.query,
      language = %request.language,
      page_token = request.page_token.as_deref().unwrap_or(""),
      "search: sending request"
    );

    let response = self
      .http
      .post(&self.endpoint)
      .form(&request)
      .send()
      .await
      .map_err(|e| SearchError::Transport(e.to_string()))?;

    let status = response.status();
    let body = response.text().await.map_err(|e| SearchError::Transport(e.to_string()))?;

    match status {
      StatusCode::TOO_MANY_REQUESTS => {
        warn!(body = %body, "search: rate limited");
        Err(SearchError::RateLimited)
      }
      // The backend answers "nothing matched" with 404.
      StatusCode::NOT_FOUND => {
        info!(detail = %error_detail(&body).unwrap_or_default(), "search: backend found no videos");
        Ok(ResultPage::default())
      }
      s if s.is_success() => {
        let page = parse_response(&body)?;
        info!(videos = page.videos.len(), has_more = page.next_page_token.is_some(), "search: page received");
        Ok(page)
      }
      s => {
        warn!(status = s.as_u16(), detail = %error_detail(&body).unwrap_or_default(), "search: backend error");
        Err(SearchError::Status(s.as_u16()))
      }
    }
  }
}

/// Pull the human-readable detail out of a backend error body, if any.
fn error_detail(body: &str) -> Option<String> {
  let parsed: ErrorBody = serde_json::from_str(body).ok()?;
  parsed.error.or(parsed.message)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_single_page() {
    let page = parse_response(
      r#"{"videos":[{"id":"v1","matches":[{"start":0,"end":5,"text":"hello world"}]}],"next_page_token":"t2"}"#,
    )
    .unwrap();
    assert_eq!(page.videos.len(), 1);
    assert_eq!(page.videos[0].id, "v1");
    assert_eq!(page.videos[0].matches[0], Match { start: 0.0, end: 5.0, text: "hello world".to_string() });
    assert_eq!(page.next_page_token.as_deref(), Some("t2"));
  }

  #[test]
  fn parse_tolerates_extra_fields() {
    let page = parse_response(
      r#"{"videos":[{"id":"v1","title":"Talk","thumbnail":"x","match_score":2,
          "transcript":[{"text":"a","start":0,"duration":1}],
          "matches":[{"start":1.5,"end":4.25,"text":"a"}]}],"next_page_token":""}"#,
    )
    .unwrap();
    assert_eq!(page.videos[0].title.as_deref(), Some("Talk"));
    assert_eq!(page.videos[0].matches[0].end, 4.25);
  }

  #[test]
  fn parse_empty_token_means_exhausted() {
    let page = parse_response(r#"{"videos":[],"next_page_token":""}"#).unwrap();
    assert!(page.videos.is_empty());
    assert!(page.next_page_token.is_none());
  }

  #[test]
  fn parse_missing_fields() {
    let page = parse_response(r#"{"message":"No videos found with matching transcripts."}"#).unwrap();
    assert_eq!(page, ResultPage::default());
  }

  #[test]
  fn parse_drops_videos_without_matches() {
    let page = parse_response(
      r#"{"videos":[{"id":"a","matches":[]},{"id":"b","matches":[{"start":0,"end":1,"text":"x"}]}],
          "next_page_token":"n"}"#,
    )
    .unwrap();
    assert_eq!(page.videos.len(), 1);
    assert_eq!(page.videos[0].id, "b");
  }

  #[test]
  fn parse_garbage_is_decode_error() {
    assert!(matches!(parse_response("<html>oops</html>"), Err(SearchError::Decode(_))));
  }

  #[test]
  fn request_form_omits_missing_token() {
    let first = SearchRequest { query: "rust lang".into(), language: "".into(), page_token: None };
    assert_eq!(serde_json::to_value(&first).unwrap(), serde_json::json!({"query": "rust lang", "language": ""}));

    let next = SearchRequest { page_token: Some("t2".into()), ..first };
    assert_eq!(serde_json::to_value(&next).unwrap()["page_token"], "t2");
  }

  #[test]
  fn endpoint_strips_trailing_slash() {
    assert_eq!(search_endpoint("http://localhost:5000/"), "http://localhost:5000/search");
    assert_eq!(search_endpoint("http://localhost:5000"), "http://localhost:5000/search");
  }

  #[test]
  fn error_detail_reads_error_or_message() {
    assert_eq!(error_detail(r#"{"error":"quota"}"#).as_deref(), Some("quota"));
    assert_eq!(error_detail(r#"{"message":"none"}"#).as_deref(), Some("none"));
    assert_eq!(error_detail("not json"), None);
  }

  #[test]
  fn user_messages_distinguish_rate_limit() {
    assert_eq!(SearchError::RateLimited.user_message(), "Search quota exceeded. Please try again later.");
    assert_eq!(SearchError::Status(500).user_message(), "Search failed. Please try again.");
    assert_eq!(SearchError::Transport("reset".into()).user_message(), SearchError::TaskFailed.user_message());
  }
}
