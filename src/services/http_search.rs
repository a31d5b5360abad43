use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use reqwest::{Client, StatusCode, header::HeaderMap, header::RETRY_AFTER};
use serde::Deserialize;
use tracing::instrument;

use crate::ports::search::{SearchError, SearchFilter, SearchHit, TargetSearch};

/// Search endpoints answer with a bare array or a `{ "results": [...] }` envelope
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Hits(Vec<SearchHit>),
    Envelope {
        #[serde(default)]
        results: Vec<SearchHit>,
    },
}

impl From<SearchResponse> for Vec<SearchHit> {
    fn from(response: SearchResponse) -> Self {
        match response {
            SearchResponse::Hits(hits) => hits,
            SearchResponse::Envelope { results } => results,
        }
    }
}

fn parse_body(body: &[u8]) -> Result<Vec<SearchHit>, SearchError> {
    serde_json::from_slice::<SearchResponse>(body)
        .map(Vec::from)
        .map_err(|e| SearchError::Decode(e.to_string()))
}

/// `Retry-After` in seconds; HTTP-date values are ignored
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn map_request_error(error: reqwest::Error) -> SearchError {
    if error.is_timeout() {
        SearchError::Timeout
    } else if error.is_decode() {
        SearchError::Decode(error.to_string())
    } else {
        SearchError::Transport(error.to_string())
    }
}

/// `TargetSearch` over a JSON search endpoint:
/// `GET {endpoint}?q=<query>&filter=<songs|videos>&limit=<n>`
pub struct HttpSearchClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSearchClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("track-resolver/", env!("CARGO_PKG_VERSION")))
            .build()
            .wrap_err("Failed to build search HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl TargetSearch for HttpSearchClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn search(
        &self,
        query: &str,
        filter: SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let mut request = self.client.get(&self.endpoint).query(&[
            ("q", query.to_string()),
            ("filter", filter.as_str().to_string()),
            ("limit", limit.to_string()),
        ]);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(map_request_error)?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after(response.headers());
            tracing::warn!(retry_after = ?retry_after, "Search endpoint rate limited us");
            return Err(SearchError::RateLimited { retry_after });
        }
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Search endpoint returned an error");
            return Err(SearchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(map_request_error)?;
        let hits = parse_body(&body)?;
        tracing::debug!(hits = hits.len(), "Search endpoint answered");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_parses_bare_array() {
        let body = br#"[
            {"videoId": "abc", "title": "Song", "artists": [{"name": "Artist"}],
             "duration": "3:54", "videoType": "MUSIC_VIDEO_TYPE_ATV"}
        ]"#;
        let hits = parse_body(body).unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].video_id.as_deref(), Some("abc"));
        assert_eq!(hits[0].artists[0].name, "Artist");
        assert_eq!(hits[0].duration.as_deref(), Some("3:54"));
        assert_eq!(hits[0].video_type.as_deref(), Some("MUSIC_VIDEO_TYPE_ATV"));
    }

    #[test]
    fn test_parses_results_envelope() {
        let body = br#"{"results": [{"id": "xyz", "title": "Other", "duration_seconds": 200}]}"#;
        let hits = parse_body(body).unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].video_id.as_deref(), Some("xyz"));
        assert_eq!(hits[0].duration_seconds, Some(200));
        assert!(hits[0].artists.is_empty());
    }

    #[test]
    fn test_rejects_garbage_body() {
        assert!(matches!(
            parse_body(b"<html>nope</html>"),
            Err(SearchError::Decode(_))
        ));
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(30)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_blank_api_key_is_dropped() {
        let client =
            HttpSearchClient::new("http://localhost/search", Some("  ".into()), Duration::from_secs(5))
                .unwrap();
        assert!(client.api_key.is_none());
        assert_eq!(client.endpoint(), "http://localhost/search");
    }
}
