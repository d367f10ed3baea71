use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use log::{debug, info};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::checker::ReputationSource;
use super::error::CheckError;
use super::verdict::Verdict;
use crate::config::CheckerConfig;
use crate::error::DomainWatchError;

const MAX_ERROR_MESSAGE_LEN: usize = 200;

/// Reputation source speaking the VirusTotal v3 URL API.
///
/// A URL the provider already knows is answered from its last analysis. An
/// unknown URL is submitted and the resulting analysis polled until it
/// completes or the poll budget runs out.
pub struct VirusTotalSource {
    client: Client,
    api_url: String,
    api_key: String,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisStats {
    #[serde(default)]
    malicious: u64,
    #[serde(default)]
    suspicious: u64,
}

impl From<AnalysisStats> for Verdict {
    fn from(stats: AnalysisStats) -> Self {
        Verdict::from_counts(stats.malicious, stats.suspicious)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct UrlObject {
    attributes: UrlAttributes,
}

#[derive(Debug, Deserialize)]
struct UrlAttributes {
    last_analysis_stats: Option<AnalysisStats>,
}

#[derive(Debug, Deserialize)]
struct SubmittedAnalysis {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AnalysisObject {
    attributes: AnalysisAttributes,
}

#[derive(Debug, Deserialize)]
struct AnalysisAttributes {
    status: String,
    #[serde(default)]
    stats: AnalysisStats,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

impl VirusTotalSource {
    pub fn new(
        api_url: &str,
        api_key: &str,
        request_timeout: Duration,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Result<Self, DomainWatchError> {
        let client = Client::builder()
            .user_agent(concat!("domainwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .connect_timeout(request_timeout / 2)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| DomainWatchError::Error(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            poll_interval,
            max_polls: max_polls.max(1),
        })
    }

    pub fn from_config(config: &CheckerConfig) -> Result<Self, DomainWatchError> {
        Self::new(
            &config.api_url,
            &config.api_key,
            config.timeout(),
            config.poll_interval(),
            config.max_polls,
        )
    }

    /// Identifier the provider uses for a URL: unpadded url-safe base64
    fn url_id(url: &Url) -> String {
        URL_SAFE_NO_PAD.encode(url.as_str())
    }

    async fn lookup(&self, url: &Url) -> Result<Option<Verdict>, CheckError> {
        let response = self
            .client
            .get(format!("{}/urls/{}", self.api_url, Self::url_id(url)))
            .header("x-apikey", &self.api_key)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let report: Envelope<UrlObject> = response.json().await?;
                Ok(report.data.attributes.last_analysis_stats.map(Verdict::from))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(classify_failure(response).await),
        }
    }

    async fn submit(&self, url: &Url) -> Result<String, CheckError> {
        let response = self
            .client
            .post(format!("{}/urls", self.api_url))
            .header("x-apikey", &self.api_key)
            .form(&[("url", url.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_failure(response).await);
        }

        let submitted: Envelope<SubmittedAnalysis> = response.json().await?;
        Ok(submitted.data.id)
    }

    async fn poll_analysis(&self, analysis_id: &str) -> Result<Verdict, CheckError> {
        for attempt in 0..self.max_polls {
            if attempt > 0 {
                tokio::time::sleep(self.poll_interval).await;
            }

            let response = self
                .client
                .get(format!("{}/analyses/{}", self.api_url, analysis_id))
                .header("x-apikey", &self.api_key)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(classify_failure(response).await);
            }

            let analysis: Envelope<AnalysisObject> = response.json().await?;
            let attributes = analysis.data.attributes;
            if attributes.status == "completed" {
                return Ok(attributes.stats.into());
            }

            debug!(
                "Analysis {} is '{}' (poll {} of {})",
                analysis_id,
                attributes.status,
                attempt + 1,
                self.max_polls
            );
        }

        Err(CheckError::AnalysisPending)
    }
}

#[async_trait]
impl ReputationSource for VirusTotalSource {
    async fn analyze(&self, url: &Url) -> Result<Verdict, CheckError> {
        if let Some(verdict) = self.lookup(url).await? {
            return Ok(verdict);
        }

        info!("{} is unknown to the provider, submitting for analysis", url);
        let analysis_id = self.submit(url).await?;
        self.poll_analysis(&analysis_id).await
    }

    fn name(&self) -> &str {
        "virustotal"
    }
}

/// Maps a non-success provider response onto a [`CheckError`]
async fn classify_failure(response: Response) -> CheckError {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return CheckError::RateLimited;
    }
    if status.is_server_error() {
        return CheckError::Upstream(status.as_u16());
    }

    let body = response.text().await.unwrap_or_default();
    let mut message = serde_json::from_str::<ProviderError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    if message.len() > MAX_ERROR_MESSAGE_LEN {
        let mut cut = MAX_ERROR_MESSAGE_LEN;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }

    CheckError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reputation::VerdictKind;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const API_KEY: &str = "test-key";

    fn source_for(server: &MockServer, max_polls: u32) -> VirusTotalSource {
        VirusTotalSource::new(
            &server.uri(),
            API_KEY,
            Duration::from_secs(5),
            Duration::from_millis(10),
            max_polls,
        )
        .unwrap()
    }

    fn target() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    fn url_path() -> String {
        format!("/urls/{}", VirusTotalSource::url_id(&target()))
    }

    #[test]
    fn test_url_id_is_unpadded_url_safe_base64() {
        let id = VirusTotalSource::url_id(&target());
        assert_eq!(id, "aHR0cHM6Ly9leGFtcGxlLmNvbS8");
        assert!(!id.contains('='));
    }

    #[tokio::test]
    async fn test_known_url_uses_last_analysis() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(url_path()))
            .and(header("x-apikey", API_KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"attributes": {"last_analysis_stats": {
                    "harmless": 70, "malicious": 2, "suspicious": 1, "undetected": 9
                }}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let verdict = source_for(&server, 3).analyze(&target()).await.unwrap();
        assert_eq!(verdict.kind(), VerdictKind::Malicious);
        assert!(!verdict.suspicious());
    }

    #[tokio::test]
    async fn test_unknown_url_is_submitted_and_polled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(url_path()))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "NotFoundError", "message": "URL not found"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/urls"))
            .and(body_string_contains("url=https"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"type": "analysis", "id": "u-abc-123"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/analyses/u-abc-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"attributes": {"status": "queued", "stats": {}}}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/analyses/u-abc-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"attributes": {"status": "completed",
                    "stats": {"malicious": 0, "suspicious": 4}}}
            })))
            .mount(&server)
            .await;

        let verdict = source_for(&server, 5).analyze(&target()).await.unwrap();
        assert_eq!(verdict.kind(), VerdictKind::Suspicious);
    }

    #[tokio::test]
    async fn test_analysis_still_queued_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(url_path()))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/urls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"type": "analysis", "id": "u-slow"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/analyses/u-slow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"attributes": {"status": "queued"}}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let err = source_for(&server, 2).analyze(&target()).await.unwrap_err();
        assert_eq!(err, CheckError::AnalysisPending);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_rate_limit_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(url_path()))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = source_for(&server, 1).analyze(&target()).await.unwrap_err();
        assert_eq!(err, CheckError::RateLimited);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(url_path()))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = source_for(&server, 1).analyze(&target()).await.unwrap_err();
        assert_eq!(err, CheckError::Upstream(503));
    }

    #[tokio::test]
    async fn test_bad_api_key_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(url_path()))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": "WrongCredentialsError", "message": "Wrong API key"}
            })))
            .mount(&server)
            .await;

        let err = source_for(&server, 1).analyze(&target()).await.unwrap_err();
        assert_eq!(
            err,
            CheckError::Rejected {
                status: 401,
                message: "Wrong API key".to_string()
            }
        );
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_body_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(url_path()))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = source_for(&server, 1).analyze(&target()).await.unwrap_err();
        assert!(matches!(err, CheckError::MalformedResponse(_)));
        assert!(!err.is_transient());
    }
}
