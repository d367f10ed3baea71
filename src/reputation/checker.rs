use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::error::CheckError;
use super::verdict::Verdict;

/// An external source of URL reputation data.
///
/// Implementations only need to answer for a single, already validated URL.
/// Timeouts are enforced by [`ReputationChecker`], not by the source.
#[async_trait]
pub trait ReputationSource: Send + Sync {
    async fn analyze(&self, url: &Url) -> Result<Verdict, CheckError>;

    /// Short provider name used in log messages
    fn name(&self) -> &str;
}

/// Runs one bounded reputation check against a [`ReputationSource`].
#[derive(Clone)]
pub struct ReputationChecker {
    source: Arc<dyn ReputationSource>,
    timeout: Duration,
}

impl ReputationChecker {
    pub fn new(source: Arc<dyn ReputationSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn check(&self, raw_url: &str) -> Result<Verdict, CheckError> {
        let url = parse_check_url(raw_url)?;

        debug!("Checking {} with {}", url, self.source.name());

        match tokio::time::timeout(self.timeout, self.source.analyze(&url)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Reputation check for {} timed out after {:?}",
                    url, self.timeout
                );
                Err(CheckError::Timeout)
            }
        }
    }
}

/// Validates a URL handed to the checker: it must be absolute, use http or
/// https and name a host.
pub fn parse_check_url(raw_url: &str) -> Result<Url, CheckError> {
    let trimmed = raw_url.trim();
    let url = Url::parse(trimmed).map_err(|_| CheckError::InvalidUrl(trimmed.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(CheckError::InvalidUrl(trimmed.to_string()));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(CheckError::InvalidUrl(trimmed.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowSource {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReputationSource for SlowSource {
        async fn analyze(&self, _url: &Url) -> Result<Verdict, CheckError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Verdict::SAFE)
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn checker_with_delay(delay: Duration, timeout: Duration) -> (ReputationChecker, Arc<SlowSource>) {
        let source = Arc::new(SlowSource {
            delay,
            calls: AtomicUsize::new(0),
        });
        (ReputationChecker::new(source.clone(), timeout), source)
    }

    #[test]
    fn test_parse_check_url() {
        assert!(parse_check_url("https://example.com/").is_ok());
        assert!(parse_check_url("  http://example.com  ").is_ok());

        assert!(matches!(
            parse_check_url("example.com"),
            Err(CheckError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_check_url("ftp://example.com/"),
            Err(CheckError::InvalidUrl(_))
        ));
        assert!(matches!(parse_check_url(""), Err(CheckError::InvalidUrl(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_returns_source_verdict() {
        let (checker, source) = checker_with_delay(Duration::from_millis(10), Duration::from_secs(5));

        let verdict = checker.check("https://example.com/").await.unwrap();
        assert_eq!(verdict, Verdict::SAFE);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_times_out() {
        let (checker, _source) = checker_with_delay(Duration::from_secs(60), Duration::from_secs(1));

        let err = checker.check("https://example.com/").await.unwrap_err();
        assert_eq!(err, CheckError::Timeout);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_invalid_url_never_reaches_source() {
        let (checker, source) = checker_with_delay(Duration::ZERO, Duration::from_secs(1));

        let err = checker.check("not a url").await.unwrap_err();
        assert!(matches!(err, CheckError::InvalidUrl(_)));
        assert!(!err.is_transient());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
