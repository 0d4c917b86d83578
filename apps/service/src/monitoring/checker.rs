use anyhow::Result;
use std::error::Error as _;
use std::time::Instant;

use super::types::CheckResult;
use crate::database::models::Monitor;

/// Probe a monitor once. Implementations must be safe to call concurrently
/// for different monitors and must never return early with an error: a failed
/// probe is a `down` [`CheckResult`], not an `Err`.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, monitor: &Monitor) -> CheckResult;
}

/// HTTP/HTTPS checker
///
/// One shared client (and connection pool) serves every monitor. The timeout
/// is set per request from the monitor's interval, so a check never outlives
/// the gap until its next tick.
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("upbeat/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, monitor: &Monitor) -> CheckResult {
        let start = Instant::now();

        let response = self.client.get(&monitor.url).timeout(monitor.interval()).send().await;

        match response {
            Ok(response) => {
                let latency = start.elapsed().as_millis() as u64;
                let status = response.status();
                let detail = describe_status(status);

                // Anything below 400 counts, including redirects the client did not follow
                if status.as_u16() < 400 {
                    CheckResult::up(monitor, latency, detail)
                } else {
                    CheckResult::rejected(monitor, latency, detail)
                }
            }
            Err(e) => CheckResult::failure(monitor, describe_error(&e, monitor.interval_seconds)),
        }
    }
}

fn describe_status(status: reqwest::StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

fn describe_error(error: &reqwest::Error, interval_seconds: u64) -> String {
    if error.is_timeout() {
        return format!("Request timed out after {interval_seconds}s");
    }

    // reqwest's top-level message hides the cause (DNS, refused, TLS...)
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::MonitorStatus;
    use std::time::Duration;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn monitor(url: String, interval_seconds: u64) -> Monitor {
        Monitor::new(Uuid::new_v4(), "test".to_string(), url, interval_seconds)
    }

    #[tokio::test]
    async fn test_http_check_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let checker = HttpChecker::new().unwrap();
        let m = monitor(format!("{}/health", server.uri()), 10);
        let result = checker.check(&m).await;

        assert_eq!(result.status, MonitorStatus::Up);
        assert_eq!(result.detail, "200 OK");
        assert_eq!(result.monitor_id, m.id);
        assert!(result.latency_ms < 10_000);
    }

    #[tokio::test]
    async fn test_http_check_server_error_is_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let checker = HttpChecker::new().unwrap();
        let result = checker.check(&monitor(server.uri(), 10)).await;

        assert_eq!(result.status, MonitorStatus::Down);
        assert_eq!(result.detail, "503 Service Unavailable");
        assert!(result.latency_ms < 10_000);
    }

    #[tokio::test]
    async fn test_http_check_client_error_boundary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/moved"))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let checker = HttpChecker::new().unwrap();
        let missing = checker.check(&monitor(format!("{}/missing", server.uri()), 10)).await;
        let moved = checker.check(&monitor(format!("{}/moved", server.uri()), 10)).await;

        assert_eq!(missing.status, MonitorStatus::Down);
        assert_eq!(moved.status, MonitorStatus::Up);
    }

    #[tokio::test]
    async fn test_http_check_unreachable_reports_sentinel_latency() {
        // Bind then drop a listener so the port is known to be closed
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let checker = HttpChecker::new().unwrap();
        let result = checker.check(&monitor(format!("http://127.0.0.1:{port}/"), 10)).await;

        assert_eq!(result.status, MonitorStatus::Down);
        assert_eq!(result.latency_ms, 10_000);
        assert!(!result.detail.is_empty());
    }

    #[tokio::test]
    async fn test_http_check_timeout_is_bounded_by_interval() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let checker = HttpChecker::new().unwrap();
        let m = monitor(server.uri(), 1);
        let started = Instant::now();
        let result = checker.check(&m).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result.status, MonitorStatus::Down);
        assert_eq!(result.latency_ms, 1_000);
        assert_eq!(result.detail, "Request timed out after 1s");
    }
}
