// HTTP job executor: bounded retry loop and audit delivery

use crate::errors::ExecutionError;
use crate::models::{
    is_success_status, AuditRecord, HttpJobPayload, HttpMethod, JobDocument, JobRecord,
};
use crate::retry::{NoDelay, RetryStrategy};
use crate::telemetry;
use chrono::Utc;
use reqwest::{Client, Method};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Executes HTTP callout jobs
pub struct HttpJobExecutor {
    client: Client,
    retry_strategy: Arc<dyn RetryStrategy>,
}

impl HttpJobExecutor {
    /// Create an executor whose attempts time out after `timeout_seconds`
    pub fn new(timeout_seconds: u64) -> Result<Self, ExecutionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ExecutionError::ClientInitFailed(e.to_string()))?;

        Ok(Self {
            client,
            retry_strategy: Arc::new(NoDelay),
        })
    }

    /// Wait between attempts as dictated by `strategy`
    pub fn with_retry_strategy(mut self, strategy: Arc<dyn RetryStrategy>) -> Self {
        self.retry_strategy = strategy;
        self
    }

    fn convert_method(method: &HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Options => Method::OPTIONS,
        }
    }

    /// Run `record` once: attempt the call up to `maxTrial` times, then log
    /// and deliver the audit record. Never fails; the outcome is the audit.
    #[instrument(skip_all, fields(job_id = %record.id, job = %record.key))]
    pub async fn run(&self, record: &JobRecord, payload: &HttpJobPayload) -> AuditRecord {
        let start_time = Utc::now();
        let max_trial = payload.max_trial.max(1);
        let mut trial_count = 1;
        let mut last_response: Option<(u16, Option<String>)> = None;

        loop {
            match self.attempt(payload).await {
                Ok((status, body)) => {
                    let success = is_success_status(status);
                    telemetry::record_http_attempt(if success { "success" } else { "failure" });
                    last_response = Some((status, body));
                    if success {
                        debug!(trial = trial_count, status, "Attempt succeeded");
                        break;
                    }
                    warn!(trial = trial_count, status, "Attempt returned a non-success status");
                }
                Err(e) => {
                    telemetry::record_http_attempt("error");
                    warn!(trial = trial_count, error = %e, "Attempt failed");
                }
            }

            if trial_count >= max_trial {
                break;
            }
            let delay = self.retry_strategy.next_delay(trial_count);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            trial_count += 1;
        }

        let end_time = Utc::now();
        let (response_code, response_body) = match last_response {
            Some((code, body)) => (Some(code), body),
            None => (None, None),
        };
        let audit = AuditRecord {
            request: JobDocument::from(record),
            response_code,
            response_body,
            start_time,
            end_time,
            trial_count,
        };

        let elapsed = (end_time - start_time).to_std().unwrap_or_default();
        telemetry::record_job_duration(&record.key.group, elapsed.as_secs_f64());
        if audit.is_success() {
            telemetry::record_job_success(&record.key.group);
        } else {
            telemetry::record_job_failure(&record.key.group);
        }

        info!(
            success = audit.is_success(),
            response_code = ?audit.response_code,
            trial_count = audit.trial_count,
            audit = %serde_json::to_string(&audit).unwrap_or_default(),
            "Job run finished"
        );

        if let Some(audit_url) = &payload.audit_url {
            if let Err(e) = self.deliver_audit(audit_url, payload, &audit).await {
                telemetry::record_audit_delivery_failure();
                warn!(audit_url = %audit_url, error = %e, "Audit delivery failed");
            }
        }

        audit
    }

    /// One attempt: returns the status and body of whatever response came back.
    ///
    /// A body that cannot be read is reported as absent; the status still counts.
    async fn attempt(
        &self,
        payload: &HttpJobPayload,
    ) -> Result<(u16, Option<String>), ExecutionError> {
        let mut request = self
            .client
            .request(Self::convert_method(&payload.method), &payload.url);

        for (name, value) in &payload.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &payload.body {
            request = request.body(body.clone());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(status, error = %e, "Failed to read response body");
                None
            }
        };
        Ok((status, body))
    }

    async fn deliver_audit(
        &self,
        audit_url: &str,
        payload: &HttpJobPayload,
        audit: &AuditRecord,
    ) -> Result<(), ExecutionError> {
        let mut request = self.client.post(audit_url).json(audit);
        for (name, value) in &payload.audit_headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExecutionError::AuditDeliveryFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ExecutionError::AuditDeliveryFailed(format!(
                "audit sink answered with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobKey, JobPayload};
    use crate::retry::FixedDelay;
    use crate::trigger::Trigger;
    use serde_json::Value;
    use std::time::Instant;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn job(payload: HttpJobPayload) -> JobRecord {
        JobRecord::new(
            JobKey::new("billing", "callout").unwrap(),
            vec![Trigger::Immediate],
            JobPayload::Http(payload),
        )
    }

    fn executor() -> HttpJobExecutor {
        HttpJobExecutor::new(5).unwrap()
    }

    async fn run(payload: HttpJobPayload) -> AuditRecord {
        let record = job(payload.clone());
        executor().run(&record, &payload).await
    }

    #[test]
    fn test_convert_method() {
        assert_eq!(HttpJobExecutor::convert_method(&HttpMethod::Get), Method::GET);
        assert_eq!(HttpJobExecutor::convert_method(&HttpMethod::Post), Method::POST);
        assert_eq!(
            HttpJobExecutor::convert_method(&HttpMethod::Options),
            Method::OPTIONS
        );
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200).set_body_string("done"))
            .expect(1)
            .mount(&server)
            .await;

        let audit = run(HttpJobPayload::new(format!("{}/hook", server.uri()))).await;

        assert!(audit.is_success());
        assert_eq!(audit.trial_count, 1);
        assert_eq!(audit.response_code, Some(200));
        assert_eq!(audit.response_body.as_deref(), Some("done"));
        assert!(audit.start_time <= audit.end_time);
    }

    #[tokio::test]
    async fn test_request_carries_method_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/hook"))
            .and(header("X-Trace", "abc"))
            .and(body_string("{\"hello\":\"world\"}"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut payload = HttpJobPayload::new(format!("{}/hook", server.uri()));
        payload.method = HttpMethod::Put;
        payload.body = Some("{\"hello\":\"world\"}".to_string());
        payload.headers.insert("X-Trace".to_string(), "abc".to_string());

        let audit = run(payload).await;
        assert_eq!(audit.response_code, Some(204));
        assert!(audit.is_success());
    }

    #[tokio::test]
    async fn test_failing_endpoint_is_attempted_max_trial_times() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(3)
            .mount(&server)
            .await;

        let mut payload = HttpJobPayload::new(format!("{}/hook", server.uri()));
        payload.max_trial = 3;

        let audit = run(payload).await;
        assert!(!audit.is_success());
        assert_eq!(audit.trial_count, 3);
        assert_eq!(audit.response_code, Some(500));
        assert_eq!(audit.response_body.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_status_outside_success_range_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(206))
            .expect(2)
            .mount(&server)
            .await;

        let mut payload = HttpJobPayload::new(server.uri());
        payload.max_trial = 2;

        let audit = run(payload).await;
        assert_eq!(audit.trial_count, 2);
        assert!(!audit.is_success());
    }

    #[tokio::test]
    async fn test_retry_stops_at_first_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(2)
            .expect(1)
            .mount(&server)
            .await;

        let mut payload = HttpJobPayload::new(server.uri());
        payload.max_trial = 5;

        let audit = run(payload).await;
        assert_eq!(audit.trial_count, 2);
        assert_eq!(audit.response_code, Some(200));
    }

    #[tokio::test]
    async fn test_transport_failures_leave_no_response() {
        // Nothing listens on the discard port
        let mut payload = HttpJobPayload::new("http://127.0.0.1:9/hook");
        payload.max_trial = 2;

        let audit = run(payload).await;
        assert_eq!(audit.trial_count, 2);
        assert_eq!(audit.response_code, None);
        assert_eq!(audit.response_body, None);
        assert!(!audit.is_success());
    }

    /// Answers every connection with a 200 whose body is cut short
    async fn truncated_body_server() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial")
                    .await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/hook", addr)
    }

    #[tokio::test]
    async fn test_unreadable_body_keeps_status() {
        let mut payload = HttpJobPayload::new(truncated_body_server().await);
        payload.max_trial = 3;

        let audit = run(payload).await;
        assert_eq!(audit.trial_count, 1);
        assert_eq!(audit.response_code, Some(200));
        assert_eq!(audit.response_body, None);
        assert!(audit.is_success());
    }

    #[tokio::test]
    async fn test_retry_strategy_delays_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let mut payload = HttpJobPayload::new(server.uri());
        payload.max_trial = 3;
        let record = job(payload.clone());
        let executor = executor().with_retry_strategy(Arc::new(FixedDelay::new(
            Duration::from_millis(50),
        )));

        let started = Instant::now();
        let audit = executor.run(&record, &payload).await;

        assert_eq!(audit.trial_count, 3);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_audit_is_posted_once_with_audit_headers() {
        let target = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&target)
            .await;

        let sink = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audit"))
            .and(header("X-Audit-Token", "secret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&sink)
            .await;

        let mut payload = HttpJobPayload::new(target.uri());
        payload.max_trial = 2;
        payload.headers.insert("X-Trace".to_string(), "abc".to_string());
        payload.audit_url = Some(format!("{}/audit", sink.uri()));
        payload
            .audit_headers
            .insert("X-Audit-Token".to_string(), "secret".to_string());

        run(payload).await;

        let received = sink.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get("x-trace").is_none());

        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["responseCode"], 500);
        assert_eq!(body["trialCount"], 2);
        assert_eq!(body["request"]["name"], "callout");
        assert_eq!(body["request"]["group"], "billing");
        assert!(body.get("startTime").is_some());
        assert!(body.get("endTime").is_some());
    }

    #[tokio::test]
    async fn test_audit_delivery_failure_is_swallowed() {
        let target = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&target)
            .await;

        let sink = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&sink)
            .await;

        let mut payload = HttpJobPayload::new(target.uri());
        payload.audit_url = Some(sink.uri());

        let audit = run(payload).await;
        assert!(audit.is_success());
    }

    #[tokio::test]
    async fn test_no_audit_post_without_audit_url() {
        let target = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&target)
            .await;

        let audit = run(HttpJobPayload::new(target.uri())).await;

        assert!(audit.is_success());
        assert_eq!(target.received_requests().await.unwrap().len(), 1);
    }
}
