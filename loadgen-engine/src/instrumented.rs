//! HTTP client that records the built-in request metrics

use async_trait::async_trait;
use loadgen_http::{HttpClient, HttpError, HttpRequest, HttpResponse};
use loadgen_metrics::{Counter, Rate, Trend};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use crate::metrics::EngineMetrics;

/// Wraps any [`HttpClient`] and records `http_reqs`, `http_req_duration`
/// and `http_req_failed` for every request sent through it
#[derive(Clone)]
pub struct InstrumentedClient {
    inner: Arc<dyn HttpClient>,
    reqs: Counter,
    duration: Trend,
    failed: Rate,
}

impl InstrumentedClient {
    pub fn new(inner: Arc<dyn HttpClient>, metrics: &EngineMetrics) -> Self {
        Self {
            inner,
            reqs: metrics.http_reqs.clone(),
            duration: metrics.http_req_duration.clone(),
            failed: metrics.http_req_failed.clone(),
        }
    }
}

#[async_trait]
impl HttpClient for InstrumentedClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let method = request.method;
        let path = request.path.clone();

        let start = Instant::now();
        let result = self.inner.send(request).await;
        let elapsed = start.elapsed();

        self.reqs.increment();
        self.duration.add_duration(elapsed);
        match &result {
            Ok(response) => {
                self.failed.add(response.status >= 400);
                debug!(
                    method = %method,
                    path = %path,
                    status = response.status,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "HTTP request completed"
                );
            }
            Err(error) => {
                self.failed.add(true);
                debug!(
                    method = %method,
                    path = %path,
                    timeout = error.is_timeout(),
                    connect = error.is_connect(),
                    "HTTP request failed: {}",
                    error
                );
            }
        }

        result
    }
}
