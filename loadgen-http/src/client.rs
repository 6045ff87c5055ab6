//! HTTP client implementation

use crate::config::HttpConfig;
use crate::errors::HttpError;
use crate::types::{HttpRequest, HttpResponse};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, trace};
use url::Url;

/// HTTP client trait for making HTTP requests
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// Send a request and return the response, whatever its status
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// reqwest-backed client bound to one base URL.
///
/// The underlying connection pool is shared by clones, so one manager can
/// serve every concurrent iteration.
#[derive(Debug, Clone)]
pub struct HttpManager {
    client: Client,
    base_url: Url,
    config: HttpConfig,
}

impl HttpManager {
    /// Create a manager with default configuration
    pub fn new(base_url: &str) -> Result<Self, HttpError> {
        Self::with_config(base_url, HttpConfig::default())
    }

    /// Create a manager with specific configuration
    pub fn with_config(base_url: &str, config: HttpConfig) -> Result<Self, HttpError> {
        let base_url = Url::parse(base_url).map_err(|e| HttpError::InvalidUrl(e.to_string()))?;

        debug!(
            "Creating HttpManager for {} with timeout: {:?}",
            base_url, config.timeout
        );

        let client = Client::builder()
            .default_headers(header_map(&config.default_headers)?)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.idle_timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .build()?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Resolve a request path against the base URL
    pub fn resolve(&self, path: &str) -> Result<Url, HttpError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path).map_err(|e| HttpError::InvalidUrl(e.to_string()));
        }

        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{}/{}", base, path)).map_err(|e| HttpError::InvalidUrl(e.to_string()))
    }
}

#[async_trait::async_trait]
impl HttpClient for HttpManager {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut url = self.resolve(&request.path)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        trace!("Building {} request to {}", request.method, url);

        let mut builder = self
            .client
            .request(request.method.into(), url)
            .headers(header_map(request.headers.iter().map(|(name, value)| (name, value)))?);

        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();

        let body = response.text().await?;
        trace!("HTTP response received: {} ({} bytes)", status, body.len());

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn header_map<'a>(headers: impl IntoIterator<Item = (&'a String, &'a String)>) -> Result<HeaderMap, HttpError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name = HeaderName::from_str(name).map_err(|_| HttpError::InvalidHeaderName(name.clone()))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| HttpError::InvalidHeaderValue(name.clone()))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}
