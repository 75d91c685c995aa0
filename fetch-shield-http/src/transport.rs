//! HTTP transport implementation
//!
//! Sends a [`Request`] with `reqwest` and classifies the result: a 2xx status
//! is a success, anything else (non-2xx, timeout, connection or decode
//! failure) is a [`TransportError`] for the pipeline to retry.
//!
//! Two keys of [`RequestOptions::extra`](fetch_shield_core::RequestOptions)
//! are honoured per request: `headers` (an object of string values) and
//! `timeout_ms` (a positive integer overriding the configured timeout).

use crate::config::{AuthConfig, HttpTransportConfig};
use crate::error::{classify_reqwest_error, status_error, HttpError, HttpResult};
use async_trait::async_trait;
use fetch_shield_core::{HttpMethod, Request, Response, Transport, TransportError};
use reqwest::{header, Client, Method, RequestBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// `reqwest`-backed [`Transport`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: Arc<HttpTransportConfig>,
}

impl HttpTransport {
    /// Create a new transport with the given configuration
    pub fn new(config: HttpTransportConfig) -> HttpResult<Self> {
        config.validate()?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        for (name, value) in &config.default_headers {
            let header_name = header::HeaderName::try_from(name.as_str()).map_err(|e| {
                HttpError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            let header_value = header::HeaderValue::try_from(value.as_str()).map_err(|e| {
                HttpError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            headers.insert(header_name, header_value);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Transport with default settings and no base URL
    pub fn with_defaults() -> HttpResult<Self> {
        Self::new(HttpTransportConfig::default())
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    /// Resolve a request URL against the configured base URL
    pub fn url(&self, path: &str) -> Result<String, TransportError> {
        let path = path.trim();
        if url::Url::parse(path).is_ok() {
            return Ok(path.to_string());
        }

        match &self.config.base_url {
            Some(base) => {
                let base = base.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                Ok(format!("{}/{}", base, path))
            }
            None => Err(TransportError::other(format!(
                "relative URL {path:?} with no base URL configured"
            ))),
        }
    }

    fn build_request(&self, request: &Request) -> Result<RequestBuilder, TransportError> {
        let url = self.url(request.url())?;
        let mut builder = self.client.request(to_reqwest_method(request.method()), &url);

        builder = self.add_auth(builder);

        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }

        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let extra = &request.options().extra;
        if let Some(headers) = extra.get("headers").and_then(|v| v.as_object()) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    builder = builder.header(name.as_str(), value);
                }
            }
        }
        if let Some(timeout_ms) = extra.get("timeout_ms").and_then(|v| v.as_u64()) {
            if timeout_ms > 0 {
                builder = builder.timeout(Duration::from_millis(timeout_ms));
            }
        }

        if self.config.enable_logging {
            debug!("Request: {} {}", request.method(), url);
            if let Some(body) = request.body() {
                debug!("Request body: {}", body);
            }
        }

        Ok(builder)
    }

    /// Add authentication to a request
    fn add_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth {
            AuthConfig::None => request,
            AuthConfig::ApiKey(key) => request.header(header::AUTHORIZATION, key),
            AuthConfig::BearerToken(token) => request.bearer_auth(token),
            AuthConfig::Basic { username, password } => {
                request.basic_auth(username, password.as_ref())
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let builder = self.build_request(request)?;
        let response = builder
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if self.config.enable_logging {
            debug!("Response {}: {}", status, String::from_utf8_lossy(&body));
        }

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body));
        }

        Ok(Response {
            status: status.as_u16(),
            headers,
            body: body.to_vec(),
        })
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
    }
}
