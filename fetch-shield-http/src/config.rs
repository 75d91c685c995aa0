//! Transport configuration
//!
//! Connection-level settings for [`HttpTransport`](crate::HttpTransport).
//! Retry behaviour lives in the pipeline, not here.

use crate::error::{HttpError, HttpResult};
use std::time::Duration;

/// Connection settings for one [`HttpTransport`](crate::HttpTransport).
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Prefix for request URLs that are not absolute. `None` means every
    /// request must carry an absolute URL.
    pub base_url: Option<String>,
    pub auth: AuthConfig,
    /// Upper bound on one exchange; a request's `timeout_ms` option wins.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// Emit request and response bodies at debug level.
    pub enable_logging: bool,
    /// Sent with every request, before per-request headers.
    pub default_headers: Vec<(String, String)>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            auth: AuthConfig::None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("fetch-shield/{}", env!("CARGO_PKG_VERSION")),
            enable_logging: false,
            default_headers: Vec::new(),
        }
    }
}

impl HttpTransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Default::default()
        }
    }

    /// Validating builder rooted at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> HttpTransportConfigBuilder {
        HttpTransportConfigBuilder {
            config: Self::new(base_url),
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }

    /// Append a default header. Repeated names are all sent.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Rejects a blank, unparsable or non-HTTP base URL and zero timeouts.
    pub fn validate(&self) -> HttpResult<()> {
        if let Some(base_url) = &self.base_url {
            if base_url.trim().is_empty() {
                return Err(HttpError::ConfigurationError(
                    "base_url must not be blank".to_string(),
                ));
            }
            let parsed = url::Url::parse(base_url)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(HttpError::ConfigurationError(format!(
                    "base_url must be http or https, got {}",
                    parsed.scheme()
                )));
            }
        }

        if self.timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(HttpError::ConfigurationError(
                "timeouts must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Credentials attached to every outgoing request. Never part of a
/// request's signature.
#[derive(Debug, Clone, Default)]
pub enum AuthConfig {
    #[default]
    None,
    /// Sent verbatim as the `Authorization` header.
    ApiKey(String),
    /// Sent as `Authorization: Bearer <token>`.
    BearerToken(String),
    /// HTTP basic auth; the password may be omitted.
    Basic {
        username: String,
        password: Option<String>,
    },
}

impl AuthConfig {
    pub fn is_configured(&self) -> bool {
        !matches!(self, AuthConfig::None)
    }
}

/// Builds an [`HttpTransportConfig`] and validates it on [`build`](Self::build).
#[derive(Debug)]
pub struct HttpTransportConfigBuilder {
    config: HttpTransportConfig,
}

impl HttpTransportConfigBuilder {
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.config.auth = auth;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn logging(mut self, enable: bool) -> Self {
        self.config.enable_logging = enable;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> HttpResult<HttpTransportConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
