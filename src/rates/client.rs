use super::catalog::ProviderCatalog;
use super::types::{ProviderConfig, ProviderType, RateDocument, normalize_base_url};
use crate::config::PollingConfig;
use crate::error::{Result, UtilityCostsError};
use crate::logging::{StructuredLogger, get_logger};
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// User-Agent sent with every backend request
pub const USER_AGENT: &str = concat!("utility-costs/", env!("APP_VERSION"));

/// What the wizard learns from a successful validation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationInfo {
    /// Entry title, e.g. "Electric Rates (CEMC)"
    pub title: String,
    /// `utility` (electric) or `provider_name` (water) from the response
    pub utility: Option<String>,
}

/// Source of rate documents and provider listings
#[async_trait::async_trait]
pub trait RateFetcher: Send + Sync {
    /// Steady-state fetch of the provider's rate document
    async fn fetch(&self, provider: &ProviderConfig) -> Result<RateDocument>;

    /// Setup-time check that the provider's rates endpoint works
    async fn validate(&self, provider: &ProviderConfig) -> Result<ValidationInfo>;

    /// List providers the backend offers for a utility type
    async fn discover_providers(
        &self,
        base_url: &str,
        token: Option<&str>,
        provider_type: ProviderType,
    ) -> Result<ProviderCatalog>;
}

/// Which call a request belongs to; decides the human-readable 404 cause
#[derive(Debug, Clone, Copy)]
enum Purpose<'a> {
    Rates { provider_key: &'a str },
    Discovery,
}

/// HTTP client for the rates backend
#[derive(Debug, Clone)]
pub struct RateClient {
    http: reqwest::Client,
    request_timeout: Duration,
    validation_timeout: Duration,
    logger: StructuredLogger,
}

impl RateClient {
    /// Build a client with the configured timeouts
    pub fn new(polling: &PollingConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                UtilityCostsError::config(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            request_timeout: polling.request_timeout(),
            validation_timeout: polling.validation_timeout(),
            logger: get_logger("rates"),
        })
    }

    /// Override both timeouts
    pub fn with_timeouts(mut self, request_timeout: Duration, validation_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self.validation_timeout = validation_timeout;
        self
    }

    async fn get_json(
        &self,
        url: &str,
        token: Option<&str>,
        timeout: Duration,
        purpose: Purpose<'_>,
    ) -> Result<Value> {
        self.logger.debug(&format!("GET {}", url));

        let mut request = self
            .http
            .get(url)
            .timeout(timeout)
            .header(ACCEPT, "application/json");
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        self.logger
            .debug(&format!("Response status {} from {}", status.as_u16(), url));
        if status != StatusCode::OK {
            self.logger
                .error(&format!("HTTP {} from {}", status.as_u16(), url));
            return Err(UtilityCostsError::http(
                status.as_u16(),
                url,
                status_cause(status, purpose),
            ));
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_decode() {
                UtilityCostsError::schema(format!("Response from {} is not valid JSON: {}", url, e))
            } else {
                transport_error(url, &e)
            }
        })
    }
}

fn transport_error(url: &str, err: &reqwest::Error) -> UtilityCostsError {
    if err.is_timeout() {
        UtilityCostsError::connection(format!("Timed out fetching {}", url))
    } else {
        UtilityCostsError::connection(format!("Error fetching {}: {}", url, err))
    }
}

fn status_cause(status: StatusCode, purpose: Purpose<'_>) -> String {
    match (status, purpose) {
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
            "Unauthorized - check your API token".to_string()
        }
        (StatusCode::NOT_FOUND, Purpose::Rates { provider_key }) => {
            format!("Provider '{}' not found on backend", provider_key)
        }
        (StatusCode::NOT_FOUND, Purpose::Discovery) => {
            "API endpoint not found - check your API URL".to_string()
        }
        (status, _) => format!(
            "Backend returned HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        ),
    }
}

#[async_trait::async_trait]
impl RateFetcher for RateClient {
    async fn fetch(&self, provider: &ProviderConfig) -> Result<RateDocument> {
        let url = provider.rates_url();
        let body = self
            .get_json(
                &url,
                provider.token.as_deref(),
                self.request_timeout,
                Purpose::Rates {
                    provider_key: &provider.provider_key,
                },
            )
            .await?;
        RateDocument::parse(body, provider.provider_type)
    }

    async fn validate(&self, provider: &ProviderConfig) -> Result<ValidationInfo> {
        let url = provider.rates_url();
        self.logger.debug(&format!(
            "Validating {} provider at: {}",
            provider.provider_type, url
        ));
        let body = self
            .get_json(
                &url,
                provider.token.as_deref(),
                self.validation_timeout,
                Purpose::Rates {
                    provider_key: &provider.provider_key,
                },
            )
            .await?;
        let document = RateDocument::parse(body, provider.provider_type)?;

        let utility_key = match provider.provider_type {
            ProviderType::Electric => "utility",
            ProviderType::Water => "provider_name",
        };
        Ok(ValidationInfo {
            title: format!(
                "{} Rates ({})",
                provider.provider_type.label(),
                provider.provider_key.to_uppercase()
            ),
            utility: document.str_field(utility_key).map(str::to_string),
        })
    }

    async fn discover_providers(
        &self,
        base_url: &str,
        token: Option<&str>,
        provider_type: ProviderType,
    ) -> Result<ProviderCatalog> {
        let url = format!(
            "{}{}",
            normalize_base_url(base_url),
            provider_type.discovery_path()
        );
        let body = self
            .get_json(&url, token, self.validation_timeout, Purpose::Discovery)
            .await
            .inspect_err(|e| {
                self.logger.warn(&format!(
                    "Failed to fetch {} providers from {}: {}",
                    provider_type, url, e
                ));
            })?;
        let catalog = ProviderCatalog::from_discovery(&body, provider_type);
        if catalog.fallback {
            self.logger.info(&format!(
                "No {} providers listed at {}; using built-in table",
                provider_type, url
            ));
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_version() {
        assert!(USER_AGENT.starts_with("utility-costs/"));
        assert!(USER_AGENT.len() > "utility-costs/".len());
    }

    #[test]
    fn test_status_cause_messages() {
        let rates = Purpose::Rates {
            provider_key: "cemc",
        };
        assert_eq!(
            status_cause(StatusCode::UNAUTHORIZED, rates),
            "Unauthorized - check your API token"
        );
        assert_eq!(
            status_cause(StatusCode::NOT_FOUND, rates),
            "Provider 'cemc' not found on backend"
        );
        assert_eq!(
            status_cause(StatusCode::NOT_FOUND, Purpose::Discovery),
            "API endpoint not found - check your API URL"
        );
        assert_eq!(
            status_cause(StatusCode::BAD_GATEWAY, Purpose::Discovery),
            "Backend returned HTTP 502: Bad Gateway"
        );
    }
}
