use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tfplug::Context;

use super::common::{ApiErrorBody, ApiResponse};
use super::error::ApiError;

const API_KEY_ID_HEADER: &str = "x-api-key-id";
const API_KEY_HEADER: &str = "x-api-key";

/// How the API key is presented to the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    /// `X-API-Key-ID` + `X-API-Key` headers
    ApiKey,
    /// `Authorization: Bearer <key>`
    Bearer,
}

impl AuthType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "api-key" => Some(AuthType::ApiKey),
            "bearer" => Some(AuthType::Bearer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Everything needed to build a [`Client`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_key_id: Option<String>,
    pub auth_type: AuthType,
    pub skip_ssl_verify: bool,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl ClientConfig {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            api_key_id: None,
            auth_type: AuthType::ApiKey,
            skip_ssl_verify: false,
            request_timeout: Duration::from_secs(60),
            retry: RetryConfig::default(),
        }
    }
}

/// CloudSec REST API client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    base_url: String,
    retry_config: RetryConfig,
    timeout_seconds: u64,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let parsed = url::Url::parse(&config.base_url)
            .map_err(|e| ApiError::InvalidConfig(format!("invalid API URL: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::InvalidConfig(format!(
                "unsupported URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let http_client = reqwest::Client::builder()
            .default_headers(auth_headers(&config)?)
            .danger_accept_invalid_certs(config.skip_ssl_verify)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                retry_config: config.retry,
                timeout_seconds: config.request_timeout.as_secs(),
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Platform API (asset groups)
    pub fn platform(&self) -> crate::api::platform::PlatformApi<'_> {
        crate::api::platform::PlatformApi::new(self)
    }

    /// Cloud onboarding API (cloud accounts)
    pub fn cloud_onboarding(&self) -> crate::api::cloudonboarding::CloudOnboardingApi<'_> {
        crate::api::cloudonboarding::CloudOnboardingApi::new(self)
    }

    /// Cloud workload protection API (policies)
    pub fn cwp(&self) -> crate::api::cwp::CwpApi<'_> {
        crate::api::cwp::CwpApi::new(self)
    }

    /// Application security API (integrations)
    pub fn appsec(&self) -> crate::api::appsec::AppSecApi<'_> {
        crate::api::appsec::AppSecApi::new(self)
    }

    pub async fn get<T: DeserializeOwned>(&self, ctx: &Context, path: &str) -> Result<T, ApiError> {
        self.execute_with_retry(ctx, || self.request(Method::GET, path, None::<&()>), path)
            .await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        ctx: &Context,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_with_retry(ctx, || self.request(Method::POST, path, Some(body)), path)
            .await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        ctx: &Context,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_with_retry(ctx, || self.request(Method::PUT, path, Some(body)), path)
            .await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        ctx: &Context,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_with_retry(ctx, || self.request(Method::PATCH, path, Some(body)), path)
            .await
    }

    /// DELETE ignores any response body
    pub async fn delete(&self, ctx: &Context, path: &str) -> Result<(), ApiError> {
        self.execute_with_retry::<_, _, serde_json::Value>(
            ctx,
            || self.request(Method::DELETE, path, None::<&()>),
            path,
        )
        .await
        .map(|_| ())
    }

    async fn request<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let url = format!("{}{}", self.inner.base_url, path);
        tracing::debug!(method = method.as_str(), %url, "API request");

        let mut builder = self.inner.http_client.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder.send().await
    }

    /// Execute request with retry logic, giving up early when `ctx` is cancelled
    async fn execute_with_retry<F, Fut, T>(
        &self,
        ctx: &Context,
        request_fn: F,
        path: &str,
    ) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
        T: DeserializeOwned,
    {
        let retry = &self.inner.retry_config;
        let mut attempt = 0;
        let mut last_error = None;

        while attempt <= retry.max_retries {
            if attempt > 0 {
                let backoff = std::cmp::min(
                    retry.initial_backoff.saturating_mul(2_u32.saturating_pow(attempt - 1)),
                    retry.max_backoff,
                );
                tracing::warn!(
                    path,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying API request"
                );
                tokio::select! {
                    _ = ctx.cancelled() => return Err(ApiError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }

            let result = tokio::select! {
                _ = ctx.cancelled() => return Err(ApiError::Cancelled),
                result = request_fn() => result,
            };

            match result {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return self.parse_success_response(response).await;
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(ApiError::RateLimited);
                    } else if status.is_server_error() {
                        last_error = Some(ApiError::ServiceUnavailable);
                    } else {
                        return Err(self.handle_error_response(response, path).await);
                    }
                }
                Err(e) => {
                    if e.is_timeout() {
                        last_error = Some(ApiError::Timeout(self.inner.timeout_seconds));
                    } else if e.is_connect() {
                        last_error = Some(ApiError::ServiceUnavailable);
                    } else {
                        return Err(ApiError::RequestError(e));
                    }
                }
            }

            attempt += 1;
        }

        Err(last_error.unwrap_or(ApiError::ServiceUnavailable))
    }

    async fn parse_success_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let text = response.text().await?;
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };

        match serde_json::from_str::<ApiResponse<T>>(text) {
            Ok(wrapper) => Ok(wrapper.data),
            Err(_) => serde_json::from_str::<T>(text).map_err(|e| {
                tracing::error!(error = %e, "failed to deserialize API response");
                ApiError::ParseError(e.to_string())
            }),
        }
    }

    async fn handle_error_response(&self, response: reqwest::Response, path: &str) -> ApiError {
        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .ok()
            .and_then(ApiErrorBody::into_message)
            .unwrap_or(text);

        match status {
            reqwest::StatusCode::NOT_FOUND => ApiError::NotFound(path.to_string()),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                ApiError::AuthError(status.as_u16())
            }
            _ => ApiError::Status {
                status: status.as_u16(),
                message,
            },
        }
    }
}

fn auth_headers(config: &ClientConfig) -> Result<HeaderMap, ApiError> {
    let header_value = |value: &str| {
        let mut value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::InvalidConfig(format!("invalid header value: {}", e)))?;
        value.set_sensitive(true);
        Ok::<_, ApiError>(value)
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!(
            "terraform-provider-cloudsec/",
            env!("CARGO_PKG_VERSION")
        )),
    );

    match config.auth_type {
        AuthType::Bearer => {
            headers.insert(
                AUTHORIZATION,
                header_value(&format!("Bearer {}", config.api_key))?,
            );
        }
        AuthType::ApiKey => {
            if let Some(id) = &config.api_key_id {
                headers.insert(API_KEY_ID_HEADER, header_value(id)?);
            }
            headers.insert(API_KEY_HEADER, header_value(&config.api_key)?);
        }
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Thing {
        name: String,
    }

    fn config(url: &str) -> ClientConfig {
        let mut config = ClientConfig::new(url, "secret");
        config.api_key_id = Some("key-id".to_string());
        config.retry = RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        };
        config
    }

    #[tokio::test]
    async fn client_sends_api_key_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/things/1")
            .match_header("x-api-key-id", "key-id")
            .match_header("x-api-key", "secret")
            .with_body(r#"{"name":"one"}"#)
            .create_async()
            .await;

        let client = Client::new(config(&server.url())).unwrap();
        let thing: Thing = client.get(&Context::new(), "/api/v1/things/1").await.unwrap();

        assert_eq!(thing.name, "one");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_sends_bearer_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/things/1")
            .match_header("authorization", "Bearer secret")
            .match_header("x-api-key", Matcher::Missing)
            .with_body(r#"{"data":{"name":"wrapped"}}"#)
            .create_async()
            .await;

        let mut config = config(&server.url());
        config.auth_type = AuthType::Bearer;
        let client = Client::new(config).unwrap();
        let thing: Thing = client.get(&Context::new(), "/api/v1/things/1").await.unwrap();

        assert_eq!(thing.name, "wrapped");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_maps_404_to_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/things/missing")
            .with_status(404)
            .with_body(r#"{"message":"not found"}"#)
            .create_async()
            .await;

        let client = Client::new(config(&server.url())).unwrap();
        let result: Result<Thing, _> = client.get(&Context::new(), "/api/v1/things/missing").await;

        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn client_retries_rate_limited_requests() {
        let mut server = Server::new_async().await;
        let limited = server
            .mock("GET", "/api/v1/things/1")
            .with_status(429)
            .expect(3)
            .create_async()
            .await;

        let client = Client::new(config(&server.url())).unwrap();
        let result: Result<Thing, _> = client.get(&Context::new(), "/api/v1/things/1").await;

        assert!(matches!(result, Err(ApiError::RateLimited)));
        limited.assert_async().await;
    }

    #[tokio::test]
    async fn client_reports_api_error_message() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/things")
            .with_status(400)
            .with_body(r#"{"message":"name is required"}"#)
            .create_async()
            .await;

        let client = Client::new(config(&server.url())).unwrap();
        let result: Result<Thing, _> = client
            .post(&Context::new(), "/api/v1/things", &serde_json::json!({}))
            .await;

        match result {
            Err(ApiError::Status { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "name is required");
            }
            other => panic!("Expected Status error, got {:?}", other.map(|t| t.name)),
        }
    }

    #[tokio::test]
    async fn client_delete_accepts_empty_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/api/v1/things/1")
            .with_status(204)
            .create_async()
            .await;

        let client = Client::new(config(&server.url())).unwrap();
        client.delete(&Context::new(), "/api/v1/things/1").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_stops_when_context_cancelled() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/things/1")
            .with_status(503)
            .create_async()
            .await;

        let mut config = config(&server.url());
        config.retry.initial_backoff = Duration::from_secs(30);
        config.retry.max_backoff = Duration::from_secs(30);
        let client = Client::new(config).unwrap();

        let ctx = Context::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result: Result<Thing, _> = client.get(&ctx, "/api/v1/things/1").await;
        assert!(matches!(result, Err(ApiError::Cancelled)));
    }

    #[test]
    fn client_rejects_invalid_url() {
        assert!(matches!(
            Client::new(ClientConfig::new("not a url", "secret")),
            Err(ApiError::InvalidConfig(_))
        ));
        assert!(matches!(
            Client::new(ClientConfig::new("ftp://example.com", "secret")),
            Err(ApiError::InvalidConfig(_))
        ));
    }

    #[test]
    fn auth_type_parses_known_values() {
        assert_eq!(AuthType::parse("api-key"), Some(AuthType::ApiKey));
        assert_eq!(AuthType::parse("bearer"), Some(AuthType::Bearer));
        assert_eq!(AuthType::parse("basic"), None);
    }
}
