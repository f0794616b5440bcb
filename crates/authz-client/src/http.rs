//! HTTP adapter for the remote decision service.
//!
//! Wire contract: `POST {endpoint}/v1/check` and `POST {endpoint}/v1/tuple/create`
//! with a bearer token. Responses carry a `status` string and an optional
//! `result` object. Transport failures, 408, 429 and 5xx are transient and
//! retried with exponential backoff; malformed bodies and other statuses
//! are surfaced immediately.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use scoped_rag_core_types::{Action, ResourceId, Subject, Verdict};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::errors::AuthzError;
use crate::policy::{BackoffCfg, RetryPolicy};
use crate::retry::RetryState;
use crate::secret::SecretString;
use crate::tuples::{EntityRef, Tuple};
use crate::{validate_request, AuthorizationClient, TupleWriter};

pub const DEFAULT_DOMAIN: &str = "aws.us.pangea.cloud";
/// Per-attempt budget; several attempts must fit inside one filter check.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);
const CHECK_PATH: &str = "v1/check";
const TUPLE_CREATE_PATH: &str = "v1/tuple/create";
const STATUS_SUCCESS: &str = "Success";
const MAX_ERROR_BODY: usize = 256;

#[derive(Serialize)]
struct CheckRequest<'a> {
    subject: EntityRef,
    action: &'a str,
    resource: EntityRef,
}

#[derive(Serialize)]
struct TupleCreateRequest<'a> {
    tuples: &'a [Tuple],
}

#[derive(Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    summary: Option<String>,
    result: Option<T>,
}

#[derive(Deserialize)]
struct CheckResult {
    allowed: bool,
}

pub struct HttpAuthorizationClient {
    client: reqwest::Client,
    endpoint: Url,
    token: SecretString,
    subject_type: String,
    resource_type: String,
    retry: RetryPolicy,
    backoff: BackoffCfg,
}

impl HttpAuthorizationClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<Envelope<T>, AuthzError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self
            .endpoint
            .join(path)
            .map_err(|err| AuthzError::InvalidRequest(format!("invalid path {path}: {err}")))?;
        let mut retry_state = RetryState::new();

        let raw = loop {
            match self.send_once(&url, body).await {
                Ok(raw) => break raw,
                Err(err) if err.is_transient() => {
                    let Some(delay) = retry_state.next_delay(&self.retry, &self.backoff) else {
                        warn!(
                            target = "authz-client",
                            %url,
                            retries = retry_state.retries(),
                            "giving up on authorization request: {err}"
                        );
                        return Err(err);
                    };
                    debug!(
                        target = "authz-client",
                        %url,
                        ?delay,
                        "transient authorization failure, retrying: {err}"
                    );
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        };

        let envelope: Envelope<T> = serde_json::from_str(&raw)
            .map_err(|err| AuthzError::MalformedDecision(format!("undecodable response: {err}")))?;
        if envelope.status != STATUS_SUCCESS {
            return Err(AuthzError::Rejected {
                status: StatusCode::OK.as_u16(),
                message: envelope
                    .summary
                    .clone()
                    .unwrap_or_else(|| envelope.status.clone()),
            });
        }
        Ok(envelope)
    }

    async fn send_once<B>(&self, url: &Url, body: &B) -> Result<String, AuthzError>
    where
        B: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(self.token.expose())
            .json(body)
            .send()
            .await
            .map_err(|err| AuthzError::ServiceUnavailable(format!("request error: {err}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| AuthzError::ServiceUnavailable(format!("response body error: {err}")))?;

        if status.is_success() {
            return Ok(text);
        }
        if is_transient_status(status) {
            return Err(AuthzError::ServiceUnavailable(format!(
                "upstream returned status {status}"
            )));
        }
        Err(AuthzError::Rejected {
            status: status.as_u16(),
            message: truncate(&text, MAX_ERROR_BODY),
        })
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

fn truncate(raw: &str, limit: usize) -> String {
    match raw.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &raw[..idx]),
        None => raw.to_string(),
    }
}

#[async_trait]
impl AuthorizationClient for HttpAuthorizationClient {
    async fn check(
        &self,
        subject: &Subject,
        action: Action,
        resource: &ResourceId,
    ) -> Result<Verdict, AuthzError> {
        validate_request(subject, resource)?;
        let request = CheckRequest {
            subject: EntityRef {
                kind: self.subject_type.clone(),
                id: subject.as_str().to_string(),
            },
            action: action.as_str(),
            resource: EntityRef {
                kind: self.resource_type.clone(),
                id: resource.as_str().to_string(),
            },
        };
        let envelope: Envelope<CheckResult> = self.post(CHECK_PATH, &request).await?;
        let result = envelope
            .result
            .ok_or_else(|| AuthzError::MalformedDecision("response has no result".into()))?;
        Ok(if result.allowed {
            Verdict::Allow
        } else {
            Verdict::Deny
        })
    }
}

#[async_trait]
impl TupleWriter for HttpAuthorizationClient {
    async fn create_tuples(&self, tuples: &[Tuple]) -> Result<(), AuthzError> {
        if tuples.is_empty() {
            return Ok(());
        }
        let request = TupleCreateRequest { tuples };
        let _: Envelope<serde_json::Value> = self.post(TUPLE_CREATE_PATH, &request).await?;
        Ok(())
    }
}

pub struct HttpClientBuilder {
    endpoint: Option<Url>,
    domain: String,
    token: SecretString,
    subject_type: String,
    resource_type: String,
    request_timeout: Duration,
    retry: RetryPolicy,
    backoff: BackoffCfg,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            endpoint: None,
            domain: DEFAULT_DOMAIN.to_string(),
            token: SecretString::default(),
            subject_type: "user".to_string(),
            resource_type: "file".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
            backoff: BackoffCfg::default(),
        }
    }
}

impl HttpClientBuilder {
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Derives `https://authz.{domain}` when no explicit endpoint is set.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = token;
        self
    }

    pub fn with_entity_types(
        mut self,
        subject_type: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        self.subject_type = subject_type.into();
        self.resource_type = resource_type.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy, backoff: BackoffCfg) -> Self {
        self.retry = retry;
        self.backoff = backoff;
        self
    }

    pub fn build(self) -> Result<HttpAuthorizationClient, AuthzError> {
        if self.token.is_empty() {
            return Err(AuthzError::InvalidRequest(
                "authorization service token is not configured".into(),
            ));
        }
        let endpoint = match self.endpoint {
            Some(endpoint) => endpoint,
            None => Url::parse(&format!("https://authz.{}", self.domain)).map_err(|err| {
                AuthzError::InvalidRequest(format!("invalid domain {}: {err}", self.domain))
            })?,
        };
        let endpoint = with_trailing_slash(endpoint);
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(self.request_timeout)
            .timeout(self.request_timeout)
            .build()
            .map_err(|err| {
                AuthzError::InvalidRequest(format!("failed to build http client: {err}"))
            })?;
        Ok(HttpAuthorizationClient {
            client,
            endpoint,
            token: self.token,
            subject_type: self.subject_type,
            resource_type: self.resource_type,
            retry: self.retry,
            backoff: self.backoff,
        })
    }
}

// `Url::join` replaces the last segment unless the base ends with '/'.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
