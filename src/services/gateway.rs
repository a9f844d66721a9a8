use crate::constants::{auth as auth_constants, network};
use crate::errors::GatewayError;
use crate::services::auth::SessionAuthenticator;
use crate::services::config::Config;
use crate::services::credentials::{CredentialResolver, Credentials};
use crate::services::envelope::Envelope;
use crate::services::logger::Logger;
use crate::services::session::ConversationContext;
use crate::utils::redact::redact_text;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// One upstream call, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    fn is_mutating(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH)
    }
}

/// Successful upstream response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub body: Value,
    pub headers: Map<String, Value>,
    pub status_code: u16,
}

impl ApiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_str())
    }

    /// `items` of a paged body, or the body itself when it is a bare list.
    pub fn items(&self) -> Vec<Value> {
        match &self.body {
            Value::Array(items) => items.clone(),
            Value::Object(map) => map
                .get("items")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "body": self.body,
            "headers": self.headers,
            "status_code": self.status_code,
        })
    }
}

/// Authenticated dispatcher in front of the NextGen REST API.
#[derive(Clone)]
pub struct NextGenGateway {
    logger: Logger,
    resolver: CredentialResolver,
    authenticator: SessionAuthenticator,
    client: Client,
    timeout: Duration,
}

impl NextGenGateway {
    pub fn new(logger: Logger, config: Arc<Config>) -> Self {
        let client = Client::builder()
            .user_agent(network::USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());
        let timeout = config.request_timeout;
        Self {
            authenticator: SessionAuthenticator::new(logger.clone(), client.clone(), timeout),
            logger: logger.child("gateway"),
            resolver: CredentialResolver::new(config),
            client,
            timeout,
        }
    }

    pub fn credentials(&self, ctx: &ConversationContext) -> Credentials {
        self.resolver.resolve(ctx)
    }

    /// Dispatches `request` and wraps the outcome as `{success, message}` where a
    /// successful `message` is `{body, headers, status_code}`.
    pub async fn request_envelope(&self, ctx: &ConversationContext, request: ApiRequest) -> Envelope {
        match self.request(ctx, request).await {
            Ok(response) => Envelope::success().with_message(response.to_value()),
            Err(err) => err.into(),
        }
    }

    pub async fn request(
        &self,
        ctx: &ConversationContext,
        request: ApiRequest,
    ) -> Result<ApiResponse, GatewayError> {
        let creds = self.resolver.resolve(ctx);

        let (token, session_id) = {
            let mut session = ctx.session().lock().await;
            let Some(token) = self.authenticator.ensure_token(&mut session, &creds).await else {
                return Err(GatewayError::Unauthenticated);
            };
            let Some(session_id) = self
                .authenticator
                .ensure_session_id(&mut session, &creds, &token)
                .await
            else {
                return Err(GatewayError::Unauthenticated);
            };
            (token, session_id)
        };

        let url = creds
            .endpoint_url(&request.endpoint)
            .ok_or_else(|| GatewayError::Unexpected("base URL is not configured".to_string()))?;
        let headers = build_headers(&token, &session_id, request.is_mutating())?;

        self.logger.info(
            "Making API request",
            Some(&serde_json::json!({ "method": request.method.as_str(), "url": url })),
        );

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match tokio::time::timeout(self.timeout, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Err(self.unexpected(format!("request failed: {}", err))),
            Err(_) => {
                return Err(self.unexpected(format!(
                    "request timed out after {} ms",
                    self.timeout.as_millis()
                )))
            }
        };

        let status = response.status();
        let response_headers = headers_to_map(response.headers());
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => return Err(self.unexpected(format!("failed to read body: {}", err))),
        };

        if !status.is_success() {
            if text.to_lowercase().contains("session") {
                let cleared = ctx
                    .session()
                    .lock()
                    .await
                    .invalidate_session_id(&session_id);
                if cleared {
                    self.logger.warn(
                        "Invalid session error detected, cleared cached session id",
                        Some(&serde_json::json!({ "conversation": ctx.id() })),
                    );
                }
            }
            self.logger.error(
                "API request failed",
                Some(&serde_json::json!({
                    "status": status.as_u16(),
                    "body": redact_text(&text, 2048),
                })),
            );
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let body = if status == StatusCode::CREATED
            || status == StatusCode::NO_CONTENT
            || text.trim().is_empty()
        {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(&text)
                .map_err(|err| self.unexpected(format!("response is not valid JSON: {}", err)))?
        };

        self.logger.info(
            "API request successful",
            Some(&serde_json::json!({ "status": status.as_u16() })),
        );
        Ok(ApiResponse {
            body,
            headers: response_headers,
            status_code: status.as_u16(),
        })
    }

    fn unexpected(&self, detail: String) -> GatewayError {
        self.logger.error(
            "Unexpected error during API request",
            Some(&serde_json::json!({ "error": detail })),
        );
        GatewayError::Unexpected(detail)
    }
}

fn build_headers(token: &str, session_id: &str, mutating: bool) -> Result<HeaderMap, GatewayError> {
    let invalid = |what: &str| GatewayError::Unexpected(format!("{} is not a valid header value", what));
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| invalid("access token"))?,
    );
    headers.insert(
        auth_constants::SESSION_HEADER,
        HeaderValue::from_str(session_id).map_err(|_| invalid("session id"))?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if mutating {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    Ok(headers)
}

fn headers_to_map(headers: &HeaderMap) -> Map<String, Value> {
    let mut out = Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");
        out.insert(name.as_str().to_string(), Value::String(joined));
    }
    out
}
