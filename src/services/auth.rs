use crate::constants::auth as auth_constants;
use crate::errors::AuthError;
use crate::services::credentials::Credentials;
use crate::services::logger::Logger;
use crate::services::session::Session;
use crate::utils::redact::redact_text;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

struct TokenGrant {
    access_token: String,
    expires_in: i64,
}

/// Obtains and caches the bearer token and upstream session id on a [`Session`].
///
/// Both steps collapse every failure to `None` and leave the session untouched
/// when they fail.
#[derive(Clone)]
pub struct SessionAuthenticator {
    logger: Logger,
    client: Client,
    timeout: Duration,
}

impl SessionAuthenticator {
    pub fn new(logger: Logger, client: Client, timeout: Duration) -> Self {
        Self {
            logger: logger.child("auth"),
            client,
            timeout,
        }
    }

    pub async fn ensure_token(&self, session: &mut Session, creds: &Credentials) -> Option<String> {
        let now = chrono::Utc::now().timestamp();
        if let Some(token) = session.cached_token(now) {
            self.logger.debug("Using cached access token", None);
            return Some(token.to_string());
        }

        self.logger
            .info("Access token is expired or not found, fetching a new one", None);
        match self.fetch_token(creds).await {
            Ok(grant) => {
                self.logger.info(
                    "Fetched new access token",
                    Some(&serde_json::json!({ "expires_in": grant.expires_in })),
                );
                let token = grant.access_token.clone();
                session.store_token(grant.access_token, grant.expires_in, now);
                Some(token)
            }
            Err(err) => {
                self.logger.error(
                    "Failed to fetch access token",
                    Some(&serde_json::json!({ "kind": err.kind(), "error": err.to_string() })),
                );
                None
            }
        }
    }

    /// Returns the cached session id or establishes one with `token`, which the
    /// caller has already obtained through [`Self::ensure_token`].
    pub async fn ensure_session_id(
        &self,
        session: &mut Session,
        creds: &Credentials,
        token: &str,
    ) -> Option<String> {
        if let Some(session_id) = session.session_id() {
            self.logger.debug("Using cached session id", None);
            return Some(session_id.to_string());
        }

        self.logger
            .info("Session id not found, establishing one via login-defaults", None);
        match self.fetch_session_id(creds, token).await {
            Ok(session_id) => {
                self.logger.info("Established and cached new session id", None);
                session.store_session_id(session_id.clone());
                Some(session_id)
            }
            Err(err) => {
                self.logger.error(
                    "Failed to establish session via login-defaults",
                    Some(&serde_json::json!({ "kind": err.kind(), "error": err.to_string() })),
                );
                None
            }
        }
    }

    async fn fetch_token(&self, creds: &Credentials) -> Result<TokenGrant, AuthError> {
        const STEP: &str = "token";
        let auth_url = creds
            .auth_url
            .as_deref()
            .ok_or(AuthError::Missing("auth URL"))?;

        let mut form: Vec<(&str, &str)> = vec![("grant_type", auth_constants::GRANT_TYPE)];
        for (key, value) in [
            ("client_id", &creds.client_id),
            ("client_secret", &creds.client_secret),
            ("site_id", &creds.site_id),
        ] {
            if let Some(value) = value {
                form.push((key, value.as_str()));
            }
        }

        let request = self.client.post(auth_url).form(&form).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| AuthError::Timeout { step: STEP })?
            .map_err(|err| AuthError::Transport {
                step: STEP,
                detail: err.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AuthError::Rejected {
                step: STEP,
                status: status.as_u16(),
                body: redact_text(&text, 512),
            });
        }

        let payload: Value = serde_json::from_str(&text)
            .map_err(|_| AuthError::Malformed("token response is not valid JSON".to_string()))?;
        let access_token = payload
            .get("access_token")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Malformed("token response has no access_token".to_string()))?
            .to_string();
        let expires_in = parse_expires_in(payload.get("expires_in"))
            .unwrap_or(auth_constants::DEFAULT_TOKEN_TTL_SECS);

        Ok(TokenGrant {
            access_token,
            expires_in,
        })
    }

    async fn fetch_session_id(&self, creds: &Credentials, token: &str) -> Result<String, AuthError> {
        const STEP: &str = "login-defaults";
        let url = creds
            .endpoint_url(auth_constants::LOGIN_DEFAULTS_ENDPOINT)
            .ok_or(AuthError::Missing("base URL"))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| AuthError::Malformed("access token is not a valid header value".to_string()))?;
        let payload = serde_json::json!({
            "enterpriseId": creds.enterprise_id,
            "practiceId": creds.practice_id,
        });

        let request = self
            .client
            .put(url)
            .header(AUTHORIZATION, bearer)
            .header(CONTENT_TYPE, "application/json")
            .json(&payload)
            .send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| AuthError::Timeout { step: STEP })?
            .map_err(|err| AuthError::Transport {
                step: STEP,
                detail: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                step: STEP,
                status: status.as_u16(),
                body: redact_text(&text, 512),
            });
        }

        response
            .headers()
            .get(auth_constants::SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                AuthError::Malformed(format!(
                    "'{}' not found in login-defaults response headers",
                    auth_constants::SESSION_HEADER
                ))
            })
    }
}

/// Token lifetime in seconds, clamped to `0..=MAX_TOKEN_TTL_SECS`. A lifetime at or
/// below the refresh margin is stored but never served from the cache.
fn parse_expires_in(value: Option<&Value>) -> Option<i64> {
    let seconds = match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    Some(seconds.clamp(0, auth_constants::MAX_TOKEN_TTL_SECS))
}
