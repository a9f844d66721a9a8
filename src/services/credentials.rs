use crate::services::config::Config;
use crate::services::session::ConversationContext;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    BaseUrl,
    AuthUrl,
    ClientId,
    ClientSecret,
    SiteId,
    EnterpriseId,
    PracticeId,
    LocationId,
}

impl CredentialField {
    pub const ALL: [CredentialField; 8] = [
        CredentialField::BaseUrl,
        CredentialField::AuthUrl,
        CredentialField::ClientId,
        CredentialField::ClientSecret,
        CredentialField::SiteId,
        CredentialField::EnterpriseId,
        CredentialField::PracticeId,
        CredentialField::LocationId,
    ];

    /// Request header that overrides this field for a single call.
    pub fn header(self) -> &'static str {
        match self {
            CredentialField::BaseUrl => "x-nextgen-base-url",
            CredentialField::AuthUrl => "x-nextgen-auth-url",
            CredentialField::ClientId => "x-nextgen-client-id",
            CredentialField::ClientSecret => "x-nextgen-client-secret",
            CredentialField::SiteId => "x-nextgen-site-id",
            CredentialField::EnterpriseId => "x-nextgen-enterprise-id",
            CredentialField::PracticeId => "x-nextgen-practice-id",
            CredentialField::LocationId => "x-nextgen-location-id",
        }
    }

    pub fn env_var(self) -> &'static str {
        match self {
            CredentialField::BaseUrl => "NEXTGEN_BASE_URL",
            CredentialField::AuthUrl => "NEXTGEN_AUTH_URL",
            CredentialField::ClientId => "NEXTGEN_CLIENT_ID",
            CredentialField::ClientSecret => "NEXTGEN_CLIENT_SECRET",
            CredentialField::SiteId => "NEXTGEN_SITE_ID",
            CredentialField::EnterpriseId => "NEXTGEN_ENTERPRISE_ID",
            CredentialField::PracticeId => "NEXTGEN_PRACTICE_ID",
            CredentialField::LocationId => "NEXTGEN_DEFAULT_LOCATION_ID",
        }
    }
}

/// Configuration bundle for one invocation. Absent fields fail downstream, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub base_url: Option<String>,
    pub auth_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub site_id: Option<String>,
    pub enterprise_id: Option<String>,
    pub practice_id: Option<String>,
    pub location_id: Option<String>,
}

impl Credentials {
    fn slot(&mut self, field: CredentialField) -> &mut Option<String> {
        match field {
            CredentialField::BaseUrl => &mut self.base_url,
            CredentialField::AuthUrl => &mut self.auth_url,
            CredentialField::ClientId => &mut self.client_id,
            CredentialField::ClientSecret => &mut self.client_secret,
            CredentialField::SiteId => &mut self.site_id,
            CredentialField::EnterpriseId => &mut self.enterprise_id,
            CredentialField::PracticeId => &mut self.practice_id,
            CredentialField::LocationId => &mut self.location_id,
        }
    }

    /// `{base_url}/{endpoint}`, tolerating a trailing slash on the base.
    pub fn endpoint_url(&self, endpoint: &str) -> Option<String> {
        let base = self.base_url.as_deref()?;
        Some(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        ))
    }
}

#[derive(Debug, Clone)]
pub struct CredentialResolver {
    config: Arc<Config>,
}

impl CredentialResolver {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Header override first, process default second. Never fails.
    pub fn resolve(&self, ctx: &ConversationContext) -> Credentials {
        let mut credentials = Credentials::default();
        for field in CredentialField::ALL {
            let value = ctx
                .header(field.header())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .or_else(|| self.config.default_for(field));
            *credentials.slot(field) = value.map(str::to_string);
        }
        credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::session::SessionStore;
    use std::collections::HashMap;

    fn resolver() -> CredentialResolver {
        let config = Config::default()
            .with_default(CredentialField::BaseUrl, "https://default.example.test")
            .with_default(CredentialField::ClientId, "default-client")
            .with_default(CredentialField::LocationId, "loc-default");
        CredentialResolver::new(Arc::new(config))
    }

    #[test]
    fn header_override_wins_over_default() {
        let store = SessionStore::new();
        let headers = HashMap::from([
            ("X-NextGen-Base-Url".to_string(), "https://tenant.example.test".to_string()),
            ("x-nextgen-practice-id".to_string(), "practice-9".to_string()),
        ]);
        let ctx = store.context(None, headers);
        let creds = resolver().resolve(&ctx);
        assert_eq!(creds.base_url.as_deref(), Some("https://tenant.example.test"));
        assert_eq!(creds.client_id.as_deref(), Some("default-client"));
        assert_eq!(creds.practice_id.as_deref(), Some("practice-9"));
        assert_eq!(creds.auth_url, None);
    }

    #[test]
    fn blank_header_falls_back_to_default() {
        let store = SessionStore::new();
        let headers = HashMap::from([("x-nextgen-location-id".to_string(), "  ".to_string())]);
        let ctx = store.context(None, headers);
        let creds = resolver().resolve(&ctx);
        assert_eq!(creds.location_id.as_deref(), Some("loc-default"));
    }

    #[test]
    fn endpoint_url_joins_without_double_slash() {
        let creds = Credentials {
            base_url: Some("https://api.example.test/v1/".to_string()),
            ..Credentials::default()
        };
        assert_eq!(
            creds.endpoint_url("persons/lookup").as_deref(),
            Some("https://api.example.test/v1/persons/lookup")
        );
        assert_eq!(Credentials::default().endpoint_url("persons"), None);
    }
}
