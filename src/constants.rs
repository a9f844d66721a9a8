pub mod network {
    pub const TIMEOUT_API_REQUEST_MS: u64 = 30_000;
    pub const USER_AGENT: &str = "nextgen-mcp/0.1";
}

pub mod auth {
    pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;
    pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3_600;
    pub const MAX_TOKEN_TTL_SECS: i64 = 86_400;
    pub const GRANT_TYPE: &str = "client_credentials";
    pub const SESSION_HEADER: &str = "x-ng-sessionid";
    pub const LOGIN_DEFAULTS_ENDPOINT: &str = "users/me/login-defaults";
}

pub mod limits {
    pub const DETAIL_FETCH_CONCURRENCY: usize = 8;
}

pub mod conversation {
    pub const DEFAULT_CONVERSATION_ID: &str = "default";
    pub const SESSION_IDLE_TTL_SECS: i64 = 3_600;
}

pub mod reasons {
    pub const RESCHEDULE_LIST_TYPE: &str = "as_resched_reason";
    pub const RESCHEDULE_REASON_NAME: &str = "Patient Request";
    pub const CANCEL_LIST_TYPE: &str = "as_cancel_reason";
    pub const CANCEL_REASON_NAME: &str = "Appointment No Longer Needed";
}
