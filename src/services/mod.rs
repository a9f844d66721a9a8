pub mod auth;
pub mod config;
pub mod credentials;
pub mod envelope;
pub mod gateway;
pub mod logger;
pub mod session;
pub mod tool_executor;
