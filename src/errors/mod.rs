mod auth_error;
mod gateway_error;
mod mcp_error;
mod tool_error;

pub use auth_error::AuthError;
pub use gateway_error::GatewayError;
pub use mcp_error::{ErrorCode, McpError};
pub use tool_error::{ToolError, ToolErrorKind};
