pub mod datetime;
pub mod location;
pub mod redact;
pub mod tool_errors;
