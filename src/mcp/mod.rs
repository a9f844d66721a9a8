pub mod catalog;
pub mod prompts;
pub mod protocol;
pub mod server;
