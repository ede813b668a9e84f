pub mod auth;
pub mod error;
pub mod handlers;
pub mod jsonrpc;

pub use error::ApiError;
pub use handlers::{LAST_EVENT_ID, MCP_SESSION_ID};
