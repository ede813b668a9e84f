#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Protected MCP transport endpoint.
//!
//! One path serves the streamable HTTP transport:
//! - `POST` carries JSON-RPC requests; `initialize` without a session id
//!   opens a session bound to the token's subject
//! - `GET` opens the server-to-client event stream, resumable with
//!   `Last-Event-ID`
//! - `DELETE` terminates the session
//!
//! Every call passes the access gate. Tool calls pass it a second time with
//! the tool's own scopes.

pub mod api;
pub mod config;
pub mod domain;
pub mod module;

pub use api::{ApiError, LAST_EVENT_ID, MCP_SESSION_ID};
pub use config::GatewayConfig;
pub use domain::{
    CloseReason, OperationDescriptor, OperationError, OperationSet, ProtectedOperation, Rejection,
    RejectionKind, Session, SessionError, SessionRegistry, SessionState,
};
pub use module::McpGateway;
