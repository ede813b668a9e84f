#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Security primitives shared by the gateway, the token exchanger and the
//! protected operations.
//!
//! - [`Claims`] is the typed view of a validated bearer token
//! - [`SecurityContext`] is what protected code receives once the access gate
//!   has approved a request

pub mod claims;
pub mod context;
pub mod scopes;

pub use claims::{Claims, ClaimsError};
pub use context::SecurityContext;
pub use scopes::{missing_scopes, parse_scope_list};
