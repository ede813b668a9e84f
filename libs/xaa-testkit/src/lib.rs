#![allow(clippy::unwrap_used, clippy::expect_used, clippy::missing_panics_doc)]
//! Shared test fixtures.

pub mod keys;
mod token;

pub use token::TestToken;

/// Issuer of every token minted by [`TestToken`] unless overridden.
pub const TEST_ISSUER: &str = "https://auth.example.test";
/// Audience of the protected MCP resource.
pub const TEST_AUDIENCE: &str = "mcp://resource";
