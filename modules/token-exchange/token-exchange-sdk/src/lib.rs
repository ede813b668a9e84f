//! Token Exchange SDK
//!
//! Public API of the token exchange module:
//!
//! - [`TokenExchangeClient`] - two-hop exchange of a human identity assertion
//!   into a resource-scoped access token
//! - [`IdentityAssertion`], [`CrossDomainAssertion`], [`ResourceAccessToken`] - token models
//! - [`TokenExchangeError`] - error taxonomy, with [`Remediation`] hints
//!
//! ## Usage
//!
//! ```ignore
//! use token_exchange_sdk::{IdentityAssertion, TokenExchangeClient};
//!
//! let token = exchanger
//!     .exchange(&IdentityAssertion::new(id_token), "mcp-auth-server", "mcp://resource")
//!     .await?;
//! ```

pub mod api;
pub mod error;
pub mod models;

pub use api::TokenExchangeClient;
pub use error::{Hop, ProviderError, Remediation, TokenExchangeError};
pub use models::{
    CrossDomainAssertion, ID_JAG_TOKEN_TYPE, ID_TOKEN_TYPE, IdentityAssertion, ResourceAccessToken,
};
