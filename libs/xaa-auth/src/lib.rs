#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Access gate for protected resources.
//!
//! Verification runs in a fixed order:
//! 1. parse the `Bearer` credential from the `Authorization` header
//! 2. verify signature, issuer and exact audience
//! 3. verify expiry
//! 4. verify the required scopes
//!
//! Steps 1-3 fail with [`AuthError::Unauthenticated`]; step 4 fails with
//! [`AuthError::Unauthorized`]. Callers react differently to the two
//! (re-authenticate vs. ask for more consent), so they are never merged.

pub mod axum_ext;
pub mod bearer;
pub mod discovery;
pub mod errors;
pub mod gate;
pub mod jwks;
pub mod keys;
pub mod problem;
pub mod validator;

pub use axum_ext::Authz;
pub use bearer::{extract_bearer_token, parse_bearer};
pub use discovery::{AuthorizationServerMetadata, DiscoveryError, ProtectedResourceMetadata};
pub use errors::AuthError;
pub use gate::AccessGate;
pub use jwks::JwksKeyProvider;
pub use keys::{KeyProvider, StaticKeyProvider, decoding_key_from_pem};
pub use problem::Problem;
pub use validator::{JwtValidator, MAX_LEEWAY, TokenValidator, ValidatorConfig};
