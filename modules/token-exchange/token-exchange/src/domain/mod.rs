//! Domain layer for the token exchange.

pub mod cache;
pub mod service;
pub mod signer;

pub use cache::TokenCache;
pub use service::TokenExchanger;
pub use signer::{AssertionSigner, ClientAssertion};
