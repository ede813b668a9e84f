//! Token Exchange Module
//!
//! Signs client assertions with the agent's key and performs the two-hop
//! ID-JAG exchange. Consumers use the [`token_exchange_sdk::TokenExchangeClient`]
//! built by [`module::TokenExchangeModule::init`].
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod config;
pub mod domain;
pub mod module;

pub use config::TokenExchangeConfig;
pub use domain::{AssertionSigner, ClientAssertion, TokenCache, TokenExchanger};
pub use module::TokenExchangeModule;
