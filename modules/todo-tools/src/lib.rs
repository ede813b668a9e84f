#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Todo CRUD exposed as MCP tools.
//!
//! Reading requires the read scope, every mutation the manage scope. Todos
//! belong to the token subject that created them and are invisible to
//! everyone else.

pub mod api;
pub mod config;
pub mod domain;
pub mod infra;
pub mod module;

pub use api::{TodoTool, ToolKind};
pub use config::TodoToolsConfig;
pub use domain::{DomainError, Todo, TodoPatch, TodoRepository, TodoService};
pub use infra::InMemoryTodoRepository;
pub use module::TodoToolsModule;
