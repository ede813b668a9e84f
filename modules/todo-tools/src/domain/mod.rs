pub mod error;
pub mod model;
pub mod repo;
pub mod service;

pub use error::DomainError;
pub use model::{Todo, TodoPatch};
pub use repo::TodoRepository;
pub use service::{ServiceConfig, TodoService};
