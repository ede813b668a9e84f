use async_trait::async_trait;
use uuid::Uuid;

use super::error::DomainError;
use super::model::Todo;

/// Storage for todos. Every read and delete is scoped to an owner.
#[async_trait]
pub trait TodoRepository: Send + Sync {
    async fn list(&self, owner: &str) -> Result<Vec<Todo>, DomainError>;

    async fn find(&self, owner: &str, id: Uuid) -> Result<Option<Todo>, DomainError>;

    async fn insert(&self, todo: Todo) -> Result<Todo, DomainError>;

    /// Replace an existing todo of the same owner.
    async fn update(&self, todo: Todo) -> Result<Todo, DomainError>;

    /// Returns `false` when nothing matched.
    async fn delete(&self, owner: &str, id: Uuid) -> Result<bool, DomainError>;
}
