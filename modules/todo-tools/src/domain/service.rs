use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;
use xaa_security::SecurityContext;

use super::error::DomainError;
use super::model::{Todo, TodoPatch};
use super::repo::TodoRepository;

pub(crate) mod fields {
    pub const TITLE: &str = "title";
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub max_title_len: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { max_title_len: 200 }
    }
}

/// Todo use cases. The owner of every row is the subject of the calling context.
pub struct TodoService<R: TodoRepository> {
    repo: Arc<R>,
    config: ServiceConfig,
}

impl<R: TodoRepository> TodoService<R> {
    #[must_use]
    pub fn new(repo: Arc<R>, config: ServiceConfig) -> Self {
        Self { repo, config }
    }

    /// # Errors
    /// Repository failures.
    pub async fn list(&self, ctx: &SecurityContext) -> Result<Vec<Todo>, DomainError> {
        self.repo.list(ctx.subject()).await
    }

    /// # Errors
    /// [`DomainError::NotFound`] when the todo is absent or owned by someone else.
    pub async fn get(&self, ctx: &SecurityContext, id: Uuid) -> Result<Todo, DomainError> {
        self.repo
            .find(ctx.subject(), id)
            .await?
            .ok_or(DomainError::NotFound(id))
    }

    /// # Errors
    /// [`DomainError::Validation`] for an empty or overlong title.
    pub async fn create(&self, ctx: &SecurityContext, title: &str) -> Result<Todo, DomainError> {
        let title = self.validate_title(title)?;
        let now = OffsetDateTime::now_utc();
        let todo = Todo {
            id: Uuid::new_v4(),
            owner: ctx.subject().to_owned(),
            title,
            completed: false,
            created_at: now,
            updated_at: now,
        };
        let todo = self.repo.insert(todo).await?;
        tracing::info!(todo_id = %todo.id, owner = %todo.owner, "todo created");
        Ok(todo)
    }

    /// # Errors
    /// [`DomainError::Validation`] for a bad title, [`DomainError::NotFound`]
    /// when the todo is not visible to the caller.
    pub async fn update(
        &self,
        ctx: &SecurityContext,
        id: Uuid,
        patch: TodoPatch,
    ) -> Result<Todo, DomainError> {
        let title = patch
            .title
            .as_deref()
            .map(|t| self.validate_title(t))
            .transpose()?;

        let mut todo = self.get(ctx, id).await?;
        if let Some(title) = title {
            todo.title = title;
        }
        if let Some(completed) = patch.completed {
            todo.completed = completed;
        }
        todo.updated_at = OffsetDateTime::now_utc();

        let todo = self.repo.update(todo).await?;
        tracing::info!(todo_id = %todo.id, owner = %todo.owner, "todo updated");
        Ok(todo)
    }

    /// # Errors
    /// [`DomainError::NotFound`] when the todo is not visible to the caller.
    pub async fn delete(&self, ctx: &SecurityContext, id: Uuid) -> Result<(), DomainError> {
        if !self.repo.delete(ctx.subject(), id).await? {
            return Err(DomainError::NotFound(id));
        }
        tracing::info!(todo_id = %id, owner = %ctx.subject(), "todo deleted");
        Ok(())
    }

    fn validate_title(&self, title: &str) -> Result<String, DomainError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DomainError::validation(fields::TITLE, "must not be empty"));
        }
        if title.chars().count() > self.config.max_title_len {
            return Err(DomainError::validation(
                fields::TITLE,
                format!("exceeds maximum length of {}", self.config.max_title_len),
            ));
        }
        Ok(title.to_owned())
    }
}
