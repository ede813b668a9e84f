use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::{DomainError, Todo, TodoRepository};

/// Process-local todo storage. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryTodoRepository {
    todos: RwLock<HashMap<Uuid, Todo>>,
}

impl InMemoryTodoRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TodoRepository for InMemoryTodoRepository {
    async fn list(&self, owner: &str) -> Result<Vec<Todo>, DomainError> {
        let mut todos: Vec<Todo> = self
            .todos
            .read()
            .values()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        todos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(todos)
    }

    async fn find(&self, owner: &str, id: Uuid) -> Result<Option<Todo>, DomainError> {
        Ok(self
            .todos
            .read()
            .get(&id)
            .filter(|t| t.owner == owner)
            .cloned())
    }

    async fn insert(&self, todo: Todo) -> Result<Todo, DomainError> {
        let mut todos = self.todos.write();
        if todos.contains_key(&todo.id) {
            return Err(DomainError::Internal(format!("duplicate todo id {}", todo.id)));
        }
        todos.insert(todo.id, todo.clone());
        Ok(todo)
    }

    async fn update(&self, todo: Todo) -> Result<Todo, DomainError> {
        let mut todos = self.todos.write();
        match todos.get_mut(&todo.id) {
            Some(existing) if existing.owner == todo.owner => {
                *existing = todo.clone();
                Ok(todo)
            }
            _ => Err(DomainError::NotFound(todo.id)),
        }
    }

    async fn delete(&self, owner: &str, id: Uuid) -> Result<bool, DomainError> {
        let mut todos = self.todos.write();
        if todos.get(&id).is_some_and(|t| t.owner == owner) {
            todos.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use time::OffsetDateTime;

    use super::*;

    fn todo(owner: &str, title: &str) -> Todo {
        let now = OffsetDateTime::now_utc();
        Todo {
            id: Uuid::new_v4(),
            owner: owner.to_owned(),
            title: title.to_owned(),
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn rows_are_scoped_to_their_owner() {
        let repo = InMemoryTodoRepository::new();
        let mine = repo.insert(todo("alice", "buy milk")).await.unwrap();
        repo.insert(todo("bob", "walk dog")).await.unwrap();

        let listed = repo.list("alice").await.unwrap();
        assert_eq!(listed, vec![mine.clone()]);
        assert!(repo.find("bob", mine.id).await.unwrap().is_none());
        assert!(!repo.delete("bob", mine.id).await.unwrap());
        assert!(repo.find("alice", mine.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_of_foreign_row_is_not_found() {
        let repo = InMemoryTodoRepository::new();
        let mine = repo.insert(todo("alice", "buy milk")).await.unwrap();

        let mut stolen = mine.clone();
        stolen.owner = "bob".to_owned();
        stolen.title = "pwned".to_owned();

        let err = repo.update(stolen).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(id) if id == mine.id));
        assert_eq!(repo.find("alice", mine.id).await.unwrap().unwrap().title, "buy milk");
    }

    #[tokio::test]
    async fn duplicate_insert_is_refused() {
        let repo = InMemoryTodoRepository::new();
        let t = repo.insert(todo("alice", "a")).await.unwrap();
        assert!(matches!(
            repo.insert(t).await.unwrap_err(),
            DomainError::Internal(_)
        ));
    }
}
