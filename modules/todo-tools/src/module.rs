use std::sync::Arc;

use mcp_gateway::{OperationSet, ProtectedOperation};

use crate::api::{TodoTool, ToolKind};
use crate::config::TodoToolsConfig;
use crate::domain::{ServiceConfig, TodoRepository, TodoService};
use crate::infra::InMemoryTodoRepository;

/// Wires the todo service to its storage and exposes it as tools.
pub struct TodoToolsModule<R: TodoRepository = InMemoryTodoRepository> {
    config: TodoToolsConfig,
    service: Arc<TodoService<R>>,
}

impl TodoToolsModule<InMemoryTodoRepository> {
    /// # Errors
    /// Returns an error if the config is invalid.
    pub fn new(config: TodoToolsConfig) -> anyhow::Result<Self> {
        Self::with_repository(config, Arc::new(InMemoryTodoRepository::new()))
    }
}

impl<R: TodoRepository + 'static> TodoToolsModule<R> {
    /// # Errors
    /// Returns an error if the config is invalid.
    pub fn with_repository(config: TodoToolsConfig, repo: Arc<R>) -> anyhow::Result<Self> {
        config.validate()?;
        let service = Arc::new(TodoService::new(
            repo,
            ServiceConfig {
                max_title_len: config.max_title_len,
            },
        ));
        Ok(Self { config, service })
    }

    #[must_use]
    pub fn service(&self) -> Arc<TodoService<R>> {
        self.service.clone()
    }

    /// One tool per todo use case.
    #[must_use]
    pub fn operations(&self) -> Vec<Arc<dyn ProtectedOperation>> {
        ToolKind::ALL
            .into_iter()
            .map(|kind| {
                Arc::new(TodoTool::new(kind, self.service.clone(), &self.config))
                    as Arc<dyn ProtectedOperation>
            })
            .collect()
    }

    /// Add every todo tool to `set`.
    #[must_use]
    pub fn register(&self, set: OperationSet) -> OperationSet {
        let set = self.operations().into_iter().fold(set, OperationSet::with);
        tracing::info!(tools = set.len(), "todo tools registered");
        set
    }
}
