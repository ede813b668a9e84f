//! The todo use cases as MCP tools.

use std::sync::Arc;

use async_trait::async_trait;
use mcp_gateway::{OperationDescriptor, OperationError, ProtectedOperation};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use uuid::Uuid;
use xaa_security::SecurityContext;

use crate::config::TodoToolsConfig;
use crate::domain::{TodoPatch, TodoRepository, TodoService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl ToolKind {
    pub const ALL: [Self; 5] = [
        Self::List,
        Self::Get,
        Self::Create,
        Self::Update,
        Self::Delete,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::List => "list_todos",
            Self::Get => "get_todo",
            Self::Create => "create_todo",
            Self::Update => "update_todo",
            Self::Delete => "delete_todo",
        }
    }

    #[must_use]
    pub fn is_mutation(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }

    fn description(self) -> &'static str {
        match self {
            Self::List => "List the caller's todos, oldest first.",
            Self::Get => "Fetch one of the caller's todos by id.",
            Self::Create => "Create a todo owned by the caller.",
            Self::Update => "Change the title or completion of one of the caller's todos.",
            Self::Delete => "Delete one of the caller's todos.",
        }
    }

    fn input_schema(self, max_title_len: usize) -> Value {
        let id = json!({ "type": "string", "format": "uuid" });
        let title = json!({ "type": "string", "minLength": 1, "maxLength": max_title_len });
        match self {
            Self::List => json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
            Self::Get | Self::Delete => json!({
                "type": "object",
                "properties": { "id": id },
                "required": ["id"],
                "additionalProperties": false
            }),
            Self::Create => json!({
                "type": "object",
                "properties": { "title": title },
                "required": ["title"],
                "additionalProperties": false
            }),
            Self::Update => json!({
                "type": "object",
                "properties": {
                    "id": id,
                    "title": title,
                    "completed": { "type": "boolean" }
                },
                "required": ["id"],
                "additionalProperties": false
            }),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IdArgs {
    id: Uuid,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateArgs {
    title: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateArgs {
    id: Uuid,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
}

fn parse_args<T: DeserializeOwned>(tool: ToolKind, args: Value) -> Result<T, OperationError> {
    serde_json::from_value(args).map_err(|e| {
        OperationError::InvalidArguments(format!("invalid arguments for {}: {e}", tool.name()))
    })
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, OperationError> {
    serde_json::to_value(value).map_err(|e| OperationError::Internal(e.to_string()))
}

/// One todo use case behind its scope.
pub struct TodoTool<R: TodoRepository> {
    kind: ToolKind,
    descriptor: OperationDescriptor,
    service: Arc<TodoService<R>>,
}

impl<R: TodoRepository> TodoTool<R> {
    #[must_use]
    pub fn new(kind: ToolKind, service: Arc<TodoService<R>>, config: &TodoToolsConfig) -> Self {
        let descriptor = OperationDescriptor::new(
            kind.name(),
            kind.description(),
            kind.input_schema(config.max_title_len),
        );
        let descriptor = if kind.is_mutation() {
            descriptor
                .requires(&config.manage_scope)
                .updates(&config.resource_uri)
        } else {
            descriptor.requires(&config.read_scope)
        };
        Self {
            kind,
            descriptor,
            service,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ToolKind {
        self.kind
    }
}

#[async_trait]
impl<R: TodoRepository + 'static> ProtectedOperation for TodoTool<R> {
    fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, ctx: &SecurityContext, args: Value) -> Result<Value, OperationError> {
        match self.kind {
            ToolKind::List => {
                let NoArgs {} = parse_args(self.kind, args)?;
                let todos = self.service.list(ctx).await?;
                Ok(json!({ "todos": to_value(&todos)? }))
            }
            ToolKind::Get => {
                let IdArgs { id } = parse_args(self.kind, args)?;
                to_value(&self.service.get(ctx, id).await?)
            }
            ToolKind::Create => {
                let CreateArgs { title } = parse_args(self.kind, args)?;
                to_value(&self.service.create(ctx, &title).await?)
            }
            ToolKind::Update => {
                let UpdateArgs {
                    id,
                    title,
                    completed,
                } = parse_args(self.kind, args)?;
                let todo = self
                    .service
                    .update(ctx, id, TodoPatch { title, completed })
                    .await?;
                to_value(&todo)
            }
            ToolKind::Delete => {
                let IdArgs { id } = parse_args(self.kind, args)?;
                self.service.delete(ctx, id).await?;
                Ok(json!({ "deleted": id }))
            }
        }
    }
}
