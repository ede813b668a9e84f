use serde::{Deserialize, Serialize};

fn default_max_title_len() -> usize {
    200
}

fn default_read_scope() -> String {
    "mcp:tools:read".to_owned()
}

fn default_manage_scope() -> String {
    "mcp:tools:manage".to_owned()
}

fn default_resource_uri() -> String {
    "todo://todos".to_owned()
}

/// Configuration for the todo tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TodoToolsConfig {
    #[serde(default = "default_max_title_len")]
    pub max_title_len: usize,

    /// Scope required by `list_todos` and `get_todo`.
    #[serde(default = "default_read_scope")]
    pub read_scope: String,

    /// Scope required by `create_todo`, `update_todo` and `delete_todo`.
    #[serde(default = "default_manage_scope")]
    pub manage_scope: String,

    /// Announced in `notifications/resources/updated` after a mutation.
    #[serde(default = "default_resource_uri")]
    pub resource_uri: String,
}

impl Default for TodoToolsConfig {
    fn default() -> Self {
        Self {
            max_title_len: default_max_title_len(),
            read_scope: default_read_scope(),
            manage_scope: default_manage_scope(),
            resource_uri: default_resource_uri(),
        }
    }
}

impl TodoToolsConfig {
    /// # Errors
    /// Returns an error for a zero title limit or an empty scope name.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_title_len == 0 {
            anyhow::bail!("todo.max_title_len must be greater than zero");
        }
        if self.read_scope.trim().is_empty() || self.manage_scope.trim().is_empty() {
            anyhow::bail!("todo scopes must not be empty");
        }
        if self.read_scope.contains(' ') || self.manage_scope.contains(' ') {
            anyhow::bail!("todo scopes must be single scope tokens");
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg: TodoToolsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.max_title_len, 200);
        assert_eq!(cfg.read_scope, "mcp:tools:read");
        assert_eq!(cfg.manage_scope, "mcp:tools:manage");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<TodoToolsConfig>(r#"{"max_len": 5}"#).is_err());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let cfg = TodoToolsConfig {
            max_title_len: 0,
            ..TodoToolsConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = TodoToolsConfig {
            manage_scope: "a b".to_owned(),
            ..TodoToolsConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
