pub mod tools;

pub use tools::{TodoTool, ToolKind};
