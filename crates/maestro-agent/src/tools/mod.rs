//! Tool system for the LLM tool-use loop.
//!
//! Every callable operation implements [`Tool`]; the [`ToolRegistry`] is the
//! flat name → tool catalogue built once per conversation (handlers close
//! over the project and project id through [`ToolContext`]).

pub mod control;
pub mod knowledge;
pub mod learning;
pub mod schedule;
pub mod vision_tools;
pub mod workspace;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use maestro_core::config::GoogleConfig;
use maestro_knowledge::Knowledge;
use maestro_store::{Store, StoreError};

use crate::provider::ToolDefinition;

/// Result of executing a tool.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    /// Plain text (or JSON-stringified structure) for the model.
    Text(String),
    /// Anthropic-shaped content block list — image plus text. Drivers whose
    /// wire formats forbid image tool results substitute a placeholder.
    Multimodal(Vec<Value>),
    /// A stated precondition failed; surfaced verbatim with the error flag.
    Failure(String),
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        ToolOutput::Text(content.into())
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ToolOutput::Failure(message.into())
    }

    /// Serialize a structured result for the model.
    pub fn json(value: &impl serde::Serialize) -> Self {
        match serde_json::to_string_pretty(value) {
            Ok(s) => ToolOutput::Text(s),
            Err(e) => ToolOutput::Failure(format!("Tool execution error: {e}")),
        }
    }
}

/// Map a store error onto tool output: preconditions surface verbatim,
/// anything else becomes a tool-execution error string so the loop can
/// continue.
pub(crate) fn store_failure(err: StoreError) -> ToolOutput {
    match err {
        StoreError::Precondition(msg) => ToolOutput::Failure(msg),
        other => ToolOutput::Failure(format!("Tool execution error: {other}")),
    }
}

/// Trait that all tools implement.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the tool's named arguments.
    fn input_schema(&self) -> Value;
    async fn execute(&self, input: Value) -> ToolOutput;
}

/// Everything a handler may need; built once per conversation.
pub struct ToolContext {
    pub store: Arc<Store>,
    pub knowledge: Arc<Knowledge>,
    pub project_id: String,
    /// Identity + experience directory for the learning tools.
    pub identity_dir: PathBuf,
    /// Scratch directory for highlight artifacts.
    pub workspaces_dir: PathBuf,
    /// Gemini credentials for the vision worker, when configured.
    pub google: Option<GoogleConfig>,
    pub request_timeout: Duration,
    /// Staged engine-switch cell shared with the conversation.
    pub switch: Arc<control::EngineSwitch>,
}

/// Flat catalogue of every tool available to the current conversation.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Assemble the full registry: knowledge, workspace, vision, schedule,
    /// learning and control categories.
    pub fn build(ctx: Arc<ToolContext>) -> Self {
        let mut tools: Vec<Box<dyn Tool>> = Vec::new();
        tools.extend(knowledge::tools(ctx.clone()));
        tools.extend(workspace::tools(ctx.clone()));
        tools.extend(vision_tools::tools(ctx.clone()));
        tools.extend(schedule::tools(ctx.clone()));
        tools.extend(learning::tools(ctx.clone()));
        tools.extend(control::tools(ctx));
        Self { tools }
    }

    /// Registry over an explicit tool list (tests, restricted contexts).
    pub fn from_tools(tools: Vec<Box<dyn Tool>>) -> Self {
        Self { tools }
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// API-level definitions for the provider adapters.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Serialized schema text, used for the fixed-token estimate.
    pub fn schema_text(&self) -> String {
        serde_json::to_string(&self.definitions()).unwrap_or_default()
    }
}

// ── Argument helpers ─────────────────────────────────────────────────────

/// Required string argument, or a failure naming the missing field.
pub(crate) fn req_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolOutput> {
    match input.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ToolOutput::failure(format!(
            "missing required field '{key}'"
        ))),
    }
}

pub(crate) fn opt_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Schema helper: object schema from (name, type, description, required).
pub(crate) fn object_schema(params: &[(&str, &str, &str, bool)]) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for (name, ty, description, is_required) in params {
        properties.insert(
            name.to_string(),
            serde_json::json!({ "type": ty, "description": description }),
        );
        if *is_required {
            required.push(Value::String(name.to_string()));
        }
    }
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
