//! Engine control — the `switch_engine` tool.
//!
//! The tool runs inside the tool loop, which runs inside the very
//! conversation turn whose provider it wants to replace. Swapping mid-loop
//! would invalidate the in-flight request, so the switch is staged in a
//! shared cell and the conversation applies it once the turn's final text
//! is in.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use maestro_core::engines::{engine_names, find_engine};

use super::{object_schema, req_str, Tool, ToolContext, ToolOutput};

/// Staged engine-switch cell shared between the `switch_engine` tool and
/// the conversation.
pub struct EngineSwitch {
    current: Mutex<String>,
    pending: Mutex<Option<String>>,
}

impl EngineSwitch {
    pub fn new(current: &str) -> Self {
        Self {
            current: Mutex::new(current.to_string()),
            pending: Mutex::new(None),
        }
    }

    pub fn current(&self) -> String {
        self.current.lock().unwrap().clone()
    }

    pub fn set_current(&self, name: &str) {
        *self.current.lock().unwrap() = name.to_string();
    }

    /// Validate and stage a switch. Returns the confirmation string for the
    /// model, or the rejection message.
    pub fn request(&self, name: &str) -> Result<String, String> {
        let Some(spec) = find_engine(name) else {
            return Err(format!(
                "Unknown engine '{name}'. Available: {}",
                engine_names()
            ));
        };
        let current = self.current();
        if name == current {
            return Err(format!("Already running on {name}."));
        }
        *self.pending.lock().unwrap() = Some(name.to_string());
        Ok(format!(
            "Switched from {current} to {name} ({}). Conversation preserved.",
            spec.display
        ))
    }

    /// Consume the staged switch, if any.
    pub fn take_pending(&self) -> Option<String> {
        self.pending.lock().unwrap().take()
    }
}

pub fn tools(ctx: Arc<ToolContext>) -> Vec<Box<dyn Tool>> {
    vec![Box::new(SwitchEngine { ctx })]
}

struct SwitchEngine {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for SwitchEngine {
    fn name(&self) -> &str {
        "switch_engine"
    }
    fn description(&self) -> &str {
        "Switch the AI engine mid-conversation. Use when the super asks to \
         change models, or when a task would benefit from a different engine. \
         Options: opus (Claude Opus 4.6 — deepest analysis, most expensive), \
         gpt (GPT-5.2 — strong all-around), \
         gemini (Gemini 3 Pro — fast and capable), \
         gemini-flash (Gemini 3 Flash — fastest and cheapest, great for quick questions)."
    }
    fn input_schema(&self) -> Value {
        object_schema(&[(
            "engine",
            "string",
            "Engine name: opus, gpt, gemini, or gemini-flash",
            true,
        )])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let engine = match req_str(&input, "engine") {
            Ok(e) => e,
            Err(out) => return out,
        };
        match self.ctx.switch.request(engine.trim()) {
            Ok(confirmation) => ToolOutput::text(confirmation),
            Err(message) => ToolOutput::failure(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_and_current_engines_are_rejected() {
        let cell = EngineSwitch::new("opus");
        assert!(cell.request("hal9000").unwrap_err().contains("Unknown engine"));
        assert_eq!(cell.request("opus").unwrap_err(), "Already running on opus.");
        assert!(cell.take_pending().is_none());
    }

    #[test]
    fn valid_switch_is_staged_until_taken() {
        let cell = EngineSwitch::new("opus");
        let confirmation = cell.request("gemini").unwrap();
        assert!(confirmation.contains("Switched from opus to gemini"));
        assert_eq!(cell.take_pending().as_deref(), Some("gemini"));
        assert!(cell.take_pending().is_none());
    }
}
