//! The single continuous conversation.
//!
//! One deployment, one super, one thread. Messages live in the store, the
//! summary in conversation_state; compaction keeps the estimated context
//! usage bounded. The engine can change mid-thread without losing anything,
//! because history never lives inside a provider adapter.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use maestro_core::config::MaestroConfig;
use maestro_core::engines::{
    find_engine, EngineSpec, KEEP_RECENT, SUMMARIZER_ENGINE,
};
use maestro_core::events::{Event, EventBus};
use maestro_core::{MaestroError, Result};
use maestro_knowledge::Knowledge;
use maestro_store::Store;

use crate::compact::{
    build_compaction_prompt, estimate_rows_tokens, estimate_tokens, fallback_summary,
    messages_to_text, needs_compaction,
};
use crate::prompt::build_system_prompt;
use crate::provider::{build_provider, user_message, ChatRequest, LlmProvider};
use crate::tool_loop::run_tool_loop;
use crate::tools::control::EngineSwitch;
use crate::tools::{ToolContext, ToolRegistry};

/// Per-reply output cap sent to every provider.
const MAX_REPLY_TOKENS: u32 = 8192;
/// Output cap for the compaction summarizer.
const MAX_SUMMARY_TOKENS: u32 = 2048;

pub struct Conversation {
    store: Arc<Store>,
    bus: EventBus,
    config: MaestroConfig,
    project_id: String,
    engine: &'static EngineSpec,
    provider: Box<dyn LlmProvider>,
    /// Cheap/fast model used only for compaction summaries.
    summarizer: Option<Box<dyn LlmProvider>>,
    registry: ToolRegistry,
    system_prompt: String,
    /// Estimated tokens of system prompt + serialized tool schemas.
    fixed_tokens: usize,
    switch: Arc<EngineSwitch>,
    timeout: Duration,
}

impl Conversation {
    /// Wire up the conversation: tools, system prompt, provider, state row.
    pub fn new(
        config: MaestroConfig,
        store: Arc<Store>,
        knowledge: Arc<Knowledge>,
        bus: EventBus,
        engine_name: Option<&str>,
    ) -> Result<Self> {
        let name = engine_name.unwrap_or(&config.engine.default);
        let engine = find_engine(name)
            .ok_or_else(|| MaestroError::Config(format!("unknown engine '{name}'")))?;
        config.validate(engine)?;

        let timeout = Duration::from_secs(config.engine.request_timeout_secs);
        let project = store.get_or_create_project(
            &config.project.name,
            &config.project.knowledge_path,
        )?;
        store.get_or_create_conversation(&project.id)?;

        let switch = Arc::new(EngineSwitch::new(engine.name));
        let ctx = Arc::new(ToolContext {
            store: store.clone(),
            knowledge,
            project_id: project.id.clone(),
            identity_dir: PathBuf::from(&config.project.identity_path),
            workspaces_dir: PathBuf::from(&config.project.workspaces_path),
            google: config.providers.google.clone(),
            request_timeout: timeout,
            switch: switch.clone(),
        });
        let registry = ToolRegistry::build(ctx);

        let system_prompt = build_system_prompt(std::path::Path::new(&config.project.identity_path));
        let fixed_tokens =
            estimate_tokens(&system_prompt) + estimate_tokens(&registry.schema_text());

        let provider = build_provider(engine, &config.providers, timeout)
            .map_err(|e| MaestroError::Provider(e.to_string()))?;
        let summarizer = find_engine(SUMMARIZER_ENGINE)
            .and_then(|spec| build_provider(spec, &config.providers, timeout).ok());

        info!(
            engine = engine.name,
            project_id = %project.id,
            tools = registry.len(),
            "conversation ready"
        );

        Ok(Self {
            store,
            bus,
            config,
            project_id: project.id,
            engine,
            provider,
            summarizer,
            registry,
            system_prompt,
            fixed_tokens,
            switch,
            timeout,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name
    }

    pub fn tool_count(&self) -> usize {
        self.registry.len()
    }

    /// Send one message through the engine and return the reply. The single
    /// entry point — user texts, CLI input and heartbeats all come through
    /// here.
    pub async fn send(&mut self, message: &str) -> Result<String> {
        self.store.add_message(&self.project_id, "user", message)?;

        self.maybe_compact().await?;

        let api_messages = self.build_api_messages()?;
        let request = ChatRequest {
            model: self.engine.model.to_string(),
            system: self.system_prompt.clone(),
            messages: api_messages,
            max_tokens: MAX_REPLY_TOKENS,
            tools: self.registry.definitions(),
        };

        let response = run_tool_loop(self.provider.as_ref(), request, &self.registry)
            .await
            .map_err(|e| MaestroError::Provider(e.to_string()))?;
        let answer = response.content;

        self.store
            .add_message(&self.project_id, "assistant", &answer)?;
        self.store
            .update_conversation_state(&self.project_id, None, true, false)?;

        // A switch_engine call during the loop was only staged; apply it now
        // that the turn is complete.
        if let Some(target) = self.switch.take_pending() {
            if let Err(e) = self.apply_engine(&target).await {
                warn!(engine = %target, error = %e, "staged engine switch failed");
            }
        }

        Ok(answer)
    }

    /// Direct engine switch (CLI command path). Returns the user-facing
    /// confirmation or rejection string; history is untouched either way.
    pub async fn switch_engine(&mut self, name: &str) -> Result<String> {
        match self.switch.request(name) {
            Err(message) => Ok(message),
            Ok(confirmation) => {
                let target = self.switch.take_pending().unwrap_or_else(|| name.to_string());
                self.apply_engine(&target).await?;
                Ok(confirmation)
            }
        }
    }

    /// Replace provider config, rebuild the fixed-token estimate, and
    /// re-check compaction (the new context window may be smaller).
    async fn apply_engine(&mut self, name: &str) -> Result<()> {
        let engine = find_engine(name)
            .ok_or_else(|| MaestroError::Config(format!("unknown engine '{name}'")))?;
        let provider = build_provider(engine, &self.config.providers, self.timeout)
            .map_err(|e| MaestroError::Provider(e.to_string()))?;

        let old = self.engine.name;
        self.engine = engine;
        self.provider = provider;
        self.fixed_tokens =
            estimate_tokens(&self.system_prompt) + estimate_tokens(&self.registry.schema_text());
        self.switch.set_current(engine.name);

        self.maybe_compact().await?;

        info!(from = old, to = engine.name, "engine switched");
        self.bus.emit(Event::EngineSwitch {
            from: old.to_string(),
            to: engine.name.to_string(),
        });
        Ok(())
    }

    /// Build the provider message list: the summary (when present) leads as
    /// a synthetic exchange, followed by every stored message.
    fn build_api_messages(&self) -> Result<Vec<serde_json::Value>> {
        let mut messages = Vec::new();

        let state = self.store.get_or_create_conversation(&self.project_id)?;
        if !state.summary.is_empty() {
            messages.push(serde_json::json!({
                "role": "user",
                "content":
                    "[Conversation history summary — this is context from our previous exchanges]",
            }));
            messages.push(serde_json::json!({
                "role": "assistant",
                "content": format!("I remember. Here's what we've covered:\n\n{}", state.summary),
            }));
        }

        for row in self.store.get_messages(&self.project_id)? {
            messages.push(serde_json::json!({
                "role": row.role,
                "content": row.content,
            }));
        }
        Ok(messages)
    }

    /// Compact when estimated usage crosses the threshold. A no-op when the
    /// thread holds KEEP_RECENT messages or fewer.
    async fn maybe_compact(&mut self) -> Result<()> {
        let state = self.store.get_or_create_conversation(&self.project_id)?;
        let rows = self.store.get_messages(&self.project_id)?;

        let summary_tokens = estimate_tokens(&state.summary);
        let message_tokens = estimate_rows_tokens(&rows);
        if !needs_compaction(
            self.fixed_tokens,
            summary_tokens,
            message_tokens,
            self.engine.context_limit,
        ) {
            return Ok(());
        }
        if rows.len() <= KEEP_RECENT {
            return Ok(());
        }

        let total = self.fixed_tokens + summary_tokens + message_tokens;
        info!(
            estimated_tokens = total,
            context_limit = self.engine.context_limit,
            "compaction triggered"
        );

        let cutoff_id = rows[rows.len() - KEEP_RECENT].id;
        let old_rows = &rows[..rows.len() - KEEP_RECENT];
        let old_text = messages_to_text(old_rows);

        let new_summary = match self.summarize(&state.summary, &old_text).await {
            Some(summary) if !summary.is_empty() => summary,
            _ => {
                warn!("summarizer unavailable or failed, using truncation fallback");
                fallback_summary(&state.summary, &old_text)
            }
        };

        let deleted = self
            .store
            .compact_messages(&self.project_id, cutoff_id, &new_summary)?;
        info!(deleted, summary_length = new_summary.len(), "compaction done");
        Ok(())
    }

    async fn summarize(&self, existing_summary: &str, old_text: &str) -> Option<String> {
        let summarizer = self.summarizer.as_ref()?;
        let spec = find_engine(SUMMARIZER_ENGINE)?;
        let request = ChatRequest {
            model: spec.model.to_string(),
            system: String::new(),
            messages: vec![user_message(&build_compaction_prompt(
                existing_summary,
                old_text,
            ))],
            max_tokens: MAX_SUMMARY_TOKENS,
            tools: Vec::new(),
        };
        match summarizer.send(&request).await {
            Ok(resp) => Some(resp.content.trim().to_string()),
            Err(e) => {
                warn!(error = %e, "summarizer call failed");
                None
            }
        }
    }

    /// Live stats for the dashboard and the CLI `/stats` command.
    pub fn get_stats(&self) -> Result<serde_json::Value> {
        let state = self.store.get_or_create_conversation(&self.project_id)?;
        let rows = self.store.get_messages(&self.project_id)?;

        let summary_tokens = estimate_tokens(&state.summary);
        let message_tokens = estimate_rows_tokens(&rows);
        let total = self.fixed_tokens + summary_tokens + message_tokens;
        let usage = if self.engine.context_limit > 0 {
            total as f64 / self.engine.context_limit as f64
        } else {
            1.0
        };

        Ok(serde_json::json!({
            "engine": self.engine.name,
            "context_limit": self.engine.context_limit,
            "estimated_tokens": total,
            "usage_pct": format!("{:.1}%", usage * 100.0),
            "messages_in_memory": rows.len(),
            "total_exchanges": state.total_exchanges,
            "compactions": state.compactions,
            "has_summary": !state.summary.is_empty(),
            "summary_length": state.summary.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_store::types::MessageRow;

    #[test]
    fn compaction_partition_matches_keep_recent() {
        // Pure check of the cutoff arithmetic used by maybe_compact: with
        // 100 rows and KEEP_RECENT = 20, the cutoff is row 80's id and 80
        // rows flatten into the summary input.
        let rows: Vec<MessageRow> = (1..=100)
            .map(|i| MessageRow {
                id: i,
                project_id: "p".into(),
                role: if i % 2 == 1 { "user" } else { "assistant" }.into(),
                content: "x".repeat(400),
                created_at: String::new(),
            })
            .collect();

        let cutoff_id = rows[rows.len() - KEEP_RECENT].id;
        assert_eq!(cutoff_id, 81);
        let old = &rows[..rows.len() - KEEP_RECENT];
        assert_eq!(old.len(), 80);

        // 100 × 400-char messages estimate to 10_000 tokens; with 1_000
        // fixed tokens that is 27.5% of a 40_000-token window (no compact)
        // and 68.75% of a 16_000-token window (compacts).
        assert!(!needs_compaction(1_000, 0, 10_000, 40_000));
        assert!(needs_compaction(1_000, 0, 10_000, 16_000));
    }
}
