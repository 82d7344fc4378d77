//! Tool execution loop — the core agentic behavior.
//!
//! Flow: prompt → LLM → if tool calls → execute every call of the turn →
//! inject results → LLM → repeat. Stops when a reply carries no tool calls,
//! or the iteration cap is reached.

use tracing::{debug, info, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, ToolCall};
use crate::tools::{ToolOutput, ToolRegistry};

/// Maximum loop iterations to bound a runaway turn.
const MAX_ITERATIONS: usize = 25;

/// Run the full tool loop starting from `base` (whose `messages` hold the
/// canonical history ending in the new user turn). Returns the final
/// response — the one with no tool calls.
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    base: ChatRequest,
    registry: &ToolRegistry,
) -> Result<ChatResponse, ProviderError> {
    let mut messages = base.messages.clone();
    let mut last_response: Option<ChatResponse> = None;

    for iteration in 0..MAX_ITERATIONS {
        let mut req = base.clone();
        req.messages = messages.clone();

        debug!(iteration, "tool loop iteration");

        let response = provider.send(&req).await?;

        if response.tool_calls.is_empty() || response.stop_reason != "tool_use" {
            info!(iteration, "tool loop complete");
            return Ok(response);
        }

        // Assistant turn: any text plus all tool_use blocks.
        let mut assistant_content: Vec<serde_json::Value> = Vec::new();
        if !response.content.is_empty() {
            assistant_content.push(serde_json::json!({
                "type": "text",
                "text": response.content,
            }));
        }
        for call in &response.tool_calls {
            assistant_content.push(serde_json::json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.input,
            }));
        }
        messages.push(serde_json::json!({
            "role": "assistant",
            "content": assistant_content,
        }));

        // Every call of this turn executes before the next request.
        let mut result_blocks: Vec<serde_json::Value> = Vec::new();
        for call in &response.tool_calls {
            result_blocks.push(execute_call(registry, provider, call).await);
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": result_blocks,
        }));

        last_response = Some(response);
    }

    warn!(max_iterations = MAX_ITERATIONS, "tool loop hit iteration cap");

    last_response.ok_or_else(|| {
        ProviderError::Parse(format!(
            "tool loop exceeded {MAX_ITERATIONS} iterations without a final response"
        ))
    })
}

/// Execute one tool call and build its canonical `tool_result` block.
async fn execute_call(
    registry: &ToolRegistry,
    provider: &dyn LlmProvider,
    call: &ToolCall,
) -> serde_json::Value {
    let output = match registry.find(&call.name) {
        Some(tool) => {
            debug!(tool = %call.name, "executing tool");
            tool.execute(call.input.clone()).await
        }
        None => ToolOutput::failure(format!("unknown tool: {}", call.name)),
    };

    match output {
        ToolOutput::Text(text) => serde_json::json!({
            "type": "tool_result",
            "tool_use_id": call.id,
            "content": text,
        }),
        ToolOutput::Failure(message) => serde_json::json!({
            "type": "tool_result",
            "tool_use_id": call.id,
            "content": message,
            "is_error": true,
        }),
        ToolOutput::Multimodal(blocks) => {
            if provider.supports_image_results() {
                serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": call.id,
                    "content": blocks,
                })
            } else {
                // Flatten to text so the turn still completes.
                serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": call.id,
                    "content": crate::openai::flatten_result_content(Some(
                        &serde_json::Value::Array(blocks)
                    )),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatRequest, ChatResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// First reply requests two tool calls, second reply is final text.
    struct TwoPhase {
        calls: AtomicUsize,
        seen_messages: std::sync::Mutex<Vec<Vec<serde_json::Value>>>,
    }

    #[async_trait]
    impl LlmProvider for TwoPhase {
        fn name(&self) -> &str {
            "two-phase"
        }

        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.seen_messages.lock().unwrap().push(req.messages.clone());
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(ChatResponse {
                    content: "checking".into(),
                    model: req.model.clone(),
                    tokens_in: 1,
                    tokens_out: 1,
                    stop_reason: "tool_use".into(),
                    tool_calls: vec![
                        ToolCall {
                            id: "a".into(),
                            name: "missing_tool".into(),
                            input: serde_json::json!({}),
                        },
                        ToolCall {
                            id: "b".into(),
                            name: "also_missing".into(),
                            input: serde_json::json!({}),
                        },
                    ],
                })
            } else {
                Ok(ChatResponse {
                    content: "done".into(),
                    model: req.model.clone(),
                    tokens_in: 1,
                    tokens_out: 1,
                    stop_reason: "end_turn".into(),
                    tool_calls: Vec::new(),
                })
            }
        }
    }

    fn empty_registry() -> ToolRegistry {
        // Registry with no tools: every call resolves to "unknown tool".
        ToolRegistry::from_tools(Vec::new())
    }

    #[tokio::test]
    async fn multi_call_turn_executes_all_before_next_request() {
        let provider = TwoPhase {
            calls: AtomicUsize::new(0),
            seen_messages: std::sync::Mutex::new(Vec::new()),
        };
        let registry = empty_registry();
        let base = ChatRequest {
            model: "m".into(),
            system: "s".into(),
            messages: vec![serde_json::json!({"role": "user", "content": "go"})],
            max_tokens: 64,
            tools: Vec::new(),
        };

        let resp = run_tool_loop(&provider, base, &registry).await.unwrap();
        assert_eq!(resp.content, "done");

        let seen = provider.seen_messages.lock().unwrap();
        assert_eq!(seen.len(), 2);
        // second request: original + assistant turn + one result message
        // holding BOTH tool results
        let second = &seen[1];
        assert_eq!(second.len(), 3);
        let results = second[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["tool_use_id"], "a");
        assert_eq!(results[1]["tool_use_id"], "b");
        assert_eq!(results[0]["is_error"], true);
        assert!(results[0]["content"]
            .as_str()
            .unwrap()
            .contains("unknown tool"));
    }

    /// Provider that always asks for tools — exercises the iteration cap.
    struct AlwaysTools;

    #[async_trait]
    impl LlmProvider for AlwaysTools {
        fn name(&self) -> &str {
            "always-tools"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: String::new(),
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "tool_use".into(),
                tool_calls: vec![ToolCall {
                    id: "x".into(),
                    name: "nope".into(),
                    input: serde_json::json!({}),
                }],
            })
        }
    }

    #[tokio::test]
    async fn iteration_cap_returns_last_response() {
        let base = ChatRequest {
            model: "m".into(),
            system: "s".into(),
            messages: vec![serde_json::json!({"role": "user", "content": "go"})],
            max_tokens: 64,
            tools: Vec::new(),
        };
        let resp = run_tool_loop(&AlwaysTools, base, &empty_registry())
            .await
            .unwrap();
        assert_eq!(resp.stop_reason, "tool_use");
    }
}
