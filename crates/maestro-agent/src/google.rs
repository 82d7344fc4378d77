use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::openai::{flatten_result_content, IMAGE_PLACEHOLDER};
use crate::provider::{http_client, ChatRequest, ChatResponse, LlmProvider, ProviderError, ToolCall};

/// Gemini driver over the REST `generateContent` endpoint.
///
/// The hosted chat API keeps history server-side; this driver instead
/// resends the full canonical history on every call, so a `send` behaves
/// identically to the stateless drivers — callers cannot tell the
/// difference.
pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleProvider {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_key,
            base_url,
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = build_request_body(req);
        let url = self.endpoint(&req.model);

        debug!(model = %req.model, "sending request to Gemini");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Gemini API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(parse_response(api_resp, &req.model))
    }
}

fn build_request_body(req: &ChatRequest) -> serde_json::Value {
    let contents = convert_history(&req.messages);

    let mut body = serde_json::json!({
        "contents": contents,
        "generationConfig": {
            "maxOutputTokens": req.max_tokens,
        }
    });

    if !req.system.is_empty() {
        body["systemInstruction"] = serde_json::json!({
            "parts": [{ "text": req.system }]
        });
    }

    if !req.tools.is_empty() {
        let declarations: Vec<serde_json::Value> = req
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                })
            })
            .collect();
        body["tools"] = serde_json::json!([{ "functionDeclarations": declarations }]);
    }

    body
}

/// Convert the canonical history into Gemini `contents`.
///
/// `tool_use` blocks become `functionCall` parts on a `model` turn;
/// `tool_result` blocks become `functionResponse` parts on a `user` turn
/// (the function name is recovered from the matching `tool_use` id, since
/// the canonical result block does not carry it).
pub(crate) fn convert_history(messages: &[serde_json::Value]) -> Vec<serde_json::Value> {
    let mut call_names: std::collections::HashMap<String, String> = Default::default();
    let mut contents = Vec::with_capacity(messages.len());

    for msg in messages {
        let role = match msg.get("role").and_then(|r| r.as_str()) {
            Some("assistant") => "model",
            _ => "user",
        };
        let content = msg.get("content");

        let mut parts: Vec<serde_json::Value> = Vec::new();
        match content {
            Some(serde_json::Value::String(s)) => {
                parts.push(serde_json::json!({ "text": s }));
            }
            Some(serde_json::Value::Array(blocks)) => {
                for block in blocks {
                    match block.get("type").and_then(|t| t.as_str()) {
                        Some("text") => {
                            if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                                parts.push(serde_json::json!({ "text": t }));
                            }
                        }
                        Some("tool_use") => {
                            let id = block
                                .get("id")
                                .and_then(|v| v.as_str())
                                .unwrap_or_default()
                                .to_string();
                            let name = block
                                .get("name")
                                .and_then(|v| v.as_str())
                                .unwrap_or("unknown")
                                .to_string();
                            call_names.insert(id, name.clone());
                            parts.push(serde_json::json!({
                                "functionCall": {
                                    "name": name,
                                    "args": block.get("input").cloned().unwrap_or(serde_json::json!({})),
                                }
                            }));
                        }
                        Some("tool_result") => {
                            let id = block
                                .get("tool_use_id")
                                .and_then(|v| v.as_str())
                                .unwrap_or_default();
                            let name = call_names
                                .get(id)
                                .cloned()
                                .unwrap_or_else(|| "unknown".to_string());
                            parts.push(serde_json::json!({
                                "functionResponse": {
                                    "name": name,
                                    "response": {
                                        "result": flatten_result_content(block.get("content")),
                                    }
                                }
                            }));
                        }
                        Some("image") => {
                            parts.push(serde_json::json!({ "text": IMAGE_PLACEHOLDER }));
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        if !parts.is_empty() {
            contents.push(serde_json::json!({ "role": role, "parts": parts }));
        }
    }

    contents
}

fn parse_response(resp: GeminiResponse, model: &str) -> ChatResponse {
    let candidate = resp.candidates.into_iter().next();

    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    if let Some(ref c) = candidate {
        for part in &c.content.parts {
            if let Some(ref text) = part.text {
                text_parts.push(text.clone());
            }
            if let Some(ref call) = part.function_call {
                // Gemini has no call ids; synthesize stable ones per turn.
                tool_calls.push(ToolCall {
                    id: format!("call_{}", tool_calls.len()),
                    name: call.name.clone(),
                    input: call.args.clone().unwrap_or(serde_json::json!({})),
                });
            }
        }
    }

    let stop_reason = if !tool_calls.is_empty() {
        "tool_use".to_string()
    } else {
        candidate
            .and_then(|c| c.finish_reason)
            .unwrap_or_default()
            .to_lowercase()
    };

    ChatResponse {
        content: text_parts.join(""),
        model: model.to_string(),
        tokens_in: resp
            .usage_metadata
            .as_ref()
            .map(|u| u.prompt_token_count)
            .unwrap_or(0),
        tokens_out: resp
            .usage_metadata
            .as_ref()
            .map(|u| u.candidates_token_count)
            .unwrap_or(0),
        stop_reason,
        tool_calls,
    }
}

// Gemini response types

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: GeminiContent,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    text: Option<String>,
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Deserialize)]
struct GeminiFunctionCall {
    name: String,
    args: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_round_trip_recovers_function_names() {
        let history = vec![
            serde_json::json!({"role": "user", "content": "where are the drains?"}),
            serde_json::json!({"role": "assistant", "content": [
                {"type": "tool_use", "id": "call_0", "name": "search", "input": {"query": "drain"}}
            ]}),
            serde_json::json!({"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "call_0", "content": "2 hits"}
            ]}),
        ];
        let contents = convert_history(&history);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "search");
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["name"],
            "search"
        );
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["response"]["result"],
            "2 hits"
        );
    }

    #[test]
    fn function_calls_yield_canonical_tool_use_stop() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {"parts": [
                    {"functionCall": {"name": "list_pages", "args": {"discipline": "Kitchen"}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 4}
        });
        let resp: GeminiResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(resp, "gemini-3-pro-preview");
        assert_eq!(parsed.stop_reason, "tool_use");
        assert_eq!(parsed.tool_calls[0].name, "list_pages");
        assert_eq!(parsed.tool_calls[0].id, "call_0");
    }

    #[test]
    fn plain_text_response_parses() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "The footing detail is on S-301."}]},
                "finishReason": "STOP"
            }]
        });
        let resp: GeminiResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(resp, "gemini-3-flash-preview");
        assert_eq!(parsed.content, "The footing detail is on S-301.");
        assert_eq!(parsed.stop_reason, "stop");
        assert!(parsed.tool_calls.is_empty());
    }
}
