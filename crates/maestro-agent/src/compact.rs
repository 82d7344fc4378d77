//! Compaction arithmetic and text shaping.
//!
//! Token estimation is deliberately approximate (length / 4): it only needs
//! to be monotonic and cheap. The summarization prompt and the truncation
//! fallback keep the conversation path total — a failed summarizer call can
//! not fail a turn.

use serde_json::Value;

use maestro_core::engines::{CHARS_PER_TOKEN, COMPACTION_THRESHOLD};
use maestro_store::types::MessageRow;

pub fn estimate_tokens(text: &str) -> usize {
    text.len() / CHARS_PER_TOKEN
}

pub fn estimate_rows_tokens(rows: &[MessageRow]) -> usize {
    rows.iter().map(|r| estimate_tokens(&r.content)).sum()
}

pub fn needs_compaction(
    fixed_tokens: usize,
    summary_tokens: usize,
    message_tokens: usize,
    context_limit: usize,
) -> bool {
    if context_limit == 0 {
        return true;
    }
    let total = fixed_tokens + summary_tokens + message_tokens;
    (total as f64 / context_limit as f64) >= COMPACTION_THRESHOLD
}

/// Flatten message rows to readable text for the summarizer: one
/// `Super:`/`Maestro:` line per row with a 500-char slice; embedded
/// tool-call block lists collapse to short markers.
pub fn messages_to_text(rows: &[MessageRow]) -> String {
    let mut lines = Vec::with_capacity(rows.len());
    for row in rows {
        let text = flatten_content(&row.content);
        if text.trim().is_empty() {
            continue;
        }
        let label = if row.role == "user" { "Super" } else { "Maestro" };
        let slice: String = text.chars().take(500).collect();
        lines.push(format!("{label}: {slice}"));
    }
    lines.join("\n")
}

/// Content is usually plain text, but may embed a serialized block list.
fn flatten_content(content: &str) -> String {
    let trimmed = content.trim_start();
    if !trimmed.starts_with('[') {
        return content.to_string();
    }
    let Ok(Value::Array(blocks)) = serde_json::from_str::<Value>(trimmed) else {
        return content.to_string();
    };
    let mut texts = Vec::new();
    for block in &blocks {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                    texts.push(t.to_string());
                }
            }
            Some("tool_use") => {
                let name = block.get("name").and_then(|n| n.as_str()).unwrap_or("?");
                texts.push(format!("[Tool: {name}]"));
            }
            Some("tool_result") => {
                let excerpt: String = crate::openai::flatten_result_content(block.get("content"))
                    .chars()
                    .take(200)
                    .collect();
                texts.push(format!("[Tool result: {excerpt}]"));
            }
            _ => {}
        }
    }
    if texts.is_empty() {
        content.to_string()
    } else {
        texts.join(" ")
    }
}

pub fn build_compaction_prompt(existing_summary: &str, old_text: &str) -> String {
    let mut parts = vec![
        "You are summarizing a conversation between Maestro (an AI construction plan analyst) \
         and a superintendent. Produce a concise summary that preserves:"
            .to_string(),
        "- Key decisions made".to_string(),
        "- Open questions and RFIs".to_string(),
        "- Important findings (coordination gaps, conflicts, missing info)".to_string(),
        "- Schedule items discussed (dates, deadlines, pour dates)".to_string(),
        "- Any commitments or action items".to_string(),
        "- The super's preferences and communication style".to_string(),
        String::new(),
        "Be factual and specific. Include dates, sheet numbers, and detail references."
            .to_string(),
        "Do NOT include pleasantries, greetings, or filler.".to_string(),
    ];

    if !existing_summary.is_empty() {
        parts.push(format!("\n--- EXISTING SUMMARY ---\n{existing_summary}"));
    }
    parts.push(format!(
        "\n--- NEW CONVERSATION TO INCORPORATE ---\n{old_text}"
    ));
    parts.push("\n--- UPDATED SUMMARY ---".to_string());

    parts.join("\n")
}

/// Summarizer-failure fallback: existing summary plus the first 2 KB of the
/// flattened old text.
pub fn fallback_summary(existing_summary: &str, old_text: &str) -> String {
    let truncated = if old_text.len() > 2000 {
        let slice: String = old_text.chars().take(2000).collect();
        format!("{slice}\n[...truncated...]")
    } else {
        old_text.to_string()
    };
    if existing_summary.is_empty() {
        truncated
    } else {
        format!("{existing_summary}\n\n[Additional context]\n{truncated}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, role: &str, content: &str) -> MessageRow {
        MessageRow {
            id,
            project_id: "p".into(),
            role: role.into(),
            content: content.into(),
            created_at: String::new(),
        }
    }

    #[test]
    fn token_estimate_is_len_over_four() {
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn threshold_fires_at_65_percent() {
        // fixed 1_000 + messages 10_000 of a 40_000 window = 27.5% — below
        assert!(!needs_compaction(1_000, 0, 10_000, 40_000));
        // 1_000 + 25_000 = 65% exactly — fires
        assert!(needs_compaction(1_000, 0, 25_000, 40_000));
        assert!(needs_compaction(0, 0, 1, 0));
    }

    #[test]
    fn flatten_labels_speakers_and_slices() {
        let rows = vec![
            row(1, "user", "when is the pour?"),
            row(2, "assistant", &"x".repeat(600)),
        ];
        let text = messages_to_text(&rows);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Super: when is the pour?"));
        assert!(lines[1].starts_with("Maestro: "));
        assert_eq!(lines[1].len(), "Maestro: ".len() + 500);
    }

    #[test]
    fn embedded_blocks_collapse_to_markers() {
        let content = serde_json::json!([
            {"type": "text", "text": "Checking."},
            {"type": "tool_use", "name": "search", "id": "x", "input": {}},
            {"type": "tool_result", "tool_use_id": "x", "content": "a very long tool result that should be trimmed"}
        ])
        .to_string();
        let rows = vec![row(1, "assistant", &content)];
        let text = messages_to_text(&rows);
        assert!(text.contains("[Tool: search]"));
        assert!(text.contains("[Tool result: a very long tool result"));
    }

    #[test]
    fn fallback_truncates_and_keeps_existing() {
        let long = "y".repeat(3000);
        let out = fallback_summary("prior facts", &long);
        assert!(out.starts_with("prior facts"));
        assert!(out.contains("[Additional context]"));
        assert!(out.contains("[...truncated...]"));
        assert!(out.len() < 2200 + "prior facts\n\n[Additional context]\n".len());
    }

    #[test]
    fn compaction_prompt_includes_both_sections() {
        let prompt = build_compaction_prompt("old summary", "Super: hi");
        assert!(prompt.contains("--- EXISTING SUMMARY ---"));
        assert!(prompt.contains("old summary"));
        assert!(prompt.contains("--- NEW CONVERSATION TO INCORPORATE ---"));
        assert!(prompt.ends_with("--- UPDATED SUMMARY ---"));
    }
}
