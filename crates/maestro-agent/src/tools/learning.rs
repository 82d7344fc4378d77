//! Learning tools — direct-apply, real-time self-modification.
//!
//! Experience files under `identity/experience/` are fair game; the identity
//! files themselves (`soul.json`, `tone.json`) are on the denylist. Every
//! invocation is recorded in the experience log.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{object_schema, opt_str, req_str, Tool, ToolContext, ToolOutput};

const DENYLIST: &[&str] = &["soul.json", "tone.json"];

pub fn tools(ctx: Arc<ToolContext>) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(UpdateExperience { ctx: ctx.clone() }),
        Box::new(UpdateToolDescription { ctx: ctx.clone() }),
        Box::new(UpdateKnowledge { ctx }),
    ]
}

fn log_change(ctx: &ToolContext, tool: &str, details: Value) {
    // audit only — a logging failure must not fail the tool call
    let _ = ctx.store.log_experience(tool, &details);
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

fn write_json_atomic(path: &Path, value: &Value) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(value).unwrap_or_default())?;
    fs::rename(&tmp, path)
}

struct UpdateExperience {
    ctx: Arc<ToolContext>,
}

impl UpdateExperience {
    fn apply(&self, file: &str, action: &str, field: &str, value: &str) -> Result<String, String> {
        let file_name = Path::new(file)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.to_string());
        if DENYLIST.contains(&file_name.as_str()) {
            return Err(format!("DENIED: {file} is read-only (identity file)"));
        }

        let target = self.ctx.identity_dir.join("experience").join(&file_name);
        if !target.exists() {
            return Err(format!("NOT FOUND: {file} does not exist in experience/"));
        }
        if target.extension().and_then(|e| e.to_str()) != Some("json") {
            return Err(format!("SKIP: {file} is not a JSON file"));
        }

        let text =
            fs::read_to_string(&target).map_err(|e| format!("ERROR reading {file}: {e}"))?;
        let mut data: Value =
            serde_json::from_str(&text).map_err(|e| format!("ERROR reading {file}: {e}"))?;
        if !data.is_object() {
            return Err(format!("ERROR reading {file}: not a JSON object"));
        }

        let outcome = match action {
            "append_to_list" => {
                if !data[field].is_array() {
                    data[field] = Value::Array(Vec::new());
                }
                let list = data[field].as_array_mut().unwrap();
                let candidate = Value::String(value.to_string());
                if !value.is_empty() && !list.contains(&candidate) {
                    list.push(candidate);
                    format!("OK: appended to {file} -> {field}[]")
                } else {
                    return Err(format!("SKIP: duplicate or empty value for {file} -> {field}"));
                }
            }
            "set_field" => {
                if field.is_empty() {
                    return Err("SKIP: no field specified".to_string());
                }
                // a JSON value if it parses, otherwise a plain string
                data[field] = serde_json::from_str(value)
                    .unwrap_or_else(|_| Value::String(value.to_string()));
                format!("OK: set {file} -> {field}")
            }
            other => return Err(format!("SKIP: unknown action '{other}'")),
        };

        write_json_atomic(&target, &data).map_err(|e| format!("ERROR writing {file}: {e}"))?;
        Ok(outcome)
    }
}

#[async_trait]
impl Tool for UpdateExperience {
    fn name(&self) -> &str {
        "update_experience"
    }
    fn description(&self) -> &str {
        "Update an experience file with something learned. Use append_to_list \
         for lessons and patterns, set_field to replace a value. Identity \
         files are read-only."
    }
    fn input_schema(&self) -> Value {
        object_schema(&[
            ("file", "string", "Experience file name, e.g. patterns.json", true),
            ("action", "string", "append_to_list or set_field", true),
            ("field", "string", "Top-level field to modify", true),
            ("value", "string", "Value to write (JSON parsed when possible)", true),
            ("reasoning", "string", "Why this is worth remembering", true),
        ])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let (file, action, field, value) = match (
            req_str(&input, "file"),
            req_str(&input, "action"),
            req_str(&input, "field"),
            req_str(&input, "value"),
        ) {
            (Ok(f), Ok(a), Ok(fi), Ok(v)) => (f, a, fi, v),
            (Err(out), ..) | (_, Err(out), ..) | (_, _, Err(out), _) | (_, _, _, Err(out)) => {
                return out
            }
        };
        let reasoning = opt_str(&input, "reasoning").unwrap_or("");

        let result = self.apply(file, action, field, value);
        let result_text = match &result {
            Ok(msg) => msg.clone(),
            Err(msg) => msg.clone(),
        };
        log_change(
            &self.ctx,
            "update_experience",
            serde_json::json!({
                "file": file, "action": action, "field": field,
                "value": truncate(value, 500), "reasoning": reasoning,
                "result": result_text,
            }),
        );
        info!(%file, %field, result = %result_text, "experience update");
        match result {
            Ok(msg) => ToolOutput::text(msg),
            Err(msg) => ToolOutput::failure(msg),
        }
    }
}

struct UpdateToolDescription {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for UpdateToolDescription {
    fn name(&self) -> &str {
        "update_tool_description"
    }
    fn description(&self) -> &str {
        "Record a usage tip for a tool. Tips are injected into the system \
         prompt of future conversations."
    }
    fn input_schema(&self) -> Value {
        object_schema(&[
            ("tool_name", "string", "Tool the tip applies to", true),
            ("tips", "string", "The tip", true),
        ])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let (tool_name, tips) = match (req_str(&input, "tool_name"), req_str(&input, "tips")) {
            (Ok(t), Ok(s)) => (t, s),
            (Err(out), _) | (_, Err(out)) => return out,
        };

        let tools_path = self.ctx.identity_dir.join("experience").join("tools.json");
        if !tools_path.exists() {
            return ToolOutput::failure("NOT FOUND: tools.json missing");
        }
        let mut data: Value = match fs::read_to_string(&tools_path)
            .map_err(|e| e.to_string())
            .and_then(|t| serde_json::from_str(&t).map_err(|e| e.to_string()))
        {
            Ok(v) => v,
            Err(e) => return ToolOutput::failure(format!("ERROR reading tools.json: {e}")),
        };
        if !data.is_object() {
            return ToolOutput::failure("ERROR reading tools.json: not a JSON object");
        }

        if !data["tool_tips"].is_object() {
            data["tool_tips"] = Value::Object(Default::default());
        }
        data["tool_tips"][tool_name] = Value::String(tips.to_string());

        if let Err(e) = write_json_atomic(&tools_path, &data) {
            return ToolOutput::failure(format!("ERROR writing tools.json: {e}"));
        }

        log_change(
            &self.ctx,
            "update_tool_description",
            serde_json::json!({
                "tool_name": tool_name,
                "tips": truncate(tips, 500),
                "result": format!("OK: updated tips for {tool_name}"),
            }),
        );
        ToolOutput::text(format!("OK: updated tips for {tool_name}"))
    }
}

struct UpdateKnowledge {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for UpdateKnowledge {
    fn name(&self) -> &str {
        "update_knowledge"
    }
    fn description(&self) -> &str {
        "Correct or enrich the knowledge store. Page fields: \
         sheet_reflection (replace), index (JSON object merge), \
         cross_references (JSON array extend). With region_id, \
         content_markdown replaces the region's deep brief."
    }
    fn input_schema(&self) -> Value {
        object_schema(&[
            ("page_name", "string", "Exact page name", true),
            ("field", "string", "Field to patch", true),
            ("value", "string", "New value", true),
            ("reasoning", "string", "Why the store is wrong or incomplete", true),
            ("region_id", "string", "Region id for content_markdown patches", false),
        ])
    }
    async fn execute(&self, input: Value) -> ToolOutput {
        let (page_name, field, value) = match (
            req_str(&input, "page_name"),
            req_str(&input, "field"),
            req_str(&input, "value"),
        ) {
            (Ok(p), Ok(f), Ok(v)) => (p, f, v),
            (Err(out), _, _) | (_, Err(out), _) | (_, _, Err(out)) => return out,
        };
        let region_id = opt_str(&input, "region_id");
        let reasoning = opt_str(&input, "reasoning").unwrap_or("");

        let result = self
            .ctx
            .knowledge
            .apply_update(page_name, field, value, region_id);
        let result_text = match &result {
            Ok(msg) => msg.clone(),
            Err(e) => e.to_string(),
        };
        log_change(
            &self.ctx,
            "update_knowledge",
            serde_json::json!({
                "page_name": page_name, "field": field, "region_id": region_id,
                "value": truncate(value, 500), "reasoning": reasoning,
                "result": result_text,
            }),
        );
        match result {
            Ok(msg) => ToolOutput::text(msg),
            Err(e) => ToolOutput::failure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::control::EngineSwitch;
    use maestro_core::events::EventBus;
    use maestro_knowledge::{Knowledge, ProjectKnowledge};
    use maestro_store::Store;
    use std::time::Duration;

    fn test_ctx(identity_dir: &Path) -> Arc<ToolContext> {
        let store = Arc::new(Store::open_in_memory(EventBus::new()).unwrap());
        let project = store.get_or_create_project("t", "").unwrap();
        Arc::new(ToolContext {
            store,
            knowledge: Arc::new(Knowledge::new(ProjectKnowledge::default())),
            project_id: project.id,
            identity_dir: identity_dir.to_path_buf(),
            workspaces_dir: identity_dir.join("workspaces"),
            google: None,
            request_timeout: Duration::from_secs(5),
            switch: Arc::new(EngineSwitch::new("gpt")),
        })
    }

    #[tokio::test]
    async fn append_to_list_dedupes_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let exp = dir.path().join("experience");
        fs::create_dir_all(&exp).unwrap();
        fs::write(exp.join("patterns.json"), r#"{"cross_discipline": []}"#).unwrap();

        let ctx = test_ctx(dir.path());
        let tool = UpdateExperience { ctx: ctx.clone() };

        let input = serde_json::json!({
            "file": "patterns.json", "action": "append_to_list",
            "field": "cross_discipline", "value": "kitchen slabs recess 6in",
            "reasoning": "seen on two projects",
        });
        match tool.execute(input.clone()).await {
            ToolOutput::Text(msg) => assert!(msg.starts_with("OK:")),
            other => panic!("expected success, got {other:?}"),
        }
        // second append of the same value is a skip
        match tool.execute(input).await {
            ToolOutput::Failure(msg) => assert!(msg.starts_with("SKIP:")),
            other => panic!("expected skip, got {other:?}"),
        }

        let entries = ctx.store.list_experience(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tool, "update_experience");
    }

    #[tokio::test]
    async fn identity_files_are_denied() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("experience")).unwrap();
        let ctx = test_ctx(dir.path());
        let tool = UpdateExperience { ctx };

        let out = tool
            .execute(serde_json::json!({
                "file": "soul.json", "action": "set_field",
                "field": "name", "value": "HAL", "reasoning": "no",
            }))
            .await;
        match out {
            ToolOutput::Failure(msg) => assert!(msg.starts_with("DENIED:")),
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tool_tips_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let exp = dir.path().join("experience");
        fs::create_dir_all(&exp).unwrap();
        fs::write(exp.join("tools.json"), r#"{"strategy": "search first"}"#).unwrap();

        let ctx = test_ctx(dir.path());
        let tool = UpdateToolDescription { ctx };
        let out = tool
            .execute(serde_json::json!({
                "tool_name": "search",
                "tips": "try material names before sheet numbers",
            }))
            .await;
        assert!(matches!(out, ToolOutput::Text(_)));

        let data: Value =
            serde_json::from_str(&fs::read_to_string(exp.join("tools.json")).unwrap()).unwrap();
        assert_eq!(
            data["tool_tips"]["search"],
            "try material names before sheet numbers"
        );
        assert_eq!(data["strategy"], "search first");
    }
}
