//! System prompt assembly.
//!
//! Two sources: identity (static — soul.json and tone.json, who the
//! assistant is) and experience (dynamic — tool strategy, discipline notes,
//! patterns, all writable by the learning tools). The prompt is rebuilt at
//! conversation start, so learning mutations show up on the next boot.

use std::fs;
use std::path::Path;

use serde_json::Value;

fn load_json(path: &Path) -> Option<Value> {
    let text = fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

fn push_str(parts: &mut Vec<String>, v: Option<&Value>, prefix: &str) {
    if let Some(s) = v.and_then(|v| v.as_str()) {
        if !s.is_empty() {
            parts.push(format!("{prefix}{s}"));
        }
    }
}

pub fn build_system_prompt(identity_dir: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();

    // Identity (static)
    let soul = load_json(&identity_dir.join("soul.json")).unwrap_or(Value::Null);
    let name = soul
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("Maestro");
    let role = soul.get("role").and_then(|v| v.as_str()).unwrap_or("");
    parts.push(format!("You are {name}. {role}."));
    push_str(&mut parts, soul.get("purpose"), "");
    push_str(&mut parts, soul.get("boundaries"), "");

    if let Some(tone) = load_json(&identity_dir.join("tone.json")) {
        push_str(&mut parts, tone.get("style"), "\nCommunication: ");
        if let Some(principles) = tone.get("principles").and_then(|v| v.as_array()) {
            for p in principles {
                if let Some(s) = p.as_str() {
                    parts.push(format!("- {s}"));
                }
            }
        }
    }

    // Experience (dynamic)
    let experience = identity_dir.join("experience");

    if let Some(tools) = load_json(&experience.join("tools.json")) {
        push_str(&mut parts, tools.get("strategy"), "\nTool strategy: ");
        push_str(&mut parts, tools.get("search_tips"), "Search: ");
        push_str(&mut parts, tools.get("vision_strategy"), "Vision: ");
        push_str(&mut parts, tools.get("learning_strategy"), "Learning: ");
        push_str(&mut parts, tools.get("gaps_strategy"), "Gaps: ");

        if let Some(tips) = tools.get("tool_tips").and_then(|v| v.as_object()) {
            if !tips.is_empty() {
                parts.push("\n### Tool Tips (learned from experience)".to_string());
                for (tool_name, tip) in tips {
                    if let Some(t) = tip.as_str() {
                        parts.push(format!("- **{tool_name}**: {t}"));
                    }
                }
            }
        }
    }

    let disciplines_dir = experience.join("disciplines");
    if disciplines_dir.is_dir() {
        let mut files: Vec<_> = fs::read_dir(&disciplines_dir)
            .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default();
        files.sort();
        for file in files {
            let Some(disc) = load_json(&file) else { continue };
            let heading = disc
                .get("discipline")
                .and_then(|v| v.as_str())
                .map(String::from)
                .unwrap_or_else(|| {
                    file.file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_default()
                });
            parts.push(format!("\n### {heading}"));
            if let Some(prefixes) = disc.get("sheet_prefixes").and_then(|v| v.as_array()) {
                let joined: Vec<&str> = prefixes.iter().filter_map(|p| p.as_str()).collect();
                parts.push(format!("Sheets: {}", joined.join(", ")));
            }
            for (key, label) in [("what_to_watch", "Watch"), ("learned", "Learned")] {
                if let Some(items) = disc.get(key).and_then(|v| v.as_array()) {
                    for item in items {
                        if let Some(s) = item.as_str() {
                            parts.push(format!("- {label}: {s}"));
                        }
                    }
                }
            }
        }
    }

    if let Some(patterns) = load_json(&experience.join("patterns.json")) {
        for (key, heading) in [
            ("cross_discipline", "Cross-Discipline Patterns"),
            ("project_specific", "Project-Specific"),
            ("lessons_from_benchmarks", "Benchmark Lessons"),
        ] {
            if let Some(items) = patterns.get(key).and_then(|v| v.as_array()) {
                if !items.is_empty() {
                    parts.push(format!("\n### {heading}"));
                    for item in items {
                        if let Some(s) = item.as_str() {
                            parts.push(format!("- {s}"));
                        }
                    }
                }
            }
        }
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_assembles_identity_and_experience() {
        let dir = tempfile::tempdir().unwrap();
        let exp = dir.path().join("experience");
        fs::create_dir_all(&exp).unwrap();
        fs::write(
            dir.path().join("soul.json"),
            r#"{"name": "Maestro", "role": "a construction plan analyst", "purpose": "Keep the super ahead of problems."}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("tone.json"),
            r#"{"style": "direct, field-ready", "principles": ["No filler."]}"#,
        )
        .unwrap();
        fs::write(
            exp.join("tools.json"),
            r#"{"strategy": "search before vision", "tool_tips": {"search": "materials first"}}"#,
        )
        .unwrap();

        let prompt = build_system_prompt(dir.path());
        assert!(prompt.starts_with("You are Maestro. a construction plan analyst."));
        assert!(prompt.contains("Keep the super ahead of problems."));
        assert!(prompt.contains("- No filler."));
        assert!(prompt.contains("Tool strategy: search before vision"));
        assert!(prompt.contains("**search**: materials first"));
    }

    #[test]
    fn missing_identity_still_yields_a_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = build_system_prompt(dir.path());
        assert!(prompt.contains("You are Maestro"));
    }
}
