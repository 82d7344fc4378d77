//! Engine catalog — maps engine names to their provider, model identifier
//! and context window. Adding a model is one new entry here.

use serde::Serialize;

/// Which wire protocol a given engine speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Google,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Google => write!(f, "google"),
        }
    }
}

/// One selectable engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSpec {
    pub name: &'static str,
    pub provider: ProviderKind,
    pub model: &'static str,
    pub display: &'static str,
    pub context_limit: usize,
}

pub const DEFAULT_ENGINE: &str = "gpt";

/// Model used for compaction summaries — cheapest/fastest entry.
pub const SUMMARIZER_ENGINE: &str = "gemini-flash";

const ENGINES: &[EngineSpec] = &[
    EngineSpec {
        name: "opus",
        provider: ProviderKind::Anthropic,
        model: "claude-opus-4-6",
        display: "Opus 4.6",
        context_limit: 1_000_000,
    },
    EngineSpec {
        name: "gemini",
        provider: ProviderKind::Google,
        model: "gemini-3-pro-preview",
        display: "Gemini 3 Pro",
        context_limit: 1_000_000,
    },
    EngineSpec {
        name: "gemini-flash",
        provider: ProviderKind::Google,
        model: "gemini-3-flash-preview",
        display: "Gemini 3 Flash",
        context_limit: 1_000_000,
    },
    EngineSpec {
        name: "gpt",
        provider: ProviderKind::OpenAi,
        model: "gpt-5.2",
        display: "GPT-5.2",
        context_limit: 128_000,
    },
];

pub fn all_engines() -> &'static [EngineSpec] {
    ENGINES
}

pub fn find_engine(name: &str) -> Option<&'static EngineSpec> {
    ENGINES.iter().find(|e| e.name == name)
}

/// Comma-separated engine names, for "unknown engine" error messages.
pub fn engine_names() -> String {
    ENGINES
        .iter()
        .map(|e| e.name)
        .collect::<Vec<_>>()
        .join(", ")
}

// Conversation maintenance constants.

/// Compact once estimated usage crosses this fraction of the context window.
pub const COMPACTION_THRESHOLD: f64 = 0.65;
/// Messages kept verbatim after a compaction.
pub const KEEP_RECENT: usize = 20;
/// Rough character-per-token ratio for estimation.
pub const CHARS_PER_TOKEN: usize = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_engine_exists() {
        assert!(find_engine(DEFAULT_ENGINE).is_some());
        assert!(find_engine(SUMMARIZER_ENGINE).is_some());
    }

    #[test]
    fn unknown_engine_is_none() {
        assert!(find_engine("claude-9000").is_none());
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = all_engines().iter().map(|e| e.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), all_engines().len());
    }
}
