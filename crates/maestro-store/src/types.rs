use serde::{Deserialize, Serialize};

/// The singleton scope — one deployment serves one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: i64,
    pub project_id: String,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// One row of `list_workspaces` — metadata plus child counts.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceSummary {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub page_count: usize,
    pub note_count: usize,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspacePage {
    pub id: i64,
    pub workspace_id: i64,
    pub page_name: String,
    pub description: String,
    pub added_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceNote {
    pub id: i64,
    pub workspace_id: i64,
    pub text: String,
    pub source: String,
    pub source_page: Option<String>,
    pub added_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightStatus {
    Pending,
    Complete,
    Failed,
}

impl HighlightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightStatus::Pending => "pending",
            HighlightStatus::Complete => "complete",
            HighlightStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, HighlightStatus::Pending)
    }
}

impl std::str::FromStr for HighlightStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(HighlightStatus::Pending),
            "complete" => Ok(HighlightStatus::Complete),
            "failed" => Ok(HighlightStatus::Failed),
            other => Err(format!("unknown highlight status: {other}")),
        }
    }
}

/// Normalized rectangle, all fields in [0, 1] with w > 0 and h > 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceHighlight {
    pub id: i64,
    pub workspace_page_id: i64,
    pub mission: String,
    pub status: HighlightStatus,
    pub bboxes: Vec<BBox>,
    pub created_at: String,
}

/// A workspace page joined with its highlights, for full payloads.
#[derive(Debug, Clone, Serialize)]
pub struct PageWithHighlights {
    #[serde(flatten)]
    pub page: WorkspacePage,
    pub highlights: Vec<WorkspaceHighlight>,
}

/// Full `get_workspace` payload — metadata + pages with highlights + notes.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceDetail {
    #[serde(flatten)]
    pub workspace: Workspace,
    pub pages: Vec<PageWithHighlights>,
    pub notes: Vec<WorkspaceNote>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub start: String,
    pub end: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub notes: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: i64,
    pub project_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub project_id: String,
    pub summary: String,
    pub total_exchanges: i64,
    pub compactions: i64,
    pub last_compaction: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceLogEntry {
    pub id: i64,
    pub tool: String,
    pub details: serde_json::Value,
    pub created_at: String,
}
