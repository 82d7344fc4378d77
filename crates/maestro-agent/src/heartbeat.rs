//! The proactive engine.
//!
//! Every interval the assistant wakes up and decides what to do from a
//! priority cascade:
//!
//!   URGENT → TARGETED → CURIOUS → BORED
//!
//! Urgent:   schedule event within the lookahead → review related pages
//! Targeted: open work in workspaces → deepen, cross-reference, find gaps
//! Curious:  known knowledge gaps → investigate
//! Bored:    nothing pressing → wander, cross-reference, find surprises
//!
//! The chosen mission is phrased as a prompt and fed through
//! `Conversation::send` — the exact same path a real user message takes —
//! so heartbeat tool calls behave identically to conversational ones.
//! Messages to the super only go out for urgent heartbeats.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, Timelike};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use maestro_core::events::{Event, EventBus};
use maestro_knowledge::Knowledge;
use maestro_store::types::{ScheduleEvent, WorkspaceSummary};
use maestro_store::Store;

use crate::conversation::Conversation;

// Work hours 7am-6pm: every 30 minutes. Off hours 6pm-10pm: every 60.
// Overnight 10pm-7am: silent.
const WORK_HOURS: (u32, u32) = (7, 18);
const SILENT_START: u32 = 22;
const WORK_INTERVAL_MIN: i64 = 30;
const OFF_INTERVAL_MIN: i64 = 60;

pub const SCHEDULE_LOOKAHEAD_DAYS: i64 = 2;

/// After this many consecutive bored heartbeats, add a cross-referencing
/// challenge from a different discipline.
const BOREDOM_ADVENTUROUS_THRESHOLD: u32 = 3;

const STATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// ── Persistent state ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisitInfo {
    pub count: u32,
    pub last: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatState {
    #[serde(default)]
    pub last_heartbeat: String,
    #[serde(default)]
    pub boredom_streak: u32,
    #[serde(default)]
    pub pages_visited: BTreeMap<String, VisitInfo>,
    #[serde(default)]
    pub last_schedule_check: String,
}

impl HeartbeatState {
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let tmp = path.with_extension("json.tmp");
        if std::fs::write(&tmp, serde_json::to_string_pretty(self).unwrap_or_default()).is_ok() {
            let _ = std::fs::rename(&tmp, path);
        }
    }
}

// ── Timing ───────────────────────────────────────────────────────────────

pub fn is_silent_hour(hour: u32) -> bool {
    hour >= SILENT_START || hour < WORK_HOURS.0
}

/// Heartbeat cadence for an hour of the day; `None` during silent hours.
pub fn interval_minutes(hour: u32) -> Option<i64> {
    if is_silent_hour(hour) {
        None
    } else if (WORK_HOURS.0..WORK_HOURS.1).contains(&hour) {
        Some(WORK_INTERVAL_MIN)
    } else {
        Some(OFF_INTERVAL_MIN)
    }
}

pub fn should_heartbeat(state: &HeartbeatState, now: NaiveDateTime) -> bool {
    let Some(interval) = interval_minutes(now.hour()) else {
        return false;
    };
    if state.last_heartbeat.is_empty() {
        return true;
    }
    match NaiveDateTime::parse_from_str(&state.last_heartbeat, STATE_TIME_FORMAT) {
        Ok(last) => (now - last).num_minutes() >= interval,
        Err(_) => true,
    }
}

// ── Decision engine ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatMode {
    Urgent,
    Targeted,
    Curious,
    Bored,
}

impl std::fmt::Display for HeartbeatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeartbeatMode::Urgent => write!(f, "urgent"),
            HeartbeatMode::Targeted => write!(f, "targeted"),
            HeartbeatMode::Curious => write!(f, "curious"),
            HeartbeatMode::Bored => write!(f, "bored"),
        }
    }
}

/// Lightweight per-page snapshot for the boredom scorer.
#[derive(Debug, Clone)]
pub struct PageProfile {
    pub name: String,
    pub discipline: String,
    pub pointer_count: usize,
    pub regions_without_pointer: usize,
}

#[derive(Debug, Clone)]
pub struct HeartbeatDecision {
    pub mode: HeartbeatMode,
    pub reason: String,
    pub prompt: String,
    /// Only urgent heartbeats message the super.
    pub should_message: bool,
    /// Boredom streak after this heartbeat.
    pub boredom_streak: u32,
    /// Pages this run set out to visit (bumps the visit counters).
    pub pages_touched: Vec<String>,
}

/// Pick what to do this heartbeat. Pure: all inputs are snapshots.
pub fn decide(
    events: &[ScheduleEvent],
    workspaces: &[WorkspaceSummary],
    gaps: &[serde_json::Value],
    pages: &[PageProfile],
    state: &HeartbeatState,
) -> HeartbeatDecision {
    // 1. URGENT — anything on the schedule inside the lookahead.
    if !events.is_empty() {
        let event_list = events
            .iter()
            .map(|e| format!("- {} ({})", e.title, e.start))
            .collect::<Vec<_>>()
            .join("\n");
        return HeartbeatDecision {
            mode: HeartbeatMode::Urgent,
            reason: format!(
                "{} event(s) in the next {SCHEDULE_LOOKAHEAD_DAYS} days",
                events.len()
            ),
            prompt: format!(
                "HEARTBEAT — URGENT: These events are coming up soon:\n{event_list}\n\n\
                 Review the relevant pages for these events. Check for conflicts, gaps, \
                 or anything the superintendent should know before these happen. \
                 If you find something important, note it. Be thorough."
            ),
            should_message: true,
            boredom_streak: 0,
            pages_touched: Vec::new(),
        };
    }

    // 2. TARGETED — the active workspace that has waited the longest.
    let mut active: Vec<&WorkspaceSummary> = workspaces
        .iter()
        .filter(|w| w.status == "active" && w.page_count > 0)
        .collect();
    active.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
    if let Some(target) = active.first() {
        return HeartbeatDecision {
            mode: HeartbeatMode::Targeted,
            reason: format!("Workspace '{}' has pages to review", target.title),
            prompt: format!(
                "HEARTBEAT — TARGETED: Review workspace '{}'.\n\n\
                 Look through the pages and notes. Are there open questions? \
                 Missing details? Cross-references to check? \
                 Deepen your understanding. Update your experience if you learn something.",
                target.title
            ),
            should_message: false,
            boredom_streak: 0,
            pages_touched: Vec::new(),
        };
    }

    // 3. CURIOUS — known gaps to investigate.
    if !gaps.is_empty() {
        let gap_list = gaps
            .iter()
            .take(5)
            .map(|g| {
                let kind = g.get("type").and_then(|v| v.as_str()).unwrap_or("?");
                let what = g
                    .get("page")
                    .or_else(|| g.get("detail"))
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| "?".to_string());
                format!("- {kind}: {what}")
            })
            .collect::<Vec<_>>()
            .join("\n");
        return HeartbeatDecision {
            mode: HeartbeatMode::Curious,
            reason: format!("{} gap(s) to investigate", gaps.len()),
            prompt: format!(
                "HEARTBEAT — CURIOUS: Found some gaps to investigate:\n{gap_list}\n\n\
                 Explore these gaps. Use vision if needed. \
                 Update the knowledge store if you find corrections. \
                 Update your experience with what you learn."
            ),
            should_message: false,
            boredom_streak: 0,
            pages_touched: Vec::new(),
        };
    }

    // 4. BORED — wander toward the least-visited, least-explained pages.
    let streak = state.boredom_streak + 1;
    decide_bored(pages, state, streak)
}

fn decide_bored(
    pages: &[PageProfile],
    state: &HeartbeatState,
    streak: u32,
) -> HeartbeatDecision {
    let reason = format!("Nothing pressing. Boredom streak: {streak}");

    let scored = score_pages(pages, &state.pages_visited);
    let Some(chosen) = pick_from_pool(&scored) else {
        return HeartbeatDecision {
            mode: HeartbeatMode::Bored,
            reason,
            prompt: "HEARTBEAT — Nothing to do.".to_string(),
            should_message: false,
            boredom_streak: streak,
            pages_touched: Vec::new(),
        };
    };

    if streak >= BOREDOM_ADVENTUROUS_THRESHOLD {
        let chosen_discipline = pages
            .iter()
            .find(|p| p.name == chosen)
            .map(|p| p.discipline.clone())
            .unwrap_or_default();
        let partners: Vec<&PageProfile> = pages
            .iter()
            .filter(|p| p.discipline != chosen_discipline && p.name != chosen)
            .collect();
        if let Some(partner) = partners.choose(&mut rand::thread_rng()) {
            return HeartbeatDecision {
                mode: HeartbeatMode::Bored,
                reason,
                prompt: format!(
                    "HEARTBEAT — BORED (cross-reference mode): Explore {chosen} \
                     and look for connections to {partner}.\n\n\
                     Read both sheets. Look for shared materials, dimensions that should match, \
                     coordination points, or potential conflicts between these disciplines. \
                     If you find something interesting, note it as a workspace note. \
                     Update your experience.",
                    partner = partner.name
                ),
                should_message: false,
                boredom_streak: streak,
                pages_touched: vec![chosen, partner.name.clone()],
            };
        }
    }

    HeartbeatDecision {
        mode: HeartbeatMode::Bored,
        reason,
        prompt: format!(
            "HEARTBEAT — BORED: Explore {chosen} — haven't visited much.\n\n\
             Read the sheet summary for {chosen}. Look at the regions. \
             Is anything surprising? Does anything connect to other work you know about? \
             If you find something interesting, note it. Update your experience."
        ),
        should_message: false,
        boredom_streak: streak,
        pages_touched: vec![chosen],
    }
}

/// Score every page; lower = more interesting. Heavily-visited pages and
/// pages already rich in pointers score high; unexplained regions pull the
/// score down.
pub fn score_pages(
    pages: &[PageProfile],
    visited: &BTreeMap<String, VisitInfo>,
) -> Vec<(String, i64)> {
    let mut scored: Vec<(String, i64)> = pages
        .iter()
        .map(|p| {
            let visits = visited.get(&p.name).map(|v| v.count).unwrap_or(0) as i64;
            let score = 10 * visits + p.pointer_count as i64
                - 5 * p.regions_without_pointer as i64;
            (p.name.clone(), score)
        })
        .collect();
    scored.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    scored
}

/// The bottom 20% (at least one) of the score table is the candidate pool.
pub fn pool_size(total: usize) -> usize {
    std::cmp::max(1, total / 5)
}

fn pick_from_pool(scored: &[(String, i64)]) -> Option<String> {
    if scored.is_empty() {
        return None;
    }
    let pool = &scored[..pool_size(scored.len())];
    pool.choose(&mut rand::thread_rng()).map(|(n, _)| n.clone())
}

/// Update state after a heartbeat completes.
pub fn record_heartbeat(
    state: &mut HeartbeatState,
    decision: &HeartbeatDecision,
    now: NaiveDateTime,
) {
    let stamp = now.format(STATE_TIME_FORMAT).to_string();
    state.last_heartbeat = stamp.clone();

    state.boredom_streak = if decision.mode == HeartbeatMode::Bored {
        decision.boredom_streak
    } else {
        0
    };

    for page in &decision.pages_touched {
        let entry = state.pages_visited.entry(page.clone()).or_default();
        entry.count += 1;
        entry.last = stamp.clone();
    }

    if matches!(
        decision.mode,
        HeartbeatMode::Urgent | HeartbeatMode::Targeted
    ) {
        state.last_schedule_check = stamp;
    }
}

// ── Runner ───────────────────────────────────────────────────────────────

/// Where urgent findings get delivered (the outbound text sender).
#[async_trait]
pub trait FindingSink: Send + Sync {
    async fn deliver(&self, text: &str);
}

pub struct HeartbeatRunner {
    pub conversation: Arc<Mutex<Conversation>>,
    pub store: Arc<Store>,
    pub knowledge: Arc<Knowledge>,
    pub bus: EventBus,
    pub project_id: String,
    pub state_path: PathBuf,
    pub sink: Arc<dyn FindingSink>,
}

impl HeartbeatRunner {
    /// Poll every minute until `stop` flips; the timing logic decides when
    /// a tick becomes a heartbeat.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        info!("heartbeat worker started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("heartbeat worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        let now = Local::now().naive_local();
        let mut state = HeartbeatState::load(&self.state_path);
        if !should_heartbeat(&state, now) {
            return;
        }

        let events = self
            .store
            .upcoming_events(&self.project_id, SCHEDULE_LOOKAHEAD_DAYS)
            .unwrap_or_default();
        let workspaces = self.store.list_workspaces(&self.project_id).unwrap_or_default();
        let (gaps, pages) = {
            let project = self.knowledge.read();
            let gaps = project.gaps();
            let pages: Vec<PageProfile> = project
                .pages
                .values()
                .map(|p| PageProfile {
                    name: p.name.clone(),
                    discipline: p.discipline.clone(),
                    pointer_count: p.pointers.len(),
                    regions_without_pointer: p.regions_without_pointer().len(),
                })
                .collect();
            (gaps, pages)
        };

        let decision = decide(&events, &workspaces, &gaps, &pages, &state);
        info!(mode = %decision.mode, reason = %decision.reason, "heartbeat");
        self.bus.emit(Event::Heartbeat {
            mode: decision.mode.to_string(),
            reason: decision.reason.clone(),
            should_message: decision.should_message,
        });

        // Same single-writer path as a user turn; a user message in flight
        // holds the lock until its turn completes.
        let response = {
            let mut conversation = self.conversation.lock().await;
            match conversation.send(&decision.prompt).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "heartbeat turn failed");
                    return;
                }
            }
        };

        record_heartbeat(&mut state, &decision, Local::now().naive_local());
        state.save(&self.state_path);

        if decision.should_message && !response.is_empty() {
            self.sink.deliver(&response).await;
            self.bus.emit(Event::Finding { text: response });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(title: &str, start: &str) -> ScheduleEvent {
        ScheduleEvent {
            id: "evt_1".into(),
            project_id: "p".into(),
            title: title.into(),
            start: start.into(),
            end: start.into(),
            event_type: "inspection".into(),
            notes: String::new(),
            created_at: String::new(),
        }
    }

    fn workspace(title: &str, pages: usize, updated: &str) -> WorkspaceSummary {
        WorkspaceSummary {
            slug: title.to_lowercase(),
            title: title.into(),
            description: String::new(),
            status: "active".into(),
            page_count: pages,
            note_count: 0,
            created_at: String::new(),
            updated_at: updated.into(),
        }
    }

    fn page(name: &str, discipline: &str, pointers: usize, missing: usize) -> PageProfile {
        PageProfile {
            name: name.into(),
            discipline: discipline.into(),
            pointer_count: pointers,
            regions_without_pointer: missing,
        }
    }

    #[test]
    fn silent_hours_wrap_midnight() {
        assert!(is_silent_hour(22));
        assert!(is_silent_hour(2));
        assert!(is_silent_hour(6));
        assert!(!is_silent_hour(7));
        assert!(!is_silent_hour(21));
    }

    #[test]
    fn intervals_follow_time_of_day() {
        assert_eq!(interval_minutes(9), Some(30));
        assert_eq!(interval_minutes(19), Some(60));
        assert_eq!(interval_minutes(23), None);
    }

    #[test]
    fn should_heartbeat_respects_interval() {
        let mut state = HeartbeatState::default();
        let noon = NaiveDateTime::parse_from_str("2026-08-03T12:00:00", STATE_TIME_FORMAT).unwrap();
        assert!(should_heartbeat(&state, noon));

        state.last_heartbeat = "2026-08-03T11:45:00".into();
        assert!(!should_heartbeat(&state, noon));

        state.last_heartbeat = "2026-08-03T11:29:00".into();
        assert!(should_heartbeat(&state, noon));

        // silent hours always skip
        let night = NaiveDateTime::parse_from_str("2026-08-03T23:00:00", STATE_TIME_FORMAT).unwrap();
        state.last_heartbeat = String::new();
        assert!(!should_heartbeat(&state, night));
    }

    #[test]
    fn cascade_prefers_urgent_then_targeted_then_curious() {
        let state = HeartbeatState::default();
        let pages = vec![page("A_101", "Architectural", 0, 2)];
        let gaps = vec![serde_json::json!({"type": "broken_ref", "detail": "A-999"})];
        let workspaces = vec![workspace("Roof", 2, "2026-01-01")];
        let events = vec![event("Footing inspection", "2026-08-02")];

        let d = decide(&events, &workspaces, &gaps, &pages, &state);
        assert_eq!(d.mode, HeartbeatMode::Urgent);
        assert!(d.should_message);
        assert!(d.prompt.contains("Footing inspection"));

        let d = decide(&[], &workspaces, &gaps, &pages, &state);
        assert_eq!(d.mode, HeartbeatMode::Targeted);
        assert!(!d.should_message);
        assert!(d.prompt.contains("Roof"));

        let d = decide(&[], &[], &gaps, &pages, &state);
        assert_eq!(d.mode, HeartbeatMode::Curious);
        assert!(d.prompt.contains("broken_ref"));

        let d = decide(&[], &[], &[], &pages, &state);
        assert_eq!(d.mode, HeartbeatMode::Bored);
        assert_eq!(d.boredom_streak, 1);
    }

    #[test]
    fn targeted_picks_least_recently_updated_workspace() {
        let state = HeartbeatState::default();
        let workspaces = vec![
            workspace("Fresh", 1, "2026-07-30"),
            workspace("Stale", 1, "2026-07-01"),
            workspace("Empty", 0, "2026-06-01"),
        ];
        let d = decide(&[], &workspaces, &[], &[], &state);
        assert_eq!(d.mode, HeartbeatMode::Targeted);
        assert!(d.prompt.contains("Stale"));
    }

    #[test]
    fn scoring_favors_unvisited_pages_with_unexplained_regions() {
        let mut visited = BTreeMap::new();
        visited.insert(
            "A_101".to_string(),
            VisitInfo { count: 3, last: String::new() },
        );
        let pages = vec![
            page("A_101", "Architectural", 5, 0), // 30 + 5 - 0 = 35
            page("S_201", "Structural", 2, 4),    // 0 + 2 - 20 = -18
            page("P_301", "Plumbing", 0, 0),      // 0
        ];
        let scored = score_pages(&pages, &visited);
        assert_eq!(scored[0].0, "S_201");
        assert_eq!(scored[0].1, -18);
        assert_eq!(scored[2].0, "A_101");
    }

    #[test]
    fn bored_pool_is_bottom_fifth() {
        assert_eq!(pool_size(3), 1);
        assert_eq!(pool_size(10), 2);
        assert_eq!(pool_size(100), 20);
    }

    #[test]
    fn high_streak_adds_cross_discipline_partner() {
        let state = HeartbeatState {
            boredom_streak: 3,
            ..Default::default()
        };
        let pages = vec![
            page("A_101", "Architectural", 0, 0),
            page("S_201", "Structural", 0, 0),
        ];
        let d = decide(&[], &[], &[], &pages, &state);
        assert_eq!(d.mode, HeartbeatMode::Bored);
        assert_eq!(d.boredom_streak, 4);
        assert!(d.prompt.contains("cross-reference mode"));
        assert_eq!(d.pages_touched.len(), 2);
    }

    #[test]
    fn record_resets_streak_and_bumps_visits() {
        let mut state = HeartbeatState {
            boredom_streak: 2,
            ..Default::default()
        };
        let now = NaiveDateTime::parse_from_str("2026-08-03T12:00:00", STATE_TIME_FORMAT).unwrap();

        let bored = HeartbeatDecision {
            mode: HeartbeatMode::Bored,
            reason: String::new(),
            prompt: String::new(),
            should_message: false,
            boredom_streak: 3,
            pages_touched: vec!["A_101".into()],
        };
        record_heartbeat(&mut state, &bored, now);
        assert_eq!(state.boredom_streak, 3);
        assert_eq!(state.pages_visited["A_101"].count, 1);
        assert_eq!(state.last_heartbeat, "2026-08-03T12:00:00");

        let urgent = HeartbeatDecision {
            mode: HeartbeatMode::Urgent,
            reason: String::new(),
            prompt: String::new(),
            should_message: true,
            boredom_streak: 0,
            pages_touched: Vec::new(),
        };
        record_heartbeat(&mut state, &urgent, now);
        assert_eq!(state.boredom_streak, 0);
        assert_eq!(state.last_schedule_check, "2026-08-03T12:00:00");
    }

    #[test]
    fn state_round_trips_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heartbeat_state.json");
        let mut state = HeartbeatState::default();
        state.boredom_streak = 2;
        state.pages_visited.insert(
            "A_101".into(),
            VisitInfo { count: 4, last: "2026-08-01T09:00:00".into() },
        );
        state.save(&path);

        let loaded = HeartbeatState::load(&path);
        assert_eq!(loaded.boredom_streak, 2);
        assert_eq!(loaded.pages_visited["A_101"].count, 4);

        // missing or corrupt files fall back to defaults
        assert_eq!(HeartbeatState::load(&dir.path().join("missing.json")).boredom_streak, 0);
    }
}
