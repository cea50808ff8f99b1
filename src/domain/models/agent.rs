//! Agent domain model.
//!
//! Agents are workers identified by a unique name. Rollup counters are
//! maintained by the lifecycle engine on every terminal transition (see
//! `application::lifecycle`) and must never be treated as authoritative
//! ordering — they are a derived statistic, not a scheduling input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Presence status of an agent, maintained by the heartbeat sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
    Busy,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Offline
    }
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Busy => "busy",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Self::Online),
            "offline" => Some(Self::Offline),
            "busy" => Some(Self::Busy),
            _ => None,
        }
    }
}

/// Rollup counters derived from terminal task transitions.
///
/// `success_rate` is Laplace-smoothed (`(completed + 1) / (total + 1)`) so a
/// brand-new agent starts at 0.5 rather than `0/0`, and a single failure on
/// an otherwise-idle agent doesn't read as a 0% success rate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentStats {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
}

impl AgentStats {
    pub fn success_rate(&self) -> f64 {
        (self.completed_tasks as f64 + 1.0) / (self.total_tasks as f64 + 1.0)
    }

    pub fn record_completed(&mut self) {
        self.total_tasks += 1;
        self.completed_tasks += 1;
    }

    pub fn record_failed(&mut self) {
        self.total_tasks += 1;
        self.failed_tasks += 1;
    }
}

/// A worker that claims and executes tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub status: AgentStatus,
    pub capabilities: Option<serde_json::Value>,
    pub skills: Vec<String>,
    pub stats: AgentStats,
    pub current_task_id: Option<Uuid>,
    pub last_heartbeat: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: String, role: String, capabilities: Option<serde_json::Value>, skills: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            role,
            status: AgentStatus::Online,
            capabilities,
            skills,
            stats: AgentStats::default(),
            current_task_id: None,
            last_heartbeat: Utc::now(),
        }
    }
}

/// Unique binding between an agent and an external channel it was last seen on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentChannelBinding {
    pub agent_name: String,
    pub channel: String,
    pub last_seen: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_is_laplace_smoothed_for_a_new_agent() {
        let stats = AgentStats::default();
        assert!((stats.success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn success_rate_moves_with_outcomes() {
        let mut stats = AgentStats::default();
        stats.record_completed();
        stats.record_completed();
        stats.record_failed();
        // (2 completed + 1) / (3 total + 1) = 0.75
        assert!((stats.success_rate() - 0.75).abs() < 1e-9);
    }
}
