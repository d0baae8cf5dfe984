use postpilot_scheduler::ScheduledPost;
use serde::{Deserialize, Serialize};

/// One item the moderator turned away, with its reasons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedItem {
    pub title: String,
    pub score: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Outcome of running a content plan through moderation and scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessReport {
    pub total: usize,
    pub approved_count: usize,
    pub rejected_count: usize,
    pub scheduled_count: usize,
    pub rejected: Vec<RejectedItem>,
    pub schedule: Vec<ScheduledPost>,
}

impl ProcessReport {
    pub fn summary(&self) -> String {
        format!(
            "{} items: {} approved, {} rejected, {} scheduled",
            self.total, self.approved_count, self.rejected_count, self.scheduled_count
        )
    }
}
