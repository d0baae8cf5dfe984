use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Immutable result of moderating one content item.
///
/// Invariant: `passed` is true only when `issues` is empty AND `score`
/// (the mean of the sub-check scores) clears the acceptance threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    /// Arithmetic mean of the sub-check scores, 0.0–1.0.
    pub score: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    /// Named sub-check → its score.
    pub checks: BTreeMap<String, f64>,
}

impl Verdict {
    /// One-line summary for logs and dashboard lists.
    pub fn summary(&self) -> String {
        let status = if self.passed { "approved" } else { "rejected" };
        format!(
            "{status} (score {:.2}, {} issue(s))",
            self.score,
            self.issues.len()
        )
    }
}
