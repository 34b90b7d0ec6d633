use crate::error::{LedgerError, Result};
use crate::state::LedgerState;
use crate::types::{Section, TaskId, TaskKey, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Result of recording a tracked visit. A repeat visit is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementOutcome {
    Recorded { total: usize },
    AlreadyRecorded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEngagement {
    pub user_id: UserId,
    pub display_name: String,
    pub section: Section,
    pub task_type: String,
    pub timestamp: DateTime<Utc>,
}

/// Who opened each task's tracking link. Analytics only; rewards are
/// decided by the completion record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskTracking(BTreeMap<TaskKey, Vec<TaskEngagement>>);

impl TaskTracking {
    pub fn engagements(&self, key: TaskKey) -> &[TaskEngagement] {
        self.0.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    fn record(&mut self, key: TaskKey, engagement: TaskEngagement) -> EngagementOutcome {
        let entries = self.0.entry(key).or_default();
        if entries.iter().any(|e| e.user_id == engagement.user_id) {
            return EngagementOutcome::AlreadyRecorded;
        }
        entries.push(engagement);
        EngagementOutcome::Recorded {
            total: entries.len(),
        }
    }
}

impl LedgerState {
    pub fn record_task_engagement(
        &mut self,
        user: UserId,
        display_name: &str,
        section: Section,
        task: TaskId,
        task_type: &str,
    ) -> Result<EngagementOutcome> {
        self.ensure_not_banned(user)?;
        if !self.tasks.contains(section, task) {
            return Err(LedgerError::NotFound(format!("no task {task} in {section}")));
        }

        let key = TaskKey::new(section, task);
        let outcome = self.tracking.record(
            key,
            TaskEngagement {
                user_id: user,
                display_name: display_name.to_string(),
                section,
                task_type: task_type.to_string(),
                timestamp: Utc::now(),
            },
        );

        match outcome {
            EngagementOutcome::Recorded { total } => {
                info!(user = %user, task = %key, total, "📊 Task engagement tracked")
            }
            EngagementOutcome::AlreadyRecorded => {
                debug!(user = %user, task = %key, "Task engagement already tracked")
            }
        }
        Ok(outcome)
    }
}
