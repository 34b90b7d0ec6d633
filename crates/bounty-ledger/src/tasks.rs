//! Task catalog and per-user completion tracking.
//!
//! Tasks get a stable [`TaskId`] on creation; each section keeps an ordered
//! list of ids for display, so removing a task never changes what an
//! outstanding completion key or tracking link refers to.

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::state::LedgerState;
use crate::types::{Amount, ClientId, Section, TaskId, TaskKey, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

const TRACKING_MARKER: &str = "TRACKING:";
const ORIGINAL_MARKER: &str = "ORIGINAL:";
const TITLE_SEPARATOR: &str = " - ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    Standard {
        url: Option<String>,
        reward: Option<Amount>,
    },
    /// Promotional task issued for a client; the payout is decided by the
    /// operator.
    Client {
        client_id: ClientId,
        label: String,
        original_url: String,
    },
}

impl TaskKind {
    /// Reads the task text once. Any text carrying both client markers is a
    /// client task and must name a well-formed client id; anything else is
    /// standard.
    pub fn parse(text: &str) -> Result<Self> {
        if text.contains(TRACKING_MARKER) && text.contains(ORIGINAL_MARKER) {
            return parse_client_markers(text);
        }
        Ok(TaskKind::Standard {
            url: extract_url(text).map(str::to_string),
            reward: extract_reward(text),
        })
    }

    pub fn reward(&self) -> Option<Amount> {
        match self {
            TaskKind::Standard { reward, .. } => *reward,
            TaskKind::Client { .. } => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            TaskKind::Standard { url, .. } => url.as_deref(),
            TaskKind::Client { original_url, .. } => Some(original_url),
        }
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        match self {
            TaskKind::Client { client_id, .. } => Some(client_id),
            TaskKind::Standard { .. } => None,
        }
    }

    pub fn is_client(&self) -> bool {
        matches!(self, TaskKind::Client { .. })
    }
}

/// Value following `marker`, up to the next ` - ` or whitespace.
fn marker_value<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let end = rest
        .find(TITLE_SEPARATOR)
        .into_iter()
        .chain(rest.find(char::is_whitespace))
        .min()
        .unwrap_or(rest.len());
    let value = &rest[..end];
    (!value.is_empty()).then_some(value)
}

fn parse_client_markers(text: &str) -> Result<TaskKind> {
    let tracking = marker_value(text, TRACKING_MARKER).ok_or_else(|| {
        LedgerError::Validation(format!("{TRACKING_MARKER} needs a client id"))
    })?;
    let original_url = marker_value(text, ORIGINAL_MARKER).ok_or_else(|| {
        LedgerError::Validation(format!("{ORIGINAL_MARKER} needs a URL"))
    })?;
    let (client_id, label) = match tracking.split_once('_') {
        Some((id, label)) if !label.is_empty() => (id, label),
        _ => (tracking, crate::links::DEFAULT_TASK_TYPE),
    };
    let client_id = client_id.parse::<ClientId>().map_err(|_| {
        LedgerError::Validation(format!("malformed client id in {TRACKING_MARKER}{tracking}"))
    })?;
    Ok(TaskKind::Client {
        client_id,
        label: label.to_string(),
        original_url: original_url.to_string(),
    })
}

/// First `http://` or `https://` URL, up to whitespace.
pub fn extract_url(text: &str) -> Option<&str> {
    let start = ["http://", "https://"]
        .iter()
        .filter_map(|scheme| text.find(scheme))
        .min()?;
    let rest = &text[start..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// First `₹` immediately followed by `digits[.digits]`.
pub fn extract_reward(text: &str) -> Option<Amount> {
    text.match_indices('₹').find_map(|(idx, sym)| {
        let rest = &text[idx + sym.len()..];
        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if int_len == 0 {
            return None;
        }
        let mut len = int_len;
        if let Some(frac) = rest[int_len..].strip_prefix('.') {
            let frac_len = frac.find(|c: char| !c.is_ascii_digit()).unwrap_or(frac.len());
            if frac_len > 0 {
                len += 1 + frac_len;
            }
        }
        rest[..len].parse::<f64>().ok().map(Amount::from_decimal)
    })
}

pub fn parse_title(text: &str) -> String {
    let text = text.trim();
    text.split(TITLE_SEPARATOR)
        .next()
        .unwrap_or(text)
        .trim()
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub section: Section,
    pub title: String,
    pub text: String,
    pub kind: TaskKind,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn key(&self) -> TaskKey {
        TaskKey::new(self.section, self.id)
    }
}

/// A completion awaiting operator proof review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSubmission {
    pub task: TaskKey,
    pub title: String,
    pub reward: Option<Amount>,
    pub client_task: bool,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Completed,
    AlreadyDone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCompletion {
    pub status: CompletionStatus,
    pub auto_credited: bool,
    pub reward: Option<Amount>,
    pub task: Task,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskCatalog {
    next_task_id: u64,
    tasks: BTreeMap<TaskId, Task>,
    sections: BTreeMap<Section, Vec<TaskId>>,
    completed: BTreeMap<UserId, BTreeSet<TaskKey>>,
    pending: BTreeMap<UserId, BTreeMap<TaskKey, PendingSubmission>>,
}

impl Default for TaskCatalog {
    fn default() -> Self {
        Self {
            next_task_id: 1,
            tasks: BTreeMap::new(),
            sections: BTreeMap::new(),
            completed: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }
}

impl TaskCatalog {
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Tasks of a section in display order.
    pub fn section(&self, section: Section) -> Vec<Task> {
        self.section_ids(section)
            .iter()
            .filter_map(|id| self.tasks.get(id).cloned())
            .collect()
    }

    pub fn at(&self, section: Section, index: usize) -> Option<&Task> {
        self.section_ids(section)
            .get(index)
            .and_then(|id| self.tasks.get(id))
    }

    pub fn contains(&self, section: Section, id: TaskId) -> bool {
        self.tasks.get(&id).is_some_and(|t| t.section == section)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn client_task_count(&self) -> usize {
        self.tasks.values().filter(|t| t.kind.is_client()).count()
    }

    pub fn is_completed(&self, user: UserId, key: TaskKey) -> bool {
        self.completed.get(&user).is_some_and(|keys| keys.contains(&key))
    }

    pub fn completed_by(&self, user: UserId) -> impl Iterator<Item = TaskKey> + '_ {
        self.completed.get(&user).into_iter().flatten().copied()
    }

    pub fn pending_submission(&self, user: UserId, key: TaskKey) -> Option<&PendingSubmission> {
        self.pending.get(&user).and_then(|subs| subs.get(&key))
    }

    pub fn pending_submissions(&self) -> impl Iterator<Item = (UserId, &PendingSubmission)> + '_ {
        self.pending
            .iter()
            .flat_map(|(user, subs)| subs.values().map(move |s| (*user, s)))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(BTreeMap::len).sum()
    }

    fn section_ids(&self, section: Section) -> &[TaskId] {
        self.sections.get(&section).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn insert(&mut self, section: Section, text: &str) -> Result<Task> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LedgerError::Validation("task text cannot be empty".into()));
        }

        let kind = TaskKind::parse(text)?;
        let id = TaskId::new(self.next_task_id);
        self.next_task_id += 1;

        let task = Task {
            id,
            section,
            title: parse_title(text),
            text: text.to_string(),
            kind,
            created_at: Utc::now(),
        };
        self.tasks.insert(id, task.clone());
        self.sections.entry(section).or_default().push(id);
        Ok(task)
    }

    pub(crate) fn remove_at(&mut self, section: Section, index: usize) -> Result<Task> {
        let ids = self.sections.entry(section).or_default();
        if index >= ids.len() {
            return Err(LedgerError::NotFound(format!(
                "no task at position {index} in {section}"
            )));
        }
        let id = ids.remove(index);
        self.tasks
            .remove(&id)
            .ok_or_else(|| LedgerError::NotFound(format!("task {id} missing from catalog")))
    }

    /// Drops every client task for `client_id`, returning the removed ids.
    pub(crate) fn remove_client_tasks(&mut self, client_id: &ClientId) -> Vec<TaskId> {
        let removed: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.kind.client_id() == Some(client_id))
            .map(|t| t.id)
            .collect();
        for id in &removed {
            self.tasks.remove(id);
        }
        for ids in self.sections.values_mut() {
            ids.retain(|id| !removed.contains(id));
        }
        removed
    }
}

impl LedgerState {
    pub fn add_task(&mut self, section: Section, text: &str) -> Result<Task> {
        let task = self.tasks.insert(section, text)?;
        info!(
            section = %section,
            task_id = %task.id,
            title = %task.title,
            reward = ?task.kind.reward().map(|r| r.to_string()),
            "📝 Task added"
        );
        Ok(task)
    }

    pub fn remove_task(&mut self, section: Section, index: usize) -> Result<Task> {
        let task = self.tasks.remove_at(section, index)?;
        info!(section = %section, task_id = %task.id, title = %task.title, "🗑️ Task removed");
        Ok(task)
    }

    pub fn complete_task(
        &mut self,
        config: &LedgerConfig,
        user: UserId,
        section: Section,
        index: usize,
    ) -> Result<TaskCompletion> {
        self.ensure_not_banned(user)?;

        let task = self
            .tasks
            .at(section, index)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("no task at position {index} in {section}")))?;
        let key = task.key();
        let reward = task.kind.reward();

        if self.tasks.is_completed(user, key) || self.tasks.pending_submission(user, key).is_some() {
            debug!(user = %user, task = %key, "Task already done");
            return Ok(TaskCompletion {
                status: CompletionStatus::AlreadyDone,
                auto_credited: false,
                reward,
                task,
            });
        }

        let auto_credit = match reward {
            Some(amount) if !task.kind.is_client() => amount >= config.auto_credit_threshold,
            _ => false,
        };

        if auto_credit {
            let amount = reward.unwrap_or(Amount::ZERO);
            self.balances.credit(user, amount, &config.limits)?;
            self.tasks.completed.entry(user).or_default().insert(key);
            info!(user = %user, task = %key, reward = %amount, "🎯 Task auto-credited");
        } else {
            let submission = PendingSubmission {
                task: key,
                title: task.title.clone(),
                reward,
                client_task: task.kind.is_client(),
                submitted_at: Utc::now(),
            };
            self.tasks
                .pending
                .entry(user)
                .or_default()
                .insert(key, submission);
            info!(user = %user, task = %key, "📋 Task submitted for review");
        }

        Ok(TaskCompletion {
            status: CompletionStatus::Completed,
            auto_credited: auto_credit,
            reward,
            task,
        })
    }

    /// Accepts a pending proof; the payout itself is a separate operator credit.
    pub fn approve_submission(&mut self, user: UserId, key: TaskKey) -> Result<PendingSubmission> {
        let submission = self.take_submission(user, key)?;
        self.tasks.completed.entry(user).or_default().insert(key);
        info!(user = %user, task = %key, "✅ Submission approved");
        Ok(submission)
    }

    pub fn reject_submission(&mut self, user: UserId, key: TaskKey) -> Result<PendingSubmission> {
        let submission = self.take_submission(user, key)?;
        info!(user = %user, task = %key, "❌ Submission rejected");
        Ok(submission)
    }

    fn take_submission(&mut self, user: UserId, key: TaskKey) -> Result<PendingSubmission> {
        let subs = self
            .tasks
            .pending
            .get_mut(&user)
            .ok_or_else(|| LedgerError::NotFound(format!("no pending submission {key} for {user}")))?;
        let submission = subs
            .remove(&key)
            .ok_or_else(|| LedgerError::NotFound(format!("no pending submission {key} for {user}")))?;
        if subs.is_empty() {
            self.tasks.pending.remove(&user);
        }
        Ok(submission)
    }
}
