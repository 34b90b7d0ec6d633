//! Client campaigns: id allocation, tracking-link issuance and per-client
//! engagement records.

use crate::error::{LedgerError, Result};
use crate::state::LedgerState;
use crate::tracking::EngagementOutcome;
use crate::types::{ClientId, Section, TaskId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTask {
    pub client_id: ClientId,
    pub name: String,
    pub urls: Vec<String>,
    /// Deep-link payloads, one per url, in the same order.
    pub tracking_urls: Vec<String>,
    pub task_ids: Vec<TaskId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientReferral {
    pub user_id: UserId,
    pub display_name: String,
    pub task_type: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedClient {
    pub client: ClientTask,
    pub engagements: usize,
    pub removed_tasks: Vec<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientRegistry {
    /// Never reset at day boundaries.
    next_sequence: u64,
    clients: BTreeMap<ClientId, ClientTask>,
    referrals: BTreeMap<ClientId, Vec<ClientReferral>>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self {
            next_sequence: 1,
            clients: BTreeMap::new(),
            referrals: BTreeMap::new(),
        }
    }
}

impl ClientRegistry {
    pub fn get(&self, client_id: &ClientId) -> Option<&ClientTask> {
        self.clients.get(client_id)
    }

    pub fn clients(&self) -> impl Iterator<Item = &ClientTask> + '_ {
        self.clients.values()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn engagements(&self, client_id: &ClientId) -> &[ClientReferral] {
        self.referrals
            .get(client_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn allocate_id(&mut self) -> ClientId {
        let id = ClientId::dated(Utc::now().date_naive(), self.next_sequence);
        self.next_sequence += 1;
        debug!(client_id = %id, "Client id allocated");
        id
    }
}

impl LedgerState {
    pub fn allocate_client_id(&mut self) -> ClientId {
        self.clients.allocate_id()
    }

    /// Registers a client and issues one promotional task per accepted url.
    pub fn create_client_task(&mut self, name: &str, urls: &[String]) -> Result<ClientTask> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::Validation("client name cannot be empty".into()));
        }
        let urls: Vec<String> = urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| u.starts_with("http"))
            .map(str::to_string)
            .collect();
        if urls.is_empty() {
            return Err(LedgerError::Validation(
                "at least one http(s) url is required".into(),
            ));
        }

        let client_id = self.clients.allocate_id();
        let mut tracking_urls = Vec::with_capacity(urls.len());
        let mut task_ids = Vec::with_capacity(urls.len());

        for (i, url) in urls.iter().enumerate() {
            let n = i + 1;
            let text = format!("{name} - Link {n} - TRACKING:{client_id}_link{n} - ORIGINAL:{url}");
            let task = self.tasks.insert(Section::Promotional, &text)?;
            tracking_urls.push(format!("client_{client_id}_link{n}"));
            task_ids.push(task.id);
        }

        let client = ClientTask {
            client_id: client_id.clone(),
            name: name.to_string(),
            urls,
            tracking_urls,
            task_ids,
            created_at: Utc::now(),
        };
        self.clients.clients.insert(client_id.clone(), client.clone());
        self.clients.referrals.entry(client_id.clone()).or_default();

        info!(
            client_id = %client_id,
            name = %client.name,
            links = client.urls.len(),
            "🏢 Client task created"
        );
        Ok(client)
    }

    pub fn remove_client_task(&mut self, client_id: &ClientId) -> Result<RemovedClient> {
        let client = self
            .clients
            .clients
            .remove(client_id)
            .ok_or_else(|| LedgerError::NotFound(format!("unknown client {client_id}")))?;
        let engagements = self
            .clients
            .referrals
            .remove(client_id)
            .map(|r| r.len())
            .unwrap_or(0);
        let removed_tasks = self.tasks.remove_client_tasks(client_id);

        info!(
            client_id = %client_id,
            engagements,
            tasks_removed = removed_tasks.len(),
            "🗑️ Client task removed"
        );
        Ok(RemovedClient {
            client,
            engagements,
            removed_tasks,
        })
    }

    pub fn record_client_referral(
        &mut self,
        client_id: &ClientId,
        user: UserId,
        display_name: &str,
        task_type: &str,
    ) -> Result<EngagementOutcome> {
        self.ensure_not_banned(user)?;
        if !self.clients.clients.contains_key(client_id) {
            return Err(LedgerError::NotFound(format!("unknown client {client_id}")));
        }

        let entries = self.clients.referrals.entry(client_id.clone()).or_default();
        if entries.iter().any(|r| r.user_id == user) {
            debug!(client_id = %client_id, user = %user, "Client engagement already recorded");
            return Ok(EngagementOutcome::AlreadyRecorded);
        }
        entries.push(ClientReferral {
            user_id: user,
            display_name: display_name.to_string(),
            task_type: task_type.to_string(),
            timestamp: Utc::now(),
        });
        let total = entries.len();

        info!(
            client_id = %client_id,
            user = %user,
            task_type = %task_type,
            total,
            "🚨 Client engagement recorded"
        );
        Ok(EngagementOutcome::Recorded { total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskKind;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_client_ids_are_sequenced() {
        let mut state = LedgerState::default();
        let first = state.allocate_client_id();
        let second = state.allocate_client_id();

        assert_eq!(first.as_str().len(), 12);
        assert!(first.as_str().starts_with('C'));
        assert!(first.as_str().ends_with("001"));
        assert!(second.as_str().ends_with("002"));
    }

    #[test]
    fn test_create_issues_promotional_tasks() {
        let mut state = LedgerState::default();
        let client = state
            .create_client_task("Acme", &urls(&["https://a.test", "ftp://skip", "http://b.test"]))
            .unwrap();

        assert_eq!(client.urls, urls(&["https://a.test", "http://b.test"]));
        assert_eq!(
            client.tracking_urls,
            vec![
                format!("client_{}_link1", client.client_id),
                format!("client_{}_link2", client.client_id)
            ]
        );

        let promos = state.tasks.section(Section::Promotional);
        assert_eq!(promos.len(), 2);
        match &promos[1].kind {
            TaskKind::Client {
                client_id,
                label,
                original_url,
            } => {
                assert_eq!(client_id, &client.client_id);
                assert_eq!(label, "link2");
                assert_eq!(original_url, "http://b.test");
            }
            other => panic!("expected client kind, got {other:?}"),
        }
    }

    #[test]
    fn test_create_validation() {
        let mut state = LedgerState::default();
        assert!(matches!(
            state.create_client_task(" ", &urls(&["https://a.test"])),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            state.create_client_task("Acme", &urls(&["www.a.test"])),
            Err(LedgerError::Validation(_))
        ));
        assert!(state.tasks.is_empty());
    }

    #[test]
    fn test_client_referral_dedup() {
        let mut state = LedgerState::default();
        let client = state
            .create_client_task("Acme", &urls(&["https://a.test"]))
            .unwrap();
        let id = client.client_id;

        assert_eq!(
            state.record_client_referral(&id, UserId::new(1), "A", "link1").unwrap(),
            EngagementOutcome::Recorded { total: 1 }
        );
        assert_eq!(
            state.record_client_referral(&id, UserId::new(1), "A", "link1").unwrap(),
            EngagementOutcome::AlreadyRecorded
        );
        assert_eq!(
            state.record_client_referral(&id, UserId::new(2), "B", "link1").unwrap(),
            EngagementOutcome::Recorded { total: 2 }
        );

        let unknown: ClientId = "C19990101001".parse().unwrap();
        assert!(matches!(
            state.record_client_referral(&unknown, UserId::new(1), "A", "link1"),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_client_cascades() {
        let mut state = LedgerState::default();
        state.add_task(Section::Promotional, "Regular promo").unwrap();
        let client = state
            .create_client_task("Acme", &urls(&["https://a.test", "https://b.test"]))
            .unwrap();
        state
            .record_client_referral(&client.client_id, UserId::new(4), "D", "link1")
            .unwrap();

        let removed = state.remove_client_task(&client.client_id).unwrap();
        assert_eq!(removed.engagements, 1);
        assert_eq!(removed.removed_tasks, client.task_ids);

        let promos = state.tasks.section(Section::Promotional);
        assert_eq!(promos.len(), 1);
        assert_eq!(promos[0].title, "Regular promo");
        assert!(state.clients.get(&client.client_id).is_none());
        assert!(matches!(
            state.remove_client_task(&client.client_id),
            Err(LedgerError::NotFound(_))
        ));
    }
}
