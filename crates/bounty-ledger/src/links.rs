//! Deep-link payloads carried in the `start` parameter of bot links.
//!
//! Three shapes are understood:
//! - `ref_<user>` onboards a referred user
//! - `client_<clientId>_<taskType>` records a client engagement
//! - `track_<sectionCode>_<taskId>_<taskType>` records a task engagement

use crate::error::{LedgerError, Result};
use crate::types::{ClientId, Section, TaskId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_TASK_TYPE: &str = "general";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub base_url: String,
    pub bot_username: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            base_url: "https://t.me".to_string(),
            bot_username: "bounty_bot".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepLink {
    Referral {
        referrer: UserId,
    },
    Client {
        client_id: ClientId,
        task_type: String,
    },
    Track {
        section: Section,
        task: TaskId,
        task_type: String,
    },
}

/// Strips spaces and dashes; an empty result falls back to `general`.
pub fn clean_task_type(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| *c != ' ' && *c != '-').collect();
    if cleaned.is_empty() {
        DEFAULT_TASK_TYPE.to_string()
    } else {
        cleaned
    }
}

impl DeepLink {
    pub fn referral(referrer: UserId) -> Self {
        DeepLink::Referral { referrer }
    }

    pub fn client(client_id: ClientId, task_type: &str) -> Self {
        DeepLink::Client {
            client_id,
            task_type: clean_task_type(task_type),
        }
    }

    pub fn track(section: Section, task: TaskId, task_type: &str) -> Self {
        DeepLink::Track {
            section,
            task,
            task_type: clean_task_type(task_type),
        }
    }
}

impl fmt::Display for DeepLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeepLink::Referral { referrer } => write!(f, "ref_{referrer}"),
            DeepLink::Client {
                client_id,
                task_type,
            } => write!(f, "client_{client_id}_{task_type}"),
            DeepLink::Track {
                section,
                task,
                task_type,
            } => write!(f, "track_{}_{}_{}", section.code(), task, task_type),
        }
    }
}

fn malformed(payload: &str) -> LedgerError {
    LedgerError::Validation(format!("malformed deep link: {payload}"))
}

impl FromStr for DeepLink {
    type Err = LedgerError;

    fn from_str(payload: &str) -> Result<Self> {
        let payload = payload.trim();

        if let Some(rest) = payload.strip_prefix("ref_") {
            let referrer = rest.parse::<UserId>().map_err(|_| malformed(payload))?;
            return Ok(DeepLink::Referral { referrer });
        }

        if let Some(rest) = payload.strip_prefix("client_") {
            let (id, task_type) = match rest.split_once('_') {
                Some((id, task_type)) => (id, task_type),
                None => (rest, DEFAULT_TASK_TYPE),
            };
            let client_id = id.parse::<ClientId>().map_err(|_| malformed(payload))?;
            return Ok(DeepLink::client(client_id, task_type));
        }

        if let Some(rest) = payload.strip_prefix("track_") {
            let mut parts = rest.splitn(3, '_');
            let section = parts
                .next()
                .and_then(Section::from_code)
                .ok_or_else(|| malformed(payload))?;
            let task = parts
                .next()
                .and_then(|id| id.parse::<u64>().ok())
                .map(TaskId::new)
                .ok_or_else(|| malformed(payload))?;
            let task_type = parts.next().unwrap_or(DEFAULT_TASK_TYPE);
            return Ok(DeepLink::track(section, task, task_type));
        }

        Err(malformed(payload))
    }
}

/// Renders deep links as shareable URLs.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    config: LinkConfig,
}

impl LinkBuilder {
    pub fn new(config: LinkConfig) -> Self {
        Self { config }
    }

    pub fn url(&self, link: &DeepLink) -> String {
        format!(
            "{}/{}?start={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.bot_username,
            link
        )
    }

    pub fn referral(&self, referrer: UserId) -> String {
        self.url(&DeepLink::referral(referrer))
    }

    pub fn client(&self, client_id: &ClientId, task_type: &str) -> String {
        self.url(&DeepLink::client(client_id.clone(), task_type))
    }

    pub fn task(&self, section: Section, task: TaskId, task_type: &str) -> String {
        self.url(&DeepLink::track(section, task, task_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_id(raw: &str) -> ClientId {
        raw.parse().unwrap()
    }

    #[test]
    fn test_parse_referral() {
        assert_eq!(
            "ref_200".parse::<DeepLink>().unwrap(),
            DeepLink::Referral {
                referrer: UserId::new(200)
            }
        );
        assert!("ref_abc".parse::<DeepLink>().is_err());
        assert!("ref_0".parse::<DeepLink>().is_err());
    }

    #[test]
    fn test_parse_client_link() {
        let link: DeepLink = "client_C20261019001_link1".parse().unwrap();
        assert_eq!(
            link,
            DeepLink::Client {
                client_id: client_id("C20261019001"),
                task_type: "link1".into()
            }
        );

        let bare: DeepLink = "client_C20261019001".parse().unwrap();
        assert_eq!(bare.to_string(), "client_C20261019001_general");
    }

    #[test]
    fn test_parse_track_link() {
        let link: DeepLink = "track_appdownload_12_install".parse().unwrap();
        assert_eq!(
            link,
            DeepLink::Track {
                section: Section::AppDownloads,
                task: TaskId::new(12),
                task_type: "install".into()
            }
        );
        assert!("track_games_1_x".parse::<DeepLink>().is_err());
        assert!("track_promo_x_y".parse::<DeepLink>().is_err());
        assert!("hello".parse::<DeepLink>().is_err());
    }

    #[test]
    fn test_task_type_cleaning() {
        assert_eq!(clean_task_type("sign up - now"), "signupnow");
        assert_eq!(clean_task_type(" - "), DEFAULT_TASK_TYPE);
    }

    #[test]
    fn test_builder_urls() {
        let builder = LinkBuilder::new(LinkConfig {
            base_url: "https://t.me/".into(),
            bot_username: "earn_bot".into(),
        });
        assert_eq!(
            builder.referral(UserId::new(42)),
            "https://t.me/earn_bot?start=ref_42"
        );
        assert_eq!(
            builder.task(Section::WatchAds, TaskId::new(3), "video ad"),
            "https://t.me/earn_bot?start=track_watchads_3_videoad"
        );
        assert_eq!(
            builder.client(&client_id("C20260101002"), "link2"),
            "https://t.me/earn_bot?start=client_C20260101002_link2"
        );
    }
}
