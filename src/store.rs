//! Storage collaborators
//!
//! The analyzer reads spam and whitelist records and writes quarantine
//! records through the traits below. [`MemoryStore`] implements all three
//! for the CLI and for tests; a persistent backend only has to provide the
//! same per-call atomicity.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::decision::ThreatLevel;
use crate::phone_reputation::national_number;

/// Country code of the built-in pattern library.
const DEFAULT_LOCAL_PREFIX: &str = "+34";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpamType {
    Phishing,
    Malware,
    Commercial,
    Scam,
    UserBlocked,
}

impl std::fmt::Display for SpamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SpamType::Phishing => "phishing",
            SpamType::Malware => "malware",
            SpamType::Commercial => "commercial",
            SpamType::Scam => "scam",
            SpamType::UserBlocked => "user_blocked",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpamSource {
    Manual,
    Community,
    Api,
}

impl SpamSource {
    /// Community reports are trusted more than local or API-sourced ones.
    pub fn default_confidence(self) -> u32 {
        match self {
            SpamSource::Community => 80,
            SpamSource::Manual | SpamSource::Api => 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamRecord {
    pub phone_number: String,
    pub spam_type: SpamType,
    pub source: SpamSource,
    pub confidence_score: u32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    Manual,
    Sync,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub phone_number: String,
    pub name: String,
    pub source: ContactSource,
}

/// What the analyzer hands to the quarantine sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub phone_number: String,
    pub message_content: String,
    pub reason: String,
    pub threat_level: ThreatLevel,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Pending,
    Deleted,
    Approved,
    BlockedNumber,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub id: u64,
    #[serde(flatten)]
    pub entry: QuarantineEntry,
    pub review: ReviewState,
}

#[async_trait]
pub trait SpamRegistry: Send + Sync {
    /// Active spam record for `phone_number`, if any.
    async fn lookup(&self, phone_number: &str) -> Result<Option<SpamRecord>>;
}

#[async_trait]
pub trait WhitelistRegistry: Send + Sync {
    async fn is_whitelisted(&self, phone_number: &str) -> Result<bool>;
}

#[async_trait]
pub trait QuarantineSink: Send + Sync {
    async fn record(&self, entry: QuarantineEntry) -> Result<()>;
}

#[derive(Default)]
struct StoreState {
    spam: HashMap<String, SpamRecord>,
    contacts: HashMap<String, ContactRecord>,
    quarantine: Vec<QuarantineRecord>,
    next_id: u64,
}

/// In-memory implementation of every storage collaborator.
///
/// Numbers are keyed on their national form, so `+34 612 345 678`,
/// `0034612345678` and `612-345-678` are the same entry.
pub struct MemoryStore {
    state: RwLock<StoreState>,
    local_prefix: String,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_local_prefix(DEFAULT_LOCAL_PREFIX)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_prefix(local_prefix: &str) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            local_prefix: local_prefix.to_string(),
        }
    }

    fn key(&self, phone_number: &str) -> String {
        national_number(phone_number, &self.local_prefix)
    }

    /// Insert or replace; a replaced record becomes active again.
    pub async fn add_spam_number(&self, phone_number: &str, spam_type: SpamType, source: SpamSource) {
        let key = self.key(phone_number);
        let record = SpamRecord {
            phone_number: key.clone(),
            spam_type,
            source,
            confidence_score: source.default_confidence(),
            is_active: true,
        };
        log::debug!("Adding spam number {} ({})", key, spam_type);
        self.state.write().await.spam.insert(key, record);
    }

    /// Deactivates the record; returns whether an active one existed.
    pub async fn remove_spam_number(&self, phone_number: &str) -> bool {
        let key = self.key(phone_number);
        let mut state = self.state.write().await;
        match state.spam.get_mut(&key) {
            Some(record) if record.is_active => {
                record.is_active = false;
                true
            }
            _ => false,
        }
    }

    pub async fn spam_numbers(&self) -> Vec<SpamRecord> {
        let state = self.state.read().await;
        let mut records: Vec<SpamRecord> =
            state.spam.values().filter(|r| r.is_active).cloned().collect();
        records.sort_by(|a, b| a.phone_number.cmp(&b.phone_number));
        records
    }

    /// Insert if absent; returns whether the contact was added.
    pub async fn add_contact(&self, phone_number: &str, name: &str, source: ContactSource) -> bool {
        let key = self.key(phone_number);
        let mut state = self.state.write().await;
        if state.contacts.contains_key(&key) {
            return false;
        }
        state.contacts.insert(
            key.clone(),
            ContactRecord {
                phone_number: key,
                name: name.to_string(),
                source,
            },
        );
        true
    }

    /// Bulk import from the device address book. Existing contacts are
    /// left untouched. Returns the number of contacts added.
    pub async fn import_contacts<'a, I>(&self, contacts: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut added = 0;
        for (phone_number, name) in contacts {
            if self.add_contact(phone_number, name, ContactSource::Sync).await {
                added += 1;
            }
        }
        log::info!("Imported {} contacts", added);
        added
    }

    pub async fn remove_contact(&self, phone_number: &str) -> bool {
        let key = self.key(phone_number);
        self.state.write().await.contacts.remove(&key).is_some()
    }

    /// Drop every contact that did not come from a manual entry.
    pub async fn clear_synced_contacts(&self) -> usize {
        let mut state = self.state.write().await;
        let before = state.contacts.len();
        state
            .contacts
            .retain(|_, contact| contact.source == ContactSource::Manual);
        before - state.contacts.len()
    }

    pub async fn contact_count(&self) -> usize {
        self.state.read().await.contacts.len()
    }

    /// Store a quarantine entry; returns its id.
    pub async fn quarantine(&self, entry: QuarantineEntry) -> u64 {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = state.next_id;
        state.quarantine.push(QuarantineRecord {
            id,
            entry,
            review: ReviewState::Pending,
        });
        id
    }

    /// Newest first.
    pub async fn quarantined(&self) -> Vec<QuarantineRecord> {
        let state = self.state.read().await;
        let mut records = state.quarantine.clone();
        records.sort_by(|a, b| {
            b.entry
                .timestamp
                .cmp(&a.entry.timestamp)
                .then(b.id.cmp(&a.id))
        });
        records
    }

    pub async fn pending_quarantine_count(&self) -> usize {
        self.state
            .read()
            .await
            .quarantine
            .iter()
            .filter(|r| r.review == ReviewState::Pending)
            .count()
    }

    /// Record the user's decision. Blocking the number also lists the
    /// sender as a manually reported scam.
    pub async fn mark_reviewed(&self, id: u64, review: ReviewState) -> Result<()> {
        if review == ReviewState::Pending {
            bail!("Quarantine entry {} cannot be marked pending again", id);
        }

        let phone_number = {
            let mut state = self.state.write().await;
            let record = match state.quarantine.iter_mut().find(|r| r.id == id) {
                Some(record) => record,
                None => bail!("Unknown quarantine entry: {}", id),
            };
            record.review = review;
            record.entry.phone_number.clone()
        };

        if review == ReviewState::BlockedNumber {
            self.add_spam_number(&phone_number, SpamType::Scam, SpamSource::Manual)
                .await;
        }
        Ok(())
    }
}

#[async_trait]
impl SpamRegistry for MemoryStore {
    async fn lookup(&self, phone_number: &str) -> Result<Option<SpamRecord>> {
        let key = self.key(phone_number);
        let state = self.state.read().await;
        Ok(state.spam.get(&key).filter(|r| r.is_active).cloned())
    }
}

#[async_trait]
impl WhitelistRegistry for MemoryStore {
    async fn is_whitelisted(&self, phone_number: &str) -> Result<bool> {
        let key = self.key(phone_number);
        Ok(self.state.read().await.contacts.contains_key(&key))
    }
}

#[async_trait]
impl QuarantineSink for MemoryStore {
    async fn record(&self, entry: QuarantineEntry) -> Result<()> {
        let id = self.quarantine(entry).await;
        log::debug!("Quarantined message as entry {}", id);
        Ok(())
    }
}
