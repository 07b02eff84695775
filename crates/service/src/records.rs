//! Typed records the messaging front-end keeps in the store: privacy
//! consents and per-chat message history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::ai::{ChatMessage, Role};
use crate::errors::StorageError;
use crate::storage::{sanitize_key, DurableKv, MAX_KEY_LEN};

pub const CONSENTS_KEY: &str = "user-consents";
pub const CHAT_MESSAGES_PREFIX: &str = "chat-messages-";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consents {
    #[serde(default)]
    pub data_processing: bool,
    #[serde(default)]
    pub ai_processing: bool,
    #[serde(default)]
    pub analytics: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Consents {
    pub fn all_granted() -> Self {
        Self { data_processing: true, ai_processing: true, analytics: true, updated_at: Some(Utc::now()) }
    }
}

#[derive(Clone)]
pub struct ConsentStore {
    kv: DurableKv,
}

impl ConsentStore {
    pub fn new(kv: DurableKv) -> Self {
        Self { kv }
    }

    /// Stored consents, or nothing granted when absent or unreadable.
    pub async fn load(&self) -> Consents {
        match self.kv.get_as::<Consents>(CONSENTS_KEY).await {
            Ok(Some(consents)) => consents,
            Ok(None) => Consents::default(),
            Err(e) => {
                warn!(error = %e, "could not read consents; assuming none granted");
                Consents::default()
            }
        }
    }

    pub async fn save(&self, consents: &Consents) -> Result<(), StorageError> {
        let mut stamped = consents.clone();
        stamped.updated_at = Some(Utc::now());
        self.kv.set_as(CONSENTS_KEY, &stamped).await
    }

    pub async fn grant_all(&self) -> Result<Consents, StorageError> {
        let consents = Consents::all_granted();
        self.kv.set_as(CONSENTS_KEY, &consents).await?;
        Ok(consents)
    }

    pub async fn revoke(&self) -> Result<(), StorageError> {
        self.kv.delete(CONSENTS_KEY).await
    }

    pub async fn has_data_processing(&self) -> bool {
        self.load().await.data_processing
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatRecord {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4().to_string(), role, content: content.into(), timestamp: Utc::now() }
    }
}

impl From<&ChatRecord> for ChatMessage {
    fn from(record: &ChatRecord) -> Self {
        ChatMessage::new(record.role, record.content.clone())
    }
}

#[derive(Clone)]
pub struct ChatHistory {
    kv: DurableKv,
}

impl ChatHistory {
    pub fn new(kv: DurableKv) -> Self {
        Self { kv }
    }

    /// Store key for a chat, e.g. `chat-messages-chat-1700000000`.
    ///
    /// Ids whose key would exceed [`MAX_KEY_LEN`] are rejected rather than
    /// truncated, so distinct ids never share a key.
    pub fn key_for(chat_id: &str) -> Result<String, StorageError> {
        let id = sanitize_key(chat_id);
        if id.is_empty() {
            return Err(StorageError::validation(format!("chat id `{chat_id}` has no usable characters")));
        }
        let key = format!("{CHAT_MESSAGES_PREFIX}{id}");
        if key.len() > MAX_KEY_LEN {
            return Err(StorageError::validation(format!(
                "chat id is too long: key would be {} characters, limit is {MAX_KEY_LEN}",
                key.len()
            )));
        }
        Ok(key)
    }

    pub async fn load(&self, chat_id: &str) -> Result<Vec<ChatRecord>, StorageError> {
        let key = Self::key_for(chat_id)?;
        Ok(self.kv.get_as::<Vec<ChatRecord>>(&key).await?.unwrap_or_default())
    }

    /// Append one record, rewriting the whole list.
    pub async fn append(&self, chat_id: &str, record: ChatRecord) -> Result<Vec<ChatRecord>, StorageError> {
        let key = Self::key_for(chat_id)?;
        let mut records = self.kv.get_as::<Vec<ChatRecord>>(&key).await?.unwrap_or_default();
        records.push(record);
        self.kv.set_as(&key, &records).await?;
        Ok(records)
    }

    pub async fn clear(&self, chat_id: &str) -> Result<(), StorageError> {
        let key = Self::key_for(chat_id)?;
        self.kv.delete(&key).await
    }

    /// Chat ids that currently have stored messages.
    pub async fn chat_ids(&self) -> Vec<String> {
        self.kv
            .keys()
            .await
            .into_iter()
            .filter_map(|k| k.strip_prefix(CHAT_MESSAGES_PREFIX).map(str::to_string))
            .collect()
    }
}
