use super::KvStore;
use crate::error::{Result, ResultExt};
use crate::models::UserPreferences;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Everything the service persists, stored as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    #[serde(default)]
    pub user_preferences: HashMap<String, UserPreferences>,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub last_notified_timestamp: i64,
}

/// Lazily loaded view of [`StoredState`].
///
/// The snapshot is read from the store on first use and dropped after every write,
/// so the next read always reflects what was persisted.
pub struct PreferenceStore {
    kv: Arc<dyn KvStore>,
    key: String,
    defaults: UserPreferences,
    snapshot: Mutex<Option<StoredState>>,
}

impl PreferenceStore {
    pub fn new(kv: Arc<dyn KvStore>, key: impl Into<String>, defaults: UserPreferences) -> Self {
        Self {
            kv,
            key: key.into(),
            defaults,
            snapshot: Mutex::new(None),
        }
    }

    /// Loads into `slot` unless already present. Callers hold the snapshot lock.
    async fn load_locked<'a>(&self, slot: &'a mut Option<StoredState>) -> Result<&'a mut StoredState> {
        if slot.is_none() {
            let state = match self.kv.get(&self.key).await.context("loading stored state")? {
                Some(bytes) => serde_json::from_slice(&bytes)?,
                None => {
                    info!(key = %self.key, "No stored state found, initialising");
                    let state = StoredState::default();
                    self.kv
                        .set(&self.key, serde_json::to_vec(&state)?)
                        .await
                        .context("initialising stored state")?;
                    state
                }
            };
            debug!(key = %self.key, "Stored state loaded");
            *slot = Some(state);
        }
        Ok(slot.get_or_insert_with(StoredState::default))
    }

    async fn load(&self) -> Result<StoredState> {
        let mut snapshot = self.snapshot.lock().await;
        Ok(self.load_locked(&mut snapshot).await?.clone())
    }

    /// Read-modify-write under one lock, so concurrent writers never drop each other's changes.
    async fn update<F, T>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut StoredState) -> T,
    {
        let mut snapshot = self.snapshot.lock().await;
        let mut state = self.load_locked(&mut snapshot).await?.clone();
        let out = mutate(&mut state);

        let saved = self
            .kv
            .set(&self.key, serde_json::to_vec(&state)?)
            .await
            .context("saving stored state");
        *snapshot = None;
        saved?;
        Ok(out)
    }

    pub async fn last_notified_timestamp(&self) -> Result<DateTime<Utc>> {
        let state = self.load().await?;
        Ok(DateTime::from_timestamp_millis(state.last_notified_timestamp).unwrap_or_default())
    }

    pub async fn set_last_notified_timestamp(&self, at: DateTime<Utc>) -> Result<()> {
        let millis = at.timestamp_millis();
        self.update(|state| state.last_notified_timestamp = millis).await
    }

    /// Stored preferences, or the configured defaults for users who never changed them.
    pub async fn preferences_for_user(&self, user_id: &str) -> Result<UserPreferences> {
        let state = self.load().await?;
        Ok(state
            .user_preferences
            .get(user_id)
            .copied()
            .unwrap_or(self.defaults))
    }

    /// Applies `change` to the user's current preferences and persists the result.
    pub async fn modify_preferences_for_user<F>(
        &self,
        user_id: &str,
        change: F,
    ) -> Result<UserPreferences>
    where
        F: FnOnce(&mut UserPreferences),
    {
        let defaults = self.defaults;
        self.update(|state| {
            let prefs = state
                .user_preferences
                .entry(user_id.to_string())
                .or_insert(defaults);
            change(prefs);
            *prefs
        })
        .await
    }

    /// Drops the user's stored preferences and returns the defaults now in effect.
    pub async fn reset_preferences_for_user(&self, user_id: &str) -> Result<UserPreferences> {
        self.update(|state| {
            state.user_preferences.remove(user_id);
        })
        .await?;
        Ok(self.defaults)
    }

    pub async fn reset_all_preferences(&self) -> Result<()> {
        self.update(|state| state.user_preferences.clear()).await
    }

    #[cfg(test)]
    async fn is_cached(&self) -> bool {
        self.snapshot.lock().await.is_some()
    }
}
