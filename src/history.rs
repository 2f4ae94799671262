use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Serialize, Deserialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::models::{GenerationRequest, GenerationResult, HistoryItem, Style};
use crate::retry::RetryConfig;
use crate::storage::{KeyValueStore, HISTORY_KEY, PREFERENCES_KEY, SESSION_KEY, SETTINGS_KEY};
use crate::thumbnail::make_thumbnail;

pub const MAX_HISTORY: usize = 5;
pub const MAX_RECENT_PROMPTS: usize = 10;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(default)]
    pub generation_count: u64,
    #[serde(default)]
    pub last_generated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(default)]
    pub recent_prompts: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default)]
    pub default_style: Style,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

struct Inner {
    items: Vec<HistoryItem>,
    preferences: UserPreferences,
    session: SessionData,
}

pub struct HistoryStore {
    storage: Arc<dyn KeyValueStore>,
    inner: RwLock<Inner>,
    updates: watch::Sender<Vec<HistoryItem>>,
}

impl HistoryStore {
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let mut items: Vec<HistoryItem> = storage.get_or(HISTORY_KEY, Vec::new());
        if items.len() > MAX_HISTORY {
            warn!(stored = items.len(), "Persisted history exceeds bound, truncating");
            items.truncate(MAX_HISTORY);
        }
        let mut preferences: UserPreferences = storage.get_or(PREFERENCES_KEY, UserPreferences::default());
        preferences.recent_prompts.truncate(MAX_RECENT_PROMPTS);
        let session: SessionData = storage.get_or(SESSION_KEY, SessionData::default());

        debug!(items = items.len(), generations = session.generation_count, "Loaded history store");
        let (updates, _) = watch::channel(items.clone());
        Self {
            storage,
            inner: RwLock::new(Inner { items, preferences, session }),
            updates,
        }
    }

    fn persist<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = self.storage.set_json(key, value) {
            warn!(key, error = %e, "Persisting failed, continuing in memory only");
        }
    }

    fn publish(&self, items: &[HistoryItem]) {
        self.updates.send_replace(items.to_vec());
    }

    pub fn record(&self, item: HistoryItem) {
        let mut inner = self.inner.write();
        inner.items.retain(|existing| existing.id() != item.id());
        inner.items.insert(0, item);
        inner.items.truncate(MAX_HISTORY);
        self.persist(HISTORY_KEY, &inner.items);
        self.publish(&inner.items);
    }

    pub fn record_generation(&self, request: &GenerationRequest, result: &GenerationResult) -> HistoryItem {
        let thumbnail = make_thumbnail(&request.image_data).unwrap_or_else(|e| {
            debug!(error = %e, "Thumbnail unavailable, falling back to result image");
            result.image_url.clone()
        });
        let item = HistoryItem { result: result.clone(), thumbnail, is_favorite: false };
        self.record(item.clone());
        self.remember_prompt(&request.prompt);
        self.bump_session(result.created_at);
        info!(id = %item.id(), "📚 Saved generation to history");
        item
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.write();
        let before = inner.items.len();
        inner.items.retain(|item| item.id() != id);
        let removed = inner.items.len() != before;
        if removed {
            self.persist(HISTORY_KEY, &inner.items);
            self.publish(&inner.items);
        }
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.items.clear();
        if let Err(e) = self.storage.remove(HISTORY_KEY) {
            warn!(error = %e, "Clearing persisted history failed, continuing in memory only");
        }
        self.publish(&inner.items);
    }

    /// Flips the favorite flag and returns its new value, or `None` for an unknown id.
    pub fn toggle_favorite(&self, id: &str) -> Option<bool> {
        let mut inner = self.inner.write();
        let item = inner.items.iter_mut().find(|item| item.id() == id)?;
        item.is_favorite = !item.is_favorite;
        let flag = item.is_favorite;
        self.persist(HISTORY_KEY, &inner.items);
        self.publish(&inner.items);
        Some(flag)
    }

    pub fn list(&self) -> Vec<HistoryItem> {
        self.inner.read().items.clone()
    }

    pub fn get(&self, id: &str) -> Option<HistoryItem> {
        self.inner.read().items.iter().find(|item| item.id() == id).cloned()
    }

    pub fn favorites(&self) -> Vec<HistoryItem> {
        self.inner.read().items.iter().filter(|item| item.is_favorite).cloned().collect()
    }

    pub fn len(&self) -> usize { self.inner.read().items.len() }

    pub fn is_empty(&self) -> bool { self.inner.read().items.is_empty() }

    pub fn subscribe(&self) -> watch::Receiver<Vec<HistoryItem>> {
        self.updates.subscribe()
    }

    fn remember_prompt(&self, prompt: &str) {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return;
        }
        let mut inner = self.inner.write();
        let recent = &mut inner.preferences.recent_prompts;
        recent.retain(|p| p != prompt);
        recent.insert(0, prompt.to_string());
        recent.truncate(MAX_RECENT_PROMPTS);
        self.persist(PREFERENCES_KEY, &inner.preferences);
    }

    pub fn recent_prompts(&self) -> Vec<String> {
        self.inner.read().preferences.recent_prompts.clone()
    }

    fn bump_session(&self, at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        inner.session.generation_count += 1;
        inner.session.last_generated_at = Some(at);
        self.persist(SESSION_KEY, &inner.session);
    }

    pub fn session(&self) -> SessionData {
        self.inner.read().session.clone()
    }

    pub fn settings(&self) -> UserSettings {
        self.storage.get_or(SETTINGS_KEY, UserSettings::default())
    }

    pub fn save_settings(&self, settings: &UserSettings) {
        self.persist(SETTINGS_KEY, settings);
    }
}
