//! Remote store access.
//!
//! [`RemoteStore`] is the seam between the reconciler and the network.
//! [`RestRemoteStore`] speaks to a PostgREST-style endpoint holding three
//! resources (`timer_state`, `user_settings`, `sessions`), each row keyed by
//! the owner's user id. [`MockRemoteStore`] keeps everything in memory.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::RemoteError;
use crate::types::{
    CompletedSessionEntry, Identity, SessionKind, Settings, SyncRecord, UserSettingsRecord,
};

const TIMER_STATE: &str = "timer_state";
const USER_SETTINGS: &str = "user_settings";
const SESSIONS: &str = "sessions";

const PREFER_UPSERT: &str = "return=representation,resolution=merge-duplicates";
const PREFER_INSERT: &str = "return=representation";

// ============================================================================
// RemoteStore
// ============================================================================

/// Per-owner storage of the timer record, settings and session log.
pub trait RemoteStore: Send + Sync + 'static {
    /// Fetches the owner's timer record, if one exists.
    fn fetch_timer_state(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Option<SyncRecord>, RemoteError>> + Send;

    /// Creates or replaces the owner's timer record and returns the row as
    /// stored.
    fn upsert_timer_state(
        &self,
        identity: &Identity,
        record: &SyncRecord,
    ) -> impl Future<Output = Result<SyncRecord, RemoteError>> + Send;

    /// Fetches the owner's settings, if stored.
    fn fetch_settings(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Option<Settings>, RemoteError>> + Send;

    /// Creates or replaces the owner's settings.
    fn upsert_settings(
        &self,
        identity: &Identity,
        settings: &Settings,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Appends an entry to the owner's session log.
    fn insert_session(
        &self,
        identity: &Identity,
        entry: &CompletedSessionEntry,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}

/// Row of the `sessions` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLogRow {
    pub user_id: String,
    pub kind: SessionKind,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub completed: bool,
}

impl SessionLogRow {
    /// Builds the row for `entry` owned by `user_id`.
    pub fn new(user_id: &str, entry: &CompletedSessionEntry) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind: entry.kind,
            started_at: entry.started_at,
            ended_at: entry.ended_at,
            duration_minutes: entry.duration_minutes,
            completed: entry.completed,
        }
    }
}

// ============================================================================
// RestRemoteStore
// ============================================================================

/// PostgREST client for the remote store.
#[derive(Debug, Clone)]
pub struct RestRemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestRemoteStore {
    /// Creates a client for `base_url` authenticated with the project
    /// `api_key`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Returns the REST URL of `resource`.
    pub fn endpoint(&self, resource: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, resource)
    }

    fn request(&self, method: Method, resource: &str, identity: &Identity) -> RequestBuilder {
        self.client
            .request(method, self.endpoint(resource))
            .header("apikey", &self.api_key)
            .bearer_auth(&identity.access_token)
    }

    fn owner_filter(identity: &Identity) -> [(&'static str, String); 2] {
        [
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", identity.user_id)),
        ]
    }

    async fn check(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn rows<T: serde::de::DeserializeOwned>(response: Response) -> Result<Vec<T>, RemoteError> {
        let response = Self::check(response).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

impl RemoteStore for RestRemoteStore {
    async fn fetch_timer_state(&self, identity: &Identity) -> Result<Option<SyncRecord>, RemoteError> {
        let response = self
            .request(Method::GET, TIMER_STATE, identity)
            .query(&Self::owner_filter(identity))
            .send()
            .await?;
        let rows: Vec<SyncRecord> = Self::rows(response).await?;
        debug!("Fetched {} timer_state row(s)", rows.len());
        Ok(rows.into_iter().next())
    }

    async fn upsert_timer_state(
        &self,
        identity: &Identity,
        record: &SyncRecord,
    ) -> Result<SyncRecord, RemoteError> {
        let response = self
            .request(Method::POST, TIMER_STATE, identity)
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", PREFER_UPSERT)
            .json(record)
            .send()
            .await?;
        let rows: Vec<SyncRecord> = Self::rows(response).await?;
        Ok(rows.into_iter().next().unwrap_or_else(|| record.clone()))
    }

    async fn fetch_settings(&self, identity: &Identity) -> Result<Option<Settings>, RemoteError> {
        let response = self
            .request(Method::GET, USER_SETTINGS, identity)
            .query(&Self::owner_filter(identity))
            .send()
            .await?;
        let rows: Vec<UserSettingsRecord> = Self::rows(response).await?;
        Ok(rows.first().map(UserSettingsRecord::to_settings))
    }

    async fn upsert_settings(&self, identity: &Identity, settings: &Settings) -> Result<(), RemoteError> {
        let row = UserSettingsRecord::from_settings(&identity.user_id, settings);
        let response = self
            .request(Method::POST, USER_SETTINGS, identity)
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", PREFER_UPSERT)
            .json(&row)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn insert_session(
        &self,
        identity: &Identity,
        entry: &CompletedSessionEntry,
    ) -> Result<(), RemoteError> {
        let row = SessionLogRow::new(&identity.user_id, entry);
        let response = self
            .request(Method::POST, SESSIONS, identity)
            .header("Prefer", PREFER_INSERT)
            .json(&row)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

// ============================================================================
// MockRemoteStore
// ============================================================================

/// In-memory remote store for tests.
#[derive(Debug, Default)]
pub struct MockRemoteStore {
    records: Mutex<HashMap<String, SyncRecord>>,
    settings: Mutex<HashMap<String, Settings>>,
    sessions: Mutex<Vec<SessionLogRow>>,
    failing: AtomicBool,
    fetch_count: AtomicUsize,
    push_count: AtomicUsize,
}

impl MockRemoteStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record` as if another device had written it.
    pub fn put_record(&self, record: SyncRecord) {
        lock(&self.records).insert(record.user_id.clone(), record);
    }

    /// Returns the stored record for `user_id`.
    pub fn record(&self, user_id: &str) -> Option<SyncRecord> {
        lock(&self.records).get(user_id).cloned()
    }

    /// Stores settings for `user_id`.
    pub fn put_settings(&self, user_id: &str, settings: Settings) {
        lock(&self.settings).insert(user_id.to_string(), settings);
    }

    /// Returns the stored settings for `user_id`.
    pub fn settings_for(&self, user_id: &str) -> Option<Settings> {
        lock(&self.settings).get(user_id).cloned()
    }

    /// Returns the session log.
    pub fn sessions(&self) -> Vec<SessionLogRow> {
        lock(&self.sessions).clone()
    }

    /// Makes every call fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of timer record fetches.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Number of timer record upserts.
    pub fn push_count(&self) -> usize {
        self.push_count.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), RemoteError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(RemoteError::Unavailable)
        } else {
            Ok(())
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl RemoteStore for MockRemoteStore {
    async fn fetch_timer_state(&self, identity: &Identity) -> Result<Option<SyncRecord>, RemoteError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.record(&identity.user_id))
    }

    async fn upsert_timer_state(
        &self,
        identity: &Identity,
        record: &SyncRecord,
    ) -> Result<SyncRecord, RemoteError> {
        self.check_available()?;
        self.push_count.fetch_add(1, Ordering::SeqCst);
        let mut stored = record.clone();
        stored.user_id = identity.user_id.clone();
        self.put_record(stored.clone());
        Ok(stored)
    }

    async fn fetch_settings(&self, identity: &Identity) -> Result<Option<Settings>, RemoteError> {
        self.check_available()?;
        Ok(self.settings_for(&identity.user_id))
    }

    async fn upsert_settings(&self, identity: &Identity, settings: &Settings) -> Result<(), RemoteError> {
        self.check_available()?;
        self.put_settings(&identity.user_id, settings.clone());
        Ok(())
    }

    async fn insert_session(
        &self,
        identity: &Identity,
        entry: &CompletedSessionEntry,
    ) -> Result<(), RemoteError> {
        self.check_available()?;
        lock(&self.sessions).push(SessionLogRow::new(&identity.user_id, entry));
        Ok(())
    }
}
