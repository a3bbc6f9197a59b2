//! History persistence.
//!
//! The client keeps one document per deployment: a map of user identity to
//! account record (profile, per-track history, call logs). [`HistoryStore`]
//! is the contract; [`MemoryStore`] backs tests and embedding scenarios,
//! [`JsonFileStore`] persists the document to disk the way the original
//! client kept a single serialized blob.

use crate::error::Result;
use crate::types::{CallLog, ChatMessage, ChatMode, UserProfile};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserRecord {
    profile: Option<UserProfile>,
    #[serde(default)]
    history: HashMap<String, Vec<ChatMessage>>,
    #[serde(default)]
    call_logs: Vec<CallLog>,
}

type Db = HashMap<String, UserRecord>;

/// Persistence contract for user accounts, chat transcripts and call logs.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the transcript for one track. Unknown users get an empty list.
    async fn load_history(&self, identity: &str, mode: ChatMode) -> Result<Vec<ChatMessage>>;

    /// Replace the transcript for one track.
    async fn save_history(
        &self,
        identity: &str,
        mode: ChatMode,
        messages: &[ChatMessage],
    ) -> Result<()>;

    /// Prepend a call log entry (newest first).
    async fn append_call_log(&self, identity: &str, log: CallLog) -> Result<()>;

    /// Call logs, newest first.
    async fn call_logs(&self, identity: &str) -> Result<Vec<CallLog>>;

    /// Register a profile. Returns false if the identity is already taken.
    async fn register(&self, profile: UserProfile) -> Result<bool>;

    /// Look up a profile by identity.
    async fn lookup(&self, identity: &str) -> Result<Option<UserProfile>>;
}

/// Login stub: fetch the profile and compare the stored password verbatim.
pub async fn verify_login(
    store: &dyn HistoryStore,
    identity: &str,
    password: &str,
) -> Result<Option<UserProfile>> {
    let profile = store.lookup(identity).await?;
    Ok(profile.filter(|p| p.password.as_deref() == Some(password)))
}

// ── In-memory store ─────────────────────────────────────────────────────

/// HashMap-backed store for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    db: Arc<RwLock<Db>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn load_history(&self, identity: &str, mode: ChatMode) -> Result<Vec<ChatMessage>> {
        let db = self.db.read();
        Ok(db
            .get(identity)
            .and_then(|rec| rec.history.get(mode.key()))
            .cloned()
            .unwrap_or_default())
    }

    async fn save_history(
        &self,
        identity: &str,
        mode: ChatMode,
        messages: &[ChatMessage],
    ) -> Result<()> {
        let mut db = self.db.write();
        let rec = db.entry(identity.to_string()).or_default();
        rec.history.insert(mode.key().to_string(), messages.to_vec());
        Ok(())
    }

    async fn append_call_log(&self, identity: &str, log: CallLog) -> Result<()> {
        let mut db = self.db.write();
        db.entry(identity.to_string()).or_default().call_logs.insert(0, log);
        Ok(())
    }

    async fn call_logs(&self, identity: &str) -> Result<Vec<CallLog>> {
        let db = self.db.read();
        Ok(db.get(identity).map(|rec| rec.call_logs.clone()).unwrap_or_default())
    }

    async fn register(&self, profile: UserProfile) -> Result<bool> {
        let mut db = self.db.write();
        let rec = db.entry(profile.identity.clone()).or_default();
        if rec.profile.is_some() {
            return Ok(false);
        }
        rec.profile = Some(profile);
        Ok(true)
    }

    async fn lookup(&self, identity: &str) -> Result<Option<UserProfile>> {
        let db = self.db.read();
        Ok(db.get(identity).and_then(|rec| rec.profile.clone()))
    }
}

// ── JSON file store ─────────────────────────────────────────────────────

/// Single-document JSON store. Every mutation rewrites the whole document
/// through a temp file + rename so a crash never leaves a half-written db.
pub struct JsonFileStore {
    path: PathBuf,
    db: Arc<RwLock<Db>>,
}

impl JsonFileStore {
    /// Open or create the store at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let db: Db = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Db::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), users = db.len(), "History store opened");
        Ok(Self { path, db: Arc::new(RwLock::new(db)) })
    }

    async fn flush(&self) -> Result<()> {
        let bytes = {
            let db = self.db.read();
            serde_json::to_vec_pretty(&*db)?
        };
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::trace!(bytes = bytes.len(), "History document flushed");
        Ok(())
    }

    fn mutate<F: FnOnce(&mut Db)>(&self, f: F) {
        let mut db = self.db.write();
        f(&mut db);
    }
}

#[async_trait]
impl HistoryStore for JsonFileStore {
    async fn load_history(&self, identity: &str, mode: ChatMode) -> Result<Vec<ChatMessage>> {
        let db = self.db.read();
        Ok(db
            .get(identity)
            .and_then(|rec| rec.history.get(mode.key()))
            .cloned()
            .unwrap_or_default())
    }

    async fn save_history(
        &self,
        identity: &str,
        mode: ChatMode,
        messages: &[ChatMessage],
    ) -> Result<()> {
        self.mutate(|db| {
            let rec = db.entry(identity.to_string()).or_default();
            rec.history.insert(mode.key().to_string(), messages.to_vec());
        });
        self.flush().await
    }

    async fn append_call_log(&self, identity: &str, log: CallLog) -> Result<()> {
        self.mutate(|db| db.entry(identity.to_string()).or_default().call_logs.insert(0, log));
        self.flush().await
    }

    async fn call_logs(&self, identity: &str) -> Result<Vec<CallLog>> {
        let db = self.db.read();
        Ok(db.get(identity).map(|rec| rec.call_logs.clone()).unwrap_or_default())
    }

    async fn register(&self, profile: UserProfile) -> Result<bool> {
        let taken = {
            let db = self.db.read();
            db.get(&profile.identity).is_some_and(|rec| rec.profile.is_some())
        };
        if taken {
            return Ok(false);
        }
        self.mutate(|db| {
            let identity = profile.identity.clone();
            db.entry(identity).or_default().profile = Some(profile);
        });
        self.flush().await?;
        Ok(true)
    }

    async fn lookup(&self, identity: &str) -> Result<Option<UserProfile>> {
        let db = self.db.read();
        Ok(db.get(identity).and_then(|rec| rec.profile.clone()))
    }
}

impl std::fmt::Debug for JsonFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileStore").field("path", &self.path).finish()
    }
}
