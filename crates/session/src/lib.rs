//! Conversation session store.
//!
//! Sessions are persisted as append-friendly JSONL files, one file per
//! session key (usually `channel:chat_id`). The first record of every file
//! is a metadata header; every following line is one message record. An
//! LRU cache bounds memory; evicted sessions are saved before removal.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use proto::{ChannelId, SessionError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One message in a conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Semantic role ("user", "assistant", "system").
    pub role: String,
    /// Message content payload.
    pub content: String,
    /// Creation timestamp in UTC.
    pub timestamp: DateTime<Utc>,
}

/// Metadata header record, always the first line of a session file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HeaderRecord {
    #[serde(rename = "_type")]
    record_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    metadata: serde_json::Value,
}

/// A conversation session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session key, usually `channel:chat_id`.
    pub key: String,
    /// Ordered message history. Append-only between clears.
    pub messages: Vec<SessionMessage>,
    /// Session creation time.
    pub created_at: DateTime<Utc>,
    /// Last append/clear time.
    pub updated_at: DateTime<Utc>,
    /// Free-form metadata persisted in the header record.
    pub metadata: serde_json::Value,
}

impl Session {
    /// Creates an empty session for a key.
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    /// Appends a message and bumps the updated timestamp.
    pub fn add_message(&mut self, role: impl Into<String>, content: impl Into<String>) {
        self.messages.push(SessionMessage {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
        });
        self.updated_at = Utc::now();
    }

    /// Clears all messages and resets the session to its initial state.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.updated_at = Utc::now();
    }
}

/// Summary of a stored session, read from header lines only.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Session key recovered from the file name.
    pub key: String,
    /// Creation time from the header record.
    pub created_at: DateTime<Utc>,
    /// Last update time from the header record.
    pub updated_at: DateTime<Utc>,
    /// Path of the backing file.
    pub path: PathBuf,
}

struct CacheInner {
    sessions: HashMap<String, Session>,
    /// LRU order, least recently used at the front.
    order: VecDeque<String>,
}

impl CacheInner {
    fn touch(&mut self, key: &str) {
        self.order.retain(|k| k != key);
        self.order.push_back(key.to_string());
    }
}

/// Manages conversation sessions on disk with a bounded in-memory cache.
pub struct SessionStore {
    dir: PathBuf,
    max_cache_size: usize,
    cache: Mutex<CacheInner>,
}

impl SessionStore {
    /// Creates a store rooted at `dir`, caching at most `max_cache_size`
    /// sessions in memory.
    pub fn new(dir: impl Into<PathBuf>, max_cache_size: usize) -> Self {
        Self {
            dir: dir.into(),
            max_cache_size,
            cache: Mutex::new(CacheInner {
                sessions: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Returns the backing file path for a session key.
    fn session_path(&self, key: &str) -> PathBuf {
        let safe: String = key
            .replace(':', "_")
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
                _ => '_',
            })
            .collect();
        self.dir.join(format!("{safe}.jsonl"))
    }

    /// Returns the session for a key, loading from disk or creating it.
    pub fn get_or_create(&self, key: &ChannelId) -> Result<Session, SessionError> {
        let key = key.as_str();
        let mut cache = self.cache.lock().expect("session cache poisoned");
        if let Some(session) = cache.sessions.get(key).cloned() {
            cache.touch(key);
            return Ok(session);
        }
        drop(cache);

        let session = match self.load(key)? {
            Some(session) => session,
            None => Session::new(key),
        };
        self.insert_cached(session.clone())?;
        Ok(session)
    }

    /// Appends one message to a session and persists it.
    pub fn append(
        &self,
        key: &ChannelId,
        role: &str,
        content: &str,
    ) -> Result<(), SessionError> {
        let mut session = self.get_or_create(key)?;
        session.add_message(role, content);
        self.save(&session)
    }

    /// Clears a session's history and persists the empty state.
    pub fn clear(&self, key: &ChannelId) -> Result<(), SessionError> {
        let mut session = self.get_or_create(key)?;
        session.clear();
        self.save(&session)
    }

    /// Saves a session to disk and refreshes its cache entry.
    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        self.write_file(session)?;
        self.insert_cached(session.clone())
    }

    /// Saves all cached sessions and empties the cache.
    pub fn flush(&self) -> Result<(), SessionError> {
        let drained: Vec<Session> = {
            let mut cache = self.cache.lock().expect("session cache poisoned");
            cache.order.clear();
            cache.sessions.drain().map(|(_, s)| s).collect()
        };
        info!("Flushing {} sessions from cache", drained.len());
        for session in drained {
            if let Err(e) = self.write_file(&session) {
                warn!("Failed to save session {}: {e}", session.key);
            }
        }
        Ok(())
    }

    /// Lists stored sessions, newest first, reading only header lines.
    pub fn list(&self) -> Vec<SessionInfo> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut infos: Vec<SessionInfo> = entries
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "jsonl"))
            .filter_map(|e| read_header(&e.path()))
            .collect();
        infos.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        infos
    }

    fn insert_cached(&self, session: Session) -> Result<(), SessionError> {
        let evicted = {
            let mut cache = self.cache.lock().expect("session cache poisoned");
            let key = session.key.clone();
            cache.sessions.insert(key.clone(), session);
            cache.touch(&key);

            if cache.sessions.len() > self.max_cache_size {
                cache
                    .order
                    .pop_front()
                    .and_then(|oldest| cache.sessions.remove(&oldest))
            } else {
                None
            }
        };
        if let Some(oldest) = evicted {
            debug!("Evicting session {} from cache (LRU)", oldest.key);
            self.write_file(&oldest)?;
        }
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Session>, SessionError> {
        let path = self.session_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let mut session = Session::new(key);
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: serde_json::Value = serde_json::from_str(line)?;
            if value.get("_type").and_then(|t| t.as_str()) == Some("metadata") {
                let header: HeaderRecord = serde_json::from_value(value)?;
                session.created_at = header.created_at;
                session.updated_at = header.updated_at;
                session.metadata = header.metadata;
            } else {
                session.messages.push(serde_json::from_value(value)?);
            }
        }
        Ok(Some(session))
    }

    fn write_file(&self, session: &Session) -> Result<(), SessionError> {
        std::fs::create_dir_all(&self.dir)?;
        let header = HeaderRecord {
            record_type: "metadata".to_string(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            metadata: session.metadata.clone(),
        };
        let mut out = serde_json::to_string(&header)?;
        out.push('\n');
        for msg in &session.messages {
            out.push_str(&serde_json::to_string(msg)?);
            out.push('\n');
        }
        std::fs::write(self.session_path(&session.key), out)?;
        Ok(())
    }
}

/// Reads only the header line of a session file.
fn read_header(path: &Path) -> Option<SessionInfo> {
    let content = std::fs::read_to_string(path).ok()?;
    let first = content.lines().next()?;
    let header: HeaderRecord = serde_json::from_str(first).ok()?;
    if header.record_type != "metadata" {
        return None;
    }
    let key = path.file_stem()?.to_string_lossy().replace('_', ":");
    Some(SessionInfo {
        key,
        created_at: header.created_at,
        updated_at: header.updated_at,
        path: path.to_path_buf(),
    })
}
