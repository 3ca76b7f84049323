//! In-memory session registry.
//!
//! A Session pins one analysis: the frozen ad summaries, account baseline,
//! anomalies, verdicts, and recommendations. The session exclusively owns
//! its derived data; warehouse rows are referenced by ad identity only.
//! Sessions expire after a configurable idle TTL and are never persisted.

use crate::error::{Error, Result};
use crate::types::{
    AccountBaseline, AdSummary, Anomaly, Recommendation, RootCauseVerdict, SessionId, WindowSpec,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// One analysis scope, exclusively owning its derived data.
///
/// Mutation goes through the manager's `Arc<RwLock<Session>>` write path;
/// concurrent reads of completed fields take the read half.
#[derive(Debug)]
pub struct Session {
    /// Opaque identifier
    pub id: SessionId,
    /// Analysis scope
    pub window: WindowSpec,
    /// Frozen per-ad aggregates
    pub summaries: Vec<AdSummary>,
    /// Account baseline the anomalies were scored against
    pub baseline: AccountBaseline,
    /// Detected anomalies, sorted by descending |z| then ad id
    pub anomalies: Vec<Anomaly>,
    /// Root-cause verdicts, one per diagnosed anomaly
    pub verdicts: Vec<RootCauseVerdict>,
    /// Generated recommendations
    pub recommendations: Vec<Recommendation>,
    /// Warehouse rows dropped by strict parsing
    pub records_dropped: u64,
    /// True when no metric had a sufficient baseline
    pub insufficient_data: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last access time; drives idle expiry
    pub last_access: DateTime<Utc>,
}

impl Session {
    /// Look up a frozen summary by ad identity
    pub fn summary(&self, ad_id: &str) -> Option<&AdSummary> {
        self.summaries.iter().find(|s| s.ad_id == ad_id)
    }
}

/// Registry of live sessions keyed by opaque identifier.
///
/// Shared across requests; entries expire after the idle TTL and on
/// explicit release. Nothing survives a process restart.
#[derive(Debug)]
pub struct SessionManager {
    sessions: DashMap<SessionId, Arc<RwLock<Session>>>,
    ttl: Duration,
}

impl SessionManager {
    /// Create a manager with the given idle TTL in seconds
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: Duration::seconds(ttl_seconds as i64),
        }
    }

    /// Create and register a new session for a (tenant, window) pair
    pub fn create(&self, window: WindowSpec) -> Arc<RwLock<Session>> {
        self.purge_expired();

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            window,
            summaries: Vec::new(),
            baseline: AccountBaseline {
                metrics: Default::default(),
                min_sample_size: 0,
            },
            anomalies: Vec::new(),
            verdicts: Vec::new(),
            recommendations: Vec::new(),
            records_dropped: 0,
            insufficient_data: false,
            created_at: now,
            last_access: now,
        };
        let id = session.id;
        let handle = Arc::new(RwLock::new(session));
        self.sessions.insert(id, handle.clone());
        debug!(session_id = %id, "Session created");
        handle
    }

    /// Resolve a session, refreshing its idle clock.
    ///
    /// Returns `SessionExpired` when the identifier is unknown or the idle
    /// TTL has elapsed since the last access.
    pub async fn get(&self, id: SessionId) -> Result<Arc<RwLock<Session>>> {
        let handle = self
            .sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(Error::SessionExpired(id))?;

        let now = Utc::now();
        {
            let session = handle.read().await;
            if now - session.last_access > self.ttl {
                drop(session);
                self.sessions.remove(&id);
                debug!(session_id = %id, "Session expired on access");
                return Err(Error::SessionExpired(id));
            }
        }
        handle.write().await.last_access = now;
        Ok(handle)
    }

    /// Explicitly release a session. Returns true when it existed.
    pub fn release(&self, id: SessionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    /// Drop every session idle past the TTL. Returns the count removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let ttl = self.ttl;
        let before = self.sessions.len();
        self.sessions.retain(|_, handle| {
            // try_read never blocks the purge; a locked session is in use
            match handle.try_read() {
                Ok(session) => now - session.last_access <= ttl,
                Err(_) => true,
            }
        });
        before - self.sessions.len()
    }

    /// Count of live sessions
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> WindowSpec {
        WindowSpec {
            tenant: "tl".to_string(),
            window_days: 30,
            analyzed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let manager = SessionManager::new(3600);
        let handle = manager.create(window());
        let id = handle.read().await.id;

        let fetched = manager.get(id).await.unwrap();
        assert_eq!(fetched.read().await.id, id);
        assert_eq!(manager.active_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_session_expired() {
        let manager = SessionManager::new(3600);
        let err = manager.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::SessionExpired(_)));
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let manager = SessionManager::new(0);
        let handle = manager.create(window());
        let id = handle.read().await.id;
        // rewind the idle clock so the TTL check trips
        handle.write().await.last_access = Utc::now() - Duration::seconds(1);

        let err = manager.get(id).await.unwrap_err();
        assert!(matches!(err, Error::SessionExpired(given) if given == id));
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_release() {
        let manager = SessionManager::new(3600);
        let handle = manager.create(window());
        let id = handle.read().await.id;

        assert!(manager.release(id));
        assert!(!manager.release(id));
        assert!(manager.get(id).await.is_err());
    }

    #[tokio::test]
    async fn test_purge_expired_leaves_fresh_sessions() {
        let manager = SessionManager::new(3600);
        let fresh = manager.create(window());
        let stale = manager.create(window());
        stale.write().await.last_access = Utc::now() - Duration::seconds(7200);

        assert_eq!(manager.purge_expired(), 1);
        assert_eq!(manager.active_count(), 1);
        let fresh_id = fresh.read().await.id;
        assert!(manager.get(fresh_id).await.is_ok());
    }
}
