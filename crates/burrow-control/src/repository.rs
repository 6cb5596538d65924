//! Session repository

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::RepositoryError;
use crate::session::ClientSession;
use crate::store::SessionStore;

/// Keyed collection of sessions, connected and lost
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert or overwrite the session with the same id
    async fn save(&self, session: Arc<ClientSession>) -> Result<(), RepositoryError>;

    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;

    /// Connected sessions only; lost sessions are `NotFound`
    async fn get_active_by_id(&self, id: &str) -> Result<Arc<ClientSession>, RepositoryError>;

    async fn get_by_id(&self, id: &str) -> Result<Arc<ClientSession>, RepositoryError>;

    async fn get_all(&self) -> Result<Vec<Arc<ClientSession>>, RepositoryError>;

    async fn count(&self) -> Result<usize, RepositoryError>;

    /// Delete lost sessions disconnected for longer than `keep`
    async fn delete_obsolete(&self, keep: Duration) -> Result<usize, RepositoryError>;
}

/// In-memory repository, optionally writing through to a [`SessionStore`]
pub struct ClientSessionRepository {
    sessions: DashMap<String, Arc<ClientSession>>,
    store: Option<Arc<dyn SessionStore>>,
}

impl ClientSessionRepository {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Load stored sessions as lost sessions. Records still marked connected
    /// are stamped disconnected and written back. Returns how many were loaded.
    pub async fn restore(&self) -> Result<usize, RepositoryError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let records = store.load_all().await?;
        let count = records.len();
        for record in records {
            let was_connected = !record.is_lost();
            let session = Arc::new(ClientSession::from_record(record));
            if was_connected {
                store.save(&session.to_record().await).await?;
            }
            debug!(session_id = session.id(), "Restored lost session");
            self.sessions.insert(session.id().to_string(), session);
        }

        if count > 0 {
            info!("Restored {} lost sessions from store", count);
        }
        Ok(count)
    }
}

impl Default for ClientSessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRepository for ClientSessionRepository {
    async fn save(&self, session: Arc<ClientSession>) -> Result<(), RepositoryError> {
        if let Some(store) = &self.store {
            store.save(&session.to_record().await).await?;
        }
        self.sessions.insert(session.id().to_string(), session);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        if !self.sessions.contains_key(id) {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        if let Some(store) = &self.store {
            store.delete(id).await?;
        }
        self.sessions.remove(id);
        Ok(())
    }

    async fn get_active_by_id(&self, id: &str) -> Result<Arc<ClientSession>, RepositoryError> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .filter(|session| session.is_active())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn get_by_id(&self, id: &str) -> Result<Arc<ClientSession>, RepositoryError> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn get_all(&self) -> Result<Vec<Arc<ClientSession>>, RepositoryError> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(sessions)
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.sessions.len())
    }

    async fn delete_obsolete(&self, keep: Duration) -> Result<usize, RepositoryError> {
        let cutoff = chrono::Duration::from_std(keep)
            .ok()
            .and_then(|keep| Utc::now().checked_sub_signed(keep));
        let Some(cutoff) = cutoff else {
            return Ok(0);
        };

        let obsolete: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .disconnected_at()
                    .is_some_and(|at| at < cutoff)
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut deleted = 0;
        for id in obsolete {
            match self.delete(&id).await {
                Ok(()) => deleted += 1,
                Err(RepositoryError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }
}
