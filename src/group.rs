//! Sessions that deliver to one destination.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::notify::{DestinationId, Notifier};
use crate::poll::{SessionId, SessionSettings, SessionStats, TrackingHandle, TrackingSession};
use crate::source::{ItemSource, PriceBand};

struct Entry {
    url: String,
    band: PriceBand,
    handle: TrackingHandle,
}

/// One row of [`DestinationGroup::list_sessions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub url: String,
    pub band: PriceBand,
}

/// All tracking sessions for a single destination.
///
/// The session list lock is only held for the structural change itself,
/// never across a poll or a delivery.
pub struct DestinationGroup {
    destination: DestinationId,
    notifier: Arc<dyn Notifier>,
    source: Arc<dyn ItemSource>,
    settings: SessionSettings,
    sessions: Mutex<Vec<Entry>>,
}

impl DestinationGroup {
    pub fn new(
        destination: DestinationId,
        notifier: Arc<dyn Notifier>,
        source: Arc<dyn ItemSource>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            destination,
            notifier,
            source,
            settings,
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Start tracking `url` and return the new session's id.
    ///
    /// `next_id` is called with the session list locked, so sessions are
    /// listed in id order.  The URL is not probed here; an unreachable page
    /// shows up as failed polls in the session's log.
    pub fn add_session(
        &self,
        url: impl Into<String>,
        band: PriceBand,
        next_id: impl FnOnce() -> SessionId,
    ) -> SessionId {
        let url = url.into();
        let mut sessions = self.sessions.lock();
        let id = next_id();
        let handle = TrackingSession::new(
            id,
            url.clone(),
            band,
            self.destination,
            Arc::clone(&self.source),
            Arc::clone(&self.notifier),
            self.settings,
        )
        .start();

        sessions.push(Entry { url, band, handle });
        id
    }

    /// Stop and forget session `id`.
    ///
    /// Returns `false` if this group has no such session.  Once this returns
    /// `true`, the session will not deliver again.
    pub async fn remove_session(&self, id: SessionId) -> bool {
        let removed = {
            let mut sessions = self.sessions.lock();
            let index = sessions.iter().position(|e| e.handle.id() == id);
            index.map(|i| sessions.remove(i))
        };

        match removed {
            Some(entry) => {
                entry.handle.stop().await;
                info!(session = id, destination = %self.destination, "session removed");
                true
            }
            None => false,
        }
    }

    /// Current sessions in the order they were added.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .lock()
            .iter()
            .map(|e| SessionInfo {
                id: e.handle.id(),
                url: e.url.clone(),
                band: e.band,
            })
            .collect()
    }

    pub fn stats(&self, id: SessionId) -> Option<SessionStats> {
        self.sessions
            .lock()
            .iter()
            .find(|e| e.handle.id() == id)
            .map(|e| e.handle.stats())
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every session and wait for their tasks to exit.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = std::mem::take(&mut *self.sessions.lock());
        for entry in drained {
            entry.handle.shutdown().await;
        }
    }
}
