//! Process-wide table of destination groups.
//!
//! Everything is in memory; restarting the process forgets every session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::group::DestinationGroup;
use crate::notify::{DestinationId, Notifier};
use crate::poll::{SessionId, SessionSettings};
use crate::source::ItemSource;

/// Monotonic session id allocator.
#[derive(Debug)]
pub struct SessionIds(AtomicU64);

impl SessionIds {
    pub fn next(&self) -> SessionId {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SessionIds {
    fn default() -> Self {
        Self(AtomicU64::new(1))
    }
}

pub struct SessionRegistry {
    groups: DashMap<DestinationId, Arc<DestinationGroup>>,
    ids: SessionIds,
    source: Arc<dyn ItemSource>,
    notifier: Arc<dyn Notifier>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(
        source: Arc<dyn ItemSource>,
        notifier: Arc<dyn Notifier>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            groups: DashMap::new(),
            ids: SessionIds::default(),
            source,
            notifier,
            settings,
        }
    }

    /// The group for `destination`, created on first use.
    ///
    /// Concurrent first calls for the same destination get the same group.
    pub fn group_for(&self, destination: DestinationId) -> Arc<DestinationGroup> {
        self.groups
            .entry(destination)
            .or_insert_with(|| {
                debug!(%destination, "new destination group");
                Arc::new(DestinationGroup::new(
                    destination,
                    Arc::clone(&self.notifier),
                    Arc::clone(&self.source),
                    self.settings,
                ))
            })
            .clone()
    }

    /// Existing group for `destination`, without creating one.
    pub fn get(&self, destination: DestinationId) -> Option<Arc<DestinationGroup>> {
        self.groups.get(&destination).map(|g| Arc::clone(g.value()))
    }

    /// Next process-wide session id; safe to call from any thread.
    pub fn allocate_session_id(&self) -> SessionId {
        self.ids.next()
    }

    pub fn destinations(&self) -> Vec<DestinationId> {
        let mut out: Vec<_> = self.groups.iter().map(|g| *g.key()).collect();
        out.sort();
        out
    }

    /// Total running sessions across all groups.
    pub fn session_count(&self) -> usize {
        self.groups.iter().map(|g| g.value().len()).sum()
    }

    /// Stop every session in every group.
    pub async fn shutdown(&self) {
        let groups: Vec<_> = self.groups.iter().map(|g| Arc::clone(g.value())).collect();
        let sessions: usize = groups.iter().map(|g| g.len()).sum();
        info!(groups = groups.len(), sessions, "shutting down tracking");
        for group in groups {
            group.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use crate::poll::testing::ScriptedSource;
    use crate::source::{Price, PriceBand};
    use std::collections::HashSet;

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            Arc::new(ScriptedSource::new(vec![])),
            Arc::new(RecordingNotifier::default()),
            SessionSettings::default(),
        ))
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let ids = SessionIds::default();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
        assert_eq!(ids.next(), 3);
    }

    #[test]
    fn concurrent_id_allocation_never_collides() {
        let reg = registry();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    (0..1000).map(|_| reg.allocate_session_id()).collect::<Vec<_>>()
                })
            })
            .collect();

        let all: Vec<_> = threads.into_iter().flat_map(|t| t.join().unwrap()).collect();
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(all.len(), 8000);
        assert_eq!(unique.len(), 8000);
    }

    #[test]
    fn group_for_returns_same_instance() {
        let reg = registry();
        let a = reg.group_for(DestinationId(1));
        let b = reg.group_for(DestinationId(1));
        let c = reg.group_for(DestinationId(2));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(reg.destinations(), vec![DestinationId(1), DestinationId(2)]);
        assert!(reg.get(DestinationId(3)).is_none());
    }

    #[test]
    fn concurrent_first_use_creates_one_group() {
        let reg = registry();
        let threads: Vec<_> = (0..16)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || reg.group_for(DestinationId(5)))
            })
            .collect();

        let groups: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert!(groups.iter().all(|g| Arc::ptr_eq(g, &groups[0])));
        assert_eq!(reg.destinations().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_add_session_across_groups_gets_distinct_ids() {
        let reg = registry();
        let band = PriceBand::new(None, Price::from_minor(100)).unwrap();

        let tasks: Vec<_> = (0..40)
            .map(|n| {
                let reg = Arc::clone(&reg);
                tokio::spawn(async move {
                    reg.group_for(DestinationId(n % 4)).add_session(
                        format!("https://ay.by/{n}"),
                        band,
                        || reg.allocate_session_id(),
                    )
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for t in tasks {
            assert!(ids.insert(t.await.unwrap()));
        }
        assert_eq!(ids.len(), 40);
        assert_eq!(reg.session_count(), 40);

        reg.shutdown().await;
        assert_eq!(reg.session_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_to_one_group_list_in_id_order() {
        let reg = registry();
        let band = PriceBand::new(None, Price::from_minor(100)).unwrap();

        let tasks: Vec<_> = (0..32)
            .map(|n| {
                let reg = Arc::clone(&reg);
                tokio::spawn(async move {
                    reg.group_for(DestinationId(9)).add_session(
                        format!("https://ay.by/{n}"),
                        band,
                        || reg.allocate_session_id(),
                    )
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }

        let listed: Vec<_> = reg
            .group_for(DestinationId(9))
            .list_sessions()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(listed, (1..=32).collect::<Vec<_>>());

        reg.shutdown().await;
    }
}
