//! Per-session background polling.
//!
//! Every tracked link gets its own tokio task that loops forever:
//!
//! ```text
//! fetch (bounded by timeout) → diff against last snapshot → filter by band
//!     → deliver up to one batch → sleep (cancellable) → …
//! ```
//!
//! Cycles of one session are strictly sequential, so the dedup state in
//! [`DiffState`] is owned by the task and needs no lock.  Sessions run fully
//! in parallel with each other.
//!
//! ## Stopping
//!
//! [`TrackingHandle::stop`] is cooperative.  A fetch already on the wire is
//! allowed to finish and its result is thrown away; the sleep between cycles
//! is interrupted immediately, and so is a send that is still waiting on the
//! transport.  Delivery goes through a gate that `stop` closes under the same
//! lock, so once `stop` returns no batch from that session can be sent.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{DeliveryError, SourceError};
use crate::notify::{DestinationId, Notifier};
use crate::source::{ItemIdentity, ItemSource, ListingItem, PriceBand};

/// Process-wide unique id of a tracking session.
pub type SessionId = u64;

/// Timing and batching knobs shared by every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Fixed delay between the end of one cycle and the start of the next.
    pub poll_interval: Duration,
    /// Upper bound on a single fetch; a timeout counts as a failed poll.
    pub fetch_timeout: Duration,
    /// Most items sent in one notification.
    pub batch_size: usize,
    /// Upper bound on a single send; a timeout counts as a failed delivery.
    pub delivery_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(20),
            fetch_timeout: Duration::from_secs(15),
            batch_size: 20,
            delivery_timeout: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// Dedup state
// ---------------------------------------------------------------------------

/// What a session remembers between polls.
#[derive(Debug)]
pub struct DiffState {
    /// Identities seen on the most recent successful poll, and only those.
    known: HashSet<ItemIdentity>,
    /// In-band items discovered but not yet delivered, in discovery order.
    pending: VecDeque<ListingItem>,
    first_poll: bool,
}

impl DiffState {
    pub fn new() -> Self {
        Self {
            known: HashSet::new(),
            pending: VecDeque::new(),
            first_poll: true,
        }
    }

    /// Fold one successful snapshot into the state.
    ///
    /// The first snapshot only establishes the baseline.  Afterwards every
    /// in-band item whose identity was absent from the previous snapshot is
    /// queued, and the known set is replaced by this snapshot so a delisted
    /// item that comes back is reported again.
    ///
    /// Returns how many items were queued.
    pub fn observe(&mut self, snapshot: Vec<ListingItem>, band: &PriceBand) -> usize {
        let current: HashSet<ItemIdentity> = snapshot.iter().map(ListingItem::identity).collect();

        if self.first_poll {
            self.first_poll = false;
            self.known = current;
            return 0;
        }

        // A snapshot can list the same card twice; queue it once.
        let mut queued_now = HashSet::new();
        let before = self.pending.len();
        for item in snapshot {
            let id = item.identity();
            if !self.known.contains(&id) && band.contains(item.price) && queued_now.insert(id) {
                self.pending.push_back(item);
            }
        }

        self.known = current;
        self.pending.len() - before
    }

    /// Take up to `max` queued items, oldest first.
    pub fn drain_batch(&mut self, max: usize) -> Vec<ListingItem> {
        let n = max.min(self.pending.len());
        self.pending.drain(..n).collect()
    }

    pub fn is_first_poll(&self) -> bool {
        self.first_poll
    }

    pub fn known(&self) -> &HashSet<ItemIdentity> {
        &self.known
    }

    pub fn pending(&self) -> impl Iterator<Item = &ListingItem> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for DiffState {
    fn default() -> Self {
        Self::new()
    }
}

/// Concatenate the display lines of a batch.
pub fn format_batch(items: &[ListingItem]) -> String {
    items.iter().map(ListingItem::display_line).collect()
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Counters {
    cycles: AtomicU64,
    failed_polls: AtomicU64,
    delivered_items: AtomicU64,
    failed_deliveries: AtomicU64,
    last_success: SyncMutex<Option<DateTime<Utc>>>,
}

/// Point-in-time view of a session's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub cycles: u64,
    pub failed_polls: u64,
    pub delivered_items: u64,
    pub failed_deliveries: u64,
    pub last_success: Option<DateTime<Utc>>,
}

impl Counters {
    fn snapshot(&self) -> SessionStats {
        SessionStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            failed_polls: self.failed_polls.load(Ordering::Relaxed),
            delivered_items: self.delivered_items.load(Ordering::Relaxed),
            failed_deliveries: self.failed_deliveries.load(Ordering::Relaxed),
            last_success: *self.last_success.lock(),
        }
    }
}

// ---------------------------------------------------------------------------
// Session + handle
// ---------------------------------------------------------------------------

/// One watch over a URL, not yet running.
///
/// Construction only allocates state; [`start`](TrackingSession::start)
/// launches the worker.
pub struct TrackingSession {
    id: SessionId,
    url: String,
    band: PriceBand,
    destination: DestinationId,
    source: Arc<dyn ItemSource>,
    notifier: Arc<dyn Notifier>,
    settings: SessionSettings,
}

/// Control side of a running session.
pub struct TrackingHandle {
    id: SessionId,
    stop_tx: watch::Sender<bool>,
    /// `true` once stopped.  Held by the worker while it sends a batch.
    gate: Arc<Mutex<bool>>,
    counters: Arc<Counters>,
    task: JoinHandle<()>,
}

impl TrackingSession {
    pub fn new(
        id: SessionId,
        url: impl Into<String>,
        band: PriceBand,
        destination: DestinationId,
        source: Arc<dyn ItemSource>,
        notifier: Arc<dyn Notifier>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            id,
            url: url.into(),
            band,
            destination,
            source,
            notifier,
            settings,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Spawn the poll loop on the current tokio runtime.
    pub fn start(self) -> TrackingHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let gate = Arc::new(Mutex::new(false));
        let counters = Arc::new(Counters::default());
        let id = self.id;

        info!(
            session = id,
            destination = %self.destination,
            url = %self.url,
            band = %self.band,
            "tracking started"
        );

        let worker = Worker {
            session: self,
            state: DiffState::new(),
            stop_rx,
            gate: Arc::clone(&gate),
            counters: Arc::clone(&counters),
        };
        let task = tokio::spawn(worker.run());

        TrackingHandle {
            id,
            stop_tx,
            gate,
            counters,
            task,
        }
    }
}

impl TrackingHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Stop the session.
    ///
    /// A send that is waiting on the transport is abandoned; an in-flight
    /// fetch is left to finish on its own and its result is discarded.
    pub async fn stop(&self) {
        // Signal first: a worker parked in a send lets go of the gate on it.
        // The worker may already be gone.
        let _ = self.stop_tx.send(true);
        *self.gate.lock().await = true;
        debug!(session = self.id, "stop requested");
    }

    /// Stop the session and wait for its task to exit.
    pub async fn shutdown(self) {
        self.stop().await;
        if let Err(e) = self.task.await {
            warn!(session = self.id, "tracking task ended abnormally: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct Worker {
    session: TrackingSession,
    state: DiffState,
    stop_rx: watch::Receiver<bool>,
    gate: Arc<Mutex<bool>>,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(mut self) {
        let id = self.session.id;

        while !self.stopped() {
            self.counters.cycles.fetch_add(1, Ordering::Relaxed);

            match self.fetch().await {
                Ok(snapshot) => {
                    if self.stopped() {
                        debug!(session = id, "discarding poll result of a stopped session");
                        break;
                    }
                    *self.counters.last_success.lock() = Some(Utc::now());
                    let baseline = self.state.is_first_poll();
                    let queued = self.state.observe(snapshot, &self.session.band);
                    if baseline {
                        debug!(session = id, known = self.state.known().len(), "baseline established");
                    } else if queued > 0 {
                        debug!(session = id, queued, "new listings found");
                    }

                    if !self.deliver().await {
                        break;
                    }
                }
                Err(e) => {
                    // Nothing else happens this cycle; queued items wait.
                    self.counters.failed_polls.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        session = id,
                        source = self.session.source.name(),
                        url = %self.session.url,
                        "poll failed: {e}"
                    );
                }
            }

            self.pause().await;
        }

        info!(session = id, "tracking stopped");
    }

    /// Stop was requested, or the handle is gone.
    fn stopped(&self) -> bool {
        *self.stop_rx.borrow() || self.stop_rx.has_changed().is_err()
    }

    /// Sleep one poll interval, or less if the session is stopped.
    async fn pause(&self) {
        let mut stop_rx = self.stop_rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(self.session.settings.poll_interval) => {}
            _ = stop_rx.wait_for(|stopped| *stopped) => {}
        }
    }

    async fn fetch(&self) -> Result<Vec<ListingItem>, SourceError> {
        let timeout = self.session.settings.fetch_timeout;
        match tokio::time::timeout(timeout, self.session.source.fetch_listings(&self.session.url))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(timeout)),
        }
    }

    /// Send at most one batch.  Returns `false` if the session was stopped.
    async fn deliver(&mut self) -> bool {
        if self.state.pending_len() == 0 {
            return !self.stopped();
        }

        let closed = self.gate.lock().await;
        if *closed || self.stopped() {
            return false;
        }

        let batch = self.state.drain_batch(self.session.settings.batch_size);
        let text = format_batch(&batch);
        let session = &self.session;
        let limit = session.settings.delivery_timeout;
        let mut stop_rx = self.stop_rx.clone();

        let outcome = tokio::select! {
            biased;
            _ = stop_rx.wait_for(|stopped| *stopped) => {
                debug!(session = session.id, "send abandoned, session stopped");
                return false;
            }
            sent = tokio::time::timeout(limit, session.notifier.send(session.destination, &text)) => {
                sent.unwrap_or_else(|_| {
                    Err(DeliveryError {
                        destination: session.destination.to_string(),
                        reason: format!("no answer within {limit:?}"),
                    })
                })
            }
        };
        drop(closed);

        match outcome {
            Ok(()) => {
                self.counters
                    .delivered_items
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                debug!(session = session.id, items = batch.len(), "batch delivered");
            }
            Err(e) => {
                // The batch is dropped; the loop keeps going.
                self.counters.failed_deliveries.fetch_add(1, Ordering::Relaxed);
                warn!(session = session.id, "delivery failed: {e}");
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Serves a scripted sequence of poll results, repeating the last one.
    ///
    /// Calls listed in `hold_on` wait until [`release`](Self::release)
    /// is called before answering.
    pub struct ScriptedSource {
        script: SyncMutex<VecDeque<Result<Vec<ListingItem>, String>>>,
        last: SyncMutex<Vec<ListingItem>>,
        calls: AtomicU64,
        hold_on: Option<u64>,
        gate: Notify,
    }

    impl ScriptedSource {
        pub fn new(script: Vec<Result<Vec<ListingItem>, String>>) -> Self {
            Self {
                script: SyncMutex::new(script.into()),
                last: SyncMutex::new(Vec::new()),
                calls: AtomicU64::new(0),
                hold_on: None,
                gate: Notify::new(),
            }
        }

        /// Block the `call`-th fetch (1-based) until released.
        pub fn holding(mut self, call: u64) -> Self {
            self.hold_on = Some(call);
            self
        }

        pub fn release(&self) {
            self.gate.notify_one();
        }

        pub fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ItemSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch_listings(&self, _url: &str) -> Result<Vec<ListingItem>, SourceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.hold_on == Some(call) {
                self.gate.notified().await;
            }
            let next = self.script.lock().pop_front();
            match next {
                Some(Ok(items)) => {
                    *self.last.lock() = items.clone();
                    Ok(items)
                }
                Some(Err(msg)) => Err(SourceError::Extraction(msg)),
                None => Ok(self.last.lock().clone()),
            }
        }
    }

    pub fn item(n: u32, price: u64) -> ListingItem {
        ListingItem::new(
            format!("https://ay.by/lot/{n}"),
            format!("Lot {n}"),
            crate::source::Price::from_minor(price * 100),
        )
    }
}
