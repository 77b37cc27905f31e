//! Dynamic completion barrier.
//!
//! A counting rendezvous where parties can join after collection has started.
//! Host tasks register one party per VM task they spawn, and must do so before
//! they arrive themselves; otherwise the count could touch zero while child
//! tasks are still about to start. The barrier does not enforce that ordering,
//! the collectors do.
//!
//! ```no_run
//! use vsphere_monitor::barrier::CollectionBarrier;
//!
//! # async fn demo() {
//! let barrier = CollectionBarrier::new();
//! let me = barrier.register();
//!
//! let child = barrier.register();
//! tokio::spawn(async move {
//!     // ... work ...
//!     drop(child);
//! });
//!
//! me.arrive_and_await().await;
//! # }
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct BarrierState {
    registered: AtomicUsize,
    arrived: AtomicUsize,
    outstanding: AtomicUsize,
    generation: AtomicU64,
    released: Notify,
}

/// Barrier shared by the orchestrator and every collection task of one run
#[derive(Debug, Clone, Default)]
pub struct CollectionBarrier {
    state: Arc<BarrierState>,
}

/// A registered party. Dropping it arrives and deregisters.
#[must_use = "dropping a party immediately arrives at the barrier"]
#[derive(Debug)]
pub struct BarrierParty {
    state: Arc<BarrierState>,
}

impl CollectionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one outstanding party
    pub fn register(&self) -> BarrierParty {
        self.state.registered.fetch_add(1, Ordering::SeqCst);
        self.state.outstanding.fetch_add(1, Ordering::SeqCst);
        BarrierParty {
            state: self.state.clone(),
        }
    }

    /// Parties registered but not yet arrived
    pub fn outstanding(&self) -> usize {
        self.state.outstanding.load(Ordering::SeqCst)
    }

    /// Total registrations over the barrier's lifetime
    pub fn registered(&self) -> usize {
        self.state.registered.load(Ordering::SeqCst)
    }

    /// Total arrivals over the barrier's lifetime
    pub fn arrived(&self) -> usize {
        self.state.arrived.load(Ordering::SeqCst)
    }

    /// Number of times the outstanding count has drained to zero
    pub fn generation(&self) -> u64 {
        self.state.generation.load(Ordering::SeqCst)
    }

    /// Wait until every registered party has arrived.
    ///
    /// Returns immediately when nothing is outstanding.
    pub async fn wait_all(&self) {
        self.state.wait_all().await
    }
}

impl BarrierState {
    fn arrive(&self) {
        self.arrived.fetch_add(1, Ordering::SeqCst);
        let previous = self.outstanding.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "arrival without registration");
        if previous == 1 {
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.released.notify_waiters();
        }
    }

    async fn wait_all(&self) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a release between the
            // check and the await is not lost.
            notified.as_mut().enable();
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl BarrierParty {
    /// Arrive and deregister now
    pub fn arrive(self) {
        drop(self);
    }

    /// Arrive and deregister, then wait for every other party
    pub async fn arrive_and_await(self) {
        let state = self.state.clone();
        drop(self);
        state.wait_all().await;
    }

    /// Register a sibling party on the same barrier
    pub fn register_child(&self) -> BarrierParty {
        CollectionBarrier {
            state: self.state.clone(),
        }
        .register()
    }
}

impl Drop for BarrierParty {
    fn drop(&mut self) {
        self.state.arrive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_without_parties_returns() {
        let barrier = CollectionBarrier::new();
        barrier.wait_all().await;
        assert_eq!(barrier.outstanding(), 0);
        assert_eq!(barrier.generation(), 0);
    }

    #[tokio::test]
    async fn test_counts_track_register_and_arrive() {
        let barrier = CollectionBarrier::new();
        let a = barrier.register();
        let b = barrier.register();
        assert_eq!(barrier.outstanding(), 2);

        a.arrive();
        assert_eq!(barrier.outstanding(), 1);
        assert_eq!(barrier.arrived(), 1);
        assert_eq!(barrier.generation(), 0);

        drop(b);
        assert_eq!(barrier.outstanding(), 0);
        assert_eq!(barrier.registered(), 2);
        assert_eq!(barrier.generation(), 1);
    }

    #[tokio::test]
    async fn test_waiter_blocks_until_late_child_arrives() {
        let barrier = CollectionBarrier::new();
        let orchestrator = barrier.register();
        let host = barrier.register();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let vm = host.register_child();
            drop(host);
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(vm);
        });

        let observer = barrier.clone();
        orchestrator.arrive_and_await().await;
        assert_eq!(observer.outstanding(), 0);
        assert_eq!(observer.arrived(), 3);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_party_released_when_task_panics() {
        let barrier = CollectionBarrier::new();
        let me = barrier.register();
        let party = barrier.register();

        let handle = tokio::spawn(async move {
            let _party = party;
            panic!("collector blew up");
        });
        assert!(handle.await.is_err());

        tokio::time::timeout(Duration::from_secs(1), me.arrive_and_await())
            .await
            .expect("barrier should release after panic");
    }
}
