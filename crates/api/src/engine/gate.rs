//! Admission control for concurrent analyses.
//!
//! A counting gate over [`tokio::sync::Semaphore`] (whose wait queue is
//! FIFO, so no submitter is starved while slots free up). Slots are
//! released through [`GateSlot`]'s `Drop` impl, so a slot is returned
//! exactly once per acquire on every exit path, including panics and
//! task cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting admission gate with fixed capacity.
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    active: Arc<AtomicUsize>,
    waiting: Arc<AtomicUsize>,
}

/// An admitted slot. Dropping it releases the slot.
pub struct GateSlot {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for GateSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            active: Arc::new(AtomicUsize::new(0)),
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of currently admitted jobs.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of jobs queued for a slot.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Suspend until a slot is free.
    pub async fn acquire(&self) -> GateSlot {
        struct WaitingGuard(Arc<AtomicUsize>);
        impl Drop for WaitingGuard {
            fn drop(&mut self) {
                self.0.fetch_sub(1, Ordering::SeqCst);
            }
        }

        self.waiting.fetch_add(1, Ordering::SeqCst);
        // Guard keeps the waiting count honest even if this future is
        // cancelled while queued.
        let waiting = WaitingGuard(Arc::clone(&self.waiting));

        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("gate semaphore is never closed");

        drop(waiting);
        self.active.fetch_add(1, Ordering::SeqCst);
        GateSlot {
            _permit: permit,
            active: Arc::clone(&self.active),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn capacity_slots_can_be_held_simultaneously() {
        let gate = ConcurrencyGate::new(2);
        let _a = gate.acquire().await;
        let _b = gate.acquire().await;
        assert_eq!(gate.active(), 2);
        assert_eq!(gate.waiting(), 0);
    }

    #[tokio::test]
    async fn acquire_beyond_capacity_suspends() {
        let gate = Arc::new(ConcurrencyGate::new(1));
        let _held = gate.acquire().await;

        let attempt = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(attempt.is_err(), "second acquire should still be queued");
    }

    #[tokio::test]
    async fn dropping_a_slot_admits_the_next_waiter() {
        let gate = Arc::new(ConcurrencyGate::new(1));
        let held = gate.acquire().await;

        let gate2 = Arc::clone(&gate);
        let waiter = tokio::spawn(async move {
            let _slot = gate2.acquire().await;
        });

        // Give the waiter time to enqueue, then free the slot.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gate.waiting(), 1);
        drop(held);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be admitted after release")
            .unwrap();
        assert_eq!(gate.waiting(), 0);
    }

    #[tokio::test]
    async fn active_count_tracks_slot_lifetime() {
        let gate = ConcurrencyGate::new(3);
        assert_eq!(gate.active(), 0);
        let slot = gate.acquire().await;
        assert_eq!(gate.active(), 1);
        drop(slot);
        assert_eq!(gate.active(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_waiting_count() {
        let gate = Arc::new(ConcurrencyGate::new(1));
        let _held = gate.acquire().await;

        let gate2 = Arc::clone(&gate);
        let waiter = tokio::spawn(async move {
            let _slot = gate2.acquire().await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gate.waiting(), 1);

        waiter.abort();
        let _ = waiter.await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gate.waiting(), 0);
    }

    #[tokio::test]
    async fn waiters_are_admitted_in_order() {
        let gate = Arc::new(ConcurrencyGate::new(1));
        let held = gate.acquire().await;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for i in 0..3 {
            let gate = Arc::clone(&gate);
            let tx = tx.clone();
            tokio::spawn(async move {
                let _slot = gate.acquire().await;
                tx.send(i).unwrap();
            });
            // Enqueue deterministically, one waiter at a time.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        drop(held);
        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(
                tokio::time::timeout(Duration::from_secs(1), rx.recv())
                    .await
                    .expect("admission")
                    .unwrap(),
            );
        }
        assert_eq!(order, vec![0, 1, 2]);
    }
}
