// Exclusive-writer queue.
//
// `SQLite` allows a single writer transaction per connection, and all callers
// share one connection. The serializer admits one transaction body at a time,
// in arrival order, and brackets it with BEGIN IMMEDIATE / COMMIT / ROLLBACK.
// There is no timeout: a unit of work that never completes blocks every
// writer queued behind it.
//
// Plain reads do not queue here. They run on the same connection, so a read
// issued while a unit is in flight sees that unit's uncommitted rows, which
// may still be rolled back.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::Store;

/// A body of statements executed atomically by [`Store::run_exclusive`].
#[async_trait::async_trait]
pub trait UnitOfWork: Send {
    type Output: Send;

    /// Short name used in logs.
    fn label(&self) -> &'static str {
        "unit-of-work"
    }

    async fn run(self, store: &Store) -> crate::error::Result<Self::Output>;
}

/// Counters describing the serializer's history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializerStats {
    /// Callers queued or currently inside a transaction.
    pub pending: usize,
    pub committed: u64,
    pub rolled_back: u64,
}

/// FIFO gate admitting one transaction at a time.
///
/// `tokio::sync::Mutex` hands the lock out in the order `lock()` was called,
/// which is what gives the queue its fairness.
#[derive(Debug, Default)]
pub struct WriteSerializer {
    gate: Mutex<()>,
    pending: AtomicUsize,
    committed: AtomicU64,
    rolled_back: AtomicU64,
}

impl WriteSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> SerializerStats {
        SerializerStats {
            pending: self.pending.load(Ordering::SeqCst),
            committed: self.committed.load(Ordering::SeqCst),
            rolled_back: self.rolled_back.load(Ordering::SeqCst),
        }
    }

    /// Queue `work` behind every earlier caller, then run it in one transaction.
    pub async fn run<W: UnitOfWork>(
        &self,
        store: &Store,
        work: W,
    ) -> crate::error::Result<W::Output> {
        let _pending = PendingSlot::enter(&self.pending);
        let _turn = self.gate.lock().await;
        let label = work.label();
        debug!(unit = label, "Acquired write turn");

        store.exec("BEGIN IMMEDIATE").await?;
        let txn = OpenTxn { store, armed: true };

        let outcome = match work.run(store).await {
            Ok(output) => match store.exec("COMMIT").await {
                Ok(()) => {
                    txn.disarm();
                    Ok(output)
                }
                Err(err) => {
                    txn.rollback(label).await;
                    Err(err)
                }
            },
            Err(err) => {
                txn.rollback(label).await;
                Err(err)
            }
        };

        match &outcome {
            Ok(_) => {
                self.committed.fetch_add(1, Ordering::SeqCst);
                debug!(unit = label, "Committed");
            }
            Err(err) => {
                self.rolled_back.fetch_add(1, Ordering::SeqCst);
                debug!(unit = label, kind = %err.kind(), error = %err, "Rolled back");
            }
        }
        outcome
    }
}

/// Keeps `pending` accurate even when a queued caller is dropped.
struct PendingSlot<'a>(&'a AtomicUsize);

impl<'a> PendingSlot<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An open transaction. Dropped while still armed (the driving future was
/// cancelled), it rolls back synchronously so the next writer starts clean.
struct OpenTxn<'a> {
    store: &'a Store,
    armed: bool,
}

impl OpenTxn<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }

    /// Roll back, discarding any rollback failure so the caller's error wins.
    async fn rollback(mut self, label: &str) {
        let result = self.store.exec("ROLLBACK").await;
        self.armed = false;
        if let Err(err) = result {
            warn!(unit = label, error = %err, "Rollback failed; keeping original error");
        }
    }
}

impl Drop for OpenTxn<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Transaction abandoned mid-flight; rolling back");
            let _ = self.store.exec_now("ROLLBACK");
        }
    }
}
