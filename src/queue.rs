// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded FIFO hand-off between producer and worker.
//!
//! A thin layer over `tokio::sync::mpsc` that adds a shared depth counter,
//! so both ends (and the engine) can ask how full the queue is.
//!
//! # Backpressure
//!
//! [`QueueSender::put`] waits for a free slot for as long as it takes. It
//! never drops an event and never gives up, except when the receiver is gone,
//! in which case the engine is stopping and [`ReplicationError::Shutdown`]
//! is returned. A full queue therefore stalls the producer, which stalls the
//! binlog source.

use crate::error::{ReplicationError, Result};
use crate::event::ChangeEvent;
use crate::metrics;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Create a queue holding at most `capacity` events.
///
/// A capacity of zero is raised to one.
pub fn bounded(capacity: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let depth = Arc::new(AtomicUsize::new(0));
    (
        QueueSender {
            tx,
            depth: Arc::clone(&depth),
        },
        QueueReceiver { rx, depth },
    )
}

/// Producer end.
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::Sender<ChangeEvent>,
    depth: Arc<AtomicUsize>,
}

impl QueueSender {
    /// Enqueue, waiting for capacity.
    ///
    /// Cancel safe: a slot is reserved before the event is handed over.
    pub async fn put(&self, event: ChangeEvent) -> Result<()> {
        let permit = self
            .tx
            .reserve()
            .await
            .map_err(|_| ReplicationError::Shutdown)?;
        // Count before sending so the receiver never decrements below zero.
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        permit.send(event);
        metrics::set_queue_depth(depth);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Worker end.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<ChangeEvent>,
    depth: Arc<AtomicUsize>,
}

impl QueueReceiver {
    /// Next event in FIFO order. `None` once every sender is gone and the
    /// queue is drained.
    ///
    /// Cancel safe: dropping the future never loses an event.
    pub async fn take(&mut self) -> Option<ChangeEvent> {
        let event = self.rx.recv().await?;
        self.on_taken();
        Some(event)
    }

    /// Next event if one is already queued.
    pub fn try_take(&mut self) -> Option<ChangeEvent> {
        let event = self.rx.try_recv().ok()?;
        self.on_taken();
        Some(event)
    }

    fn on_taken(&self) {
        let depth = self.depth.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::set_queue_depth(depth);
    }

    /// Events currently queued.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Operation;
    use std::time::Duration;

    fn event(n: u64) -> ChangeEvent {
        ChangeEvent {
            operation: Operation::Insert,
            table_id: 1,
            source_log_offset: Some(n),
            rows: vec![vec![(n as i64).into()]],
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = bounded(8);
        for n in 0..5 {
            tx.put(event(n)).await.unwrap();
        }
        assert_eq!(rx.len(), 5);

        for n in 0..5 {
            assert_eq!(rx.take().await.unwrap().source_log_offset, Some(n));
        }
        assert!(rx.is_empty());
        assert!(tx.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_blocks_producer_until_consumer_advances() {
        let (tx, mut rx) = bounded(2);
        tx.put(event(1)).await.unwrap();
        tx.put(event(2)).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.put(event(3))).await;
        assert!(blocked.is_err(), "put should wait on a full queue");

        let producer = {
            let tx = tx.clone();
            tokio::spawn(async move { tx.put(event(3)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(rx.take().await.unwrap().source_log_offset, Some(1));
        producer.await.unwrap().unwrap();

        // The third event was not dropped.
        assert_eq!(rx.take().await.unwrap().source_log_offset, Some(2));
        assert_eq!(rx.take().await.unwrap().source_log_offset, Some(3));
    }

    #[tokio::test]
    async fn test_put_after_receiver_dropped_is_shutdown() {
        let (tx, rx) = bounded(1);
        drop(rx);
        let err = tx.put(event(1)).await.unwrap_err();
        assert!(matches!(err, ReplicationError::Shutdown));
        assert_eq!(tx.len(), 0);
    }

    #[tokio::test]
    async fn test_take_returns_none_when_closed_and_drained() {
        let (tx, mut rx) = bounded(4);
        tx.put(event(9)).await.unwrap();
        drop(tx);

        assert!(rx.take().await.is_some());
        assert!(rx.take().await.is_none());
    }

    #[tokio::test]
    async fn test_try_take() {
        let (tx, mut rx) = bounded(4);
        assert!(rx.try_take().is_none());
        tx.put(event(1)).await.unwrap();
        assert_eq!(rx.try_take().unwrap().source_log_offset, Some(1));
        assert!(rx.try_take().is_none());
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let (tx, _rx) = bounded(0);
        assert_eq!(tx.capacity(), 1);
    }
}
