// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Binlog source boundary.
//!
//! The binlog wire protocol is not our concern. Whatever client speaks it
//! implements [`BinlogSource`]: given a start position, push every event in
//! emission order into an [`EventSink`] until told to stop.
//!
//! [`ChannelSource`] adapts any client that can write into a
//! `tokio::sync::mpsc` channel, which keeps that client's threading model
//! out of the pipeline.
//!
//! # Contract
//!
//! - Events are delivered one at a time; the next `send` starts only after
//!   the previous one completed.
//! - An error from `send` is fatal. The source must stop and return it.
//! - `run` returns `Ok(())` soon after the shutdown flag becomes `true`.
//! - The engine calls `run` before it reports `Running`, so anything an
//!   implementation records synchronously in `run` is visible by then.

use crate::checkpoint::LogPosition;
use crate::database::BoxFuture;
use crate::event::BinlogEvent;
use crate::producer::EventSink;
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

/// An external binlog client.
pub trait BinlogSource: Send + Sync + 'static {
    /// Stream events starting at `start` into `sink` until shutdown.
    fn run<'a>(
        &'a self,
        start: LogPosition,
        sink: Arc<dyn EventSink>,
        shutdown: watch::Receiver<bool>,
    ) -> BoxFuture<'a, ()>;
}

/// A [`BinlogSource`] fed through an mpsc channel.
///
/// The feeding side reads [`requested_start()`](Self::requested_start) to
/// know where to begin, then sends events. Closing the channel ends the run.
pub struct ChannelSource {
    rx: Mutex<mpsc::Receiver<BinlogEvent>>,
    requested_start: OnceLock<LogPosition>,
}

impl ChannelSource {
    pub fn new(buffer: usize) -> (Self, mpsc::Sender<BinlogEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                rx: Mutex::new(rx),
                requested_start: OnceLock::new(),
            },
            tx,
        )
    }

    /// The position the engine asked to start from, once `run` was called.
    pub fn requested_start(&self) -> Option<&LogPosition> {
        self.requested_start.get()
    }

    fn record_start(&self, start: &LogPosition) {
        if let Err(rejected) = self.requested_start.set(start.clone()) {
            if let Some(kept) = self.requested_start.get().filter(|kept| **kept != rejected) {
                warn!(
                    requested = %rejected,
                    kept = %kept,
                    "Binlog source restarted at a different position; keeping the first"
                );
            }
        }
    }
}

impl BinlogSource for ChannelSource {
    fn run<'a>(
        &'a self,
        start: LogPosition,
        sink: Arc<dyn EventSink>,
        mut shutdown: watch::Receiver<bool>,
    ) -> BoxFuture<'a, ()> {
        self.record_start(&start);
        Box::pin(async move {
            info!(start = %start, "Binlog source starting");
            let mut rx = self.rx.lock().await;

            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }

                    event = rx.recv() => match event {
                        Some(event) => sink.send(event).await?,
                        None => {
                            debug!("Binlog channel closed");
                            break;
                        }
                    },
                }
            }

            info!("Binlog source stopped");
            Ok(())
        })
    }
}
