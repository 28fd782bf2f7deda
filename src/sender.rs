//! Sharded outbound writers.
//!
//! Session tasks never write to sockets. They queue encoded packets on the
//! [`Sender`] shard selected by `session_id % shards`; each shard is a single
//! task that writes its queue in FIFO order. A write failure closes the
//! owning session, and nothing is written for a session once it is closed.
//! Every write has a deadline, so a peer that stops reading is closed
//! instead of stalling the other sessions of its shard.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use log::debug;
use thiserror::Error;
use tokio::{
    select,
    sync::mpsc::{self, error::TrySendError},
    time::timeout,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    metrics::{self, Direction},
    session::{CloseReason, SessionCore},
};

/// Returned when an outbound packet cannot be queued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The shard queue is full.
    #[error("outbound queue is full")]
    Full,
    /// The sender has shut down.
    #[error("sender is shut down")]
    Closed,
}

/// One packet to write.
pub(crate) struct Outbound {
    session: Arc<SessionCore>,
    bytes: Bytes,
    close_after: Option<CloseReason>,
}

impl Outbound {
    pub(crate) fn new(session: Arc<SessionCore>, bytes: Bytes) -> Self {
        Self {
            session,
            bytes,
            close_after: None,
        }
    }

    /// Close the session with `reason` once this packet has been written.
    pub(crate) fn then_close(mut self, reason: CloseReason) -> Self {
        self.close_after = Some(reason);
        self
    }
}

/// Handle to the sender shards.
#[derive(Clone, Debug)]
pub(crate) struct Sender {
    shards: Arc<[mpsc::Sender<Outbound>]>,
}

impl Sender {
    /// Spawn `shards` writer tasks on `tracker`, each with a queue of
    /// `queue_size` packets. A packet not written within `write_timeout`
    /// closes its session.
    pub(crate) fn spawn(
        shards: usize,
        queue_size: usize,
        write_timeout: Duration,
        tracker: &TaskTracker,
        shutdown: &CancellationToken,
    ) -> Self {
        let shards = (0..shards.max(1))
            .map(|index| {
                let (tx, rx) = mpsc::channel(queue_size.max(1));
                tracker.spawn(write_loop(index, rx, write_timeout, shutdown.clone()));
                tx
            })
            .collect();
        Self { shards }
    }

    /// Single-shard sender whose queue nobody drains.
    #[cfg(test)]
    pub(crate) fn detached(queue_size: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        (Self { shards: vec![tx].into() }, rx)
    }

    fn shard(&self, item: &Outbound) -> Result<&mpsc::Sender<Outbound>, SendError> {
        let len = u64::try_from(self.shards.len()).unwrap_or(u64::MAX).max(1);
        let index = usize::try_from(item.session.id().as_u64() % len).unwrap_or(0);
        self.shards.get(index).ok_or(SendError::Closed)
    }

    /// Queue `item`, waiting for room in the shard queue.
    pub(crate) async fn send(&self, item: Outbound) -> Result<(), SendError> {
        self.shard(&item)?
            .send(item)
            .await
            .map_err(|_| SendError::Closed)
    }

    /// Queue `item` without waiting.
    pub(crate) fn try_send(&self, item: Outbound) -> Result<(), SendError> {
        self.shard(&item)?.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn write_loop(
    index: usize,
    mut rx: mpsc::Receiver<Outbound>,
    write_timeout: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let item = select! {
            biased;

            () = shutdown.cancelled() => break,
            item = rx.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };
        write(item, write_timeout).await;
    }
    debug!("sender shard stopped: shard={index}");
}

async fn write(item: Outbound, write_timeout: Duration) {
    let Outbound {
        session,
        bytes,
        close_after,
    } = item;
    if session.is_closed() {
        return;
    }
    let result = match timeout(write_timeout, session.connection().write_packet(&bytes)).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("write not completed within {write_timeout:?}"),
        )),
    };
    if let Err(e) = result {
        if !session.is_closed() {
            debug!("write failed: session={}, error={e}", session.id());
            metrics::inc_errors();
        }
        session.close(CloseReason::WriteFailed);
        return;
    }
    metrics::inc_frames(Direction::Outbound);
    if let Some(reason) = close_after {
        session.close(reason);
    }
}
