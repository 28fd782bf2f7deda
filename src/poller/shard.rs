//! One poller shard: a task multiplexing reads for its own connections.

use std::{collections::HashMap, io, sync::Arc};

use futures::{FutureExt, StreamExt, future::BoxFuture, stream::FuturesUnordered};
use log::{debug, trace};
use tokio::{
    select,
    sync::mpsc::{self, error::TrySendError},
};
use tokio_util::sync::CancellationToken;

use super::{Inbound, Registration};
use crate::{
    buffer_pool::BufferPool,
    config::ServerConfig,
    connection::{
        Connection,
        ConnectionError,
        ConnectionId,
        Transport,
        websocket::{StreamState, WebSocketUnwrapper},
    },
    frame::{FrameReassembler, HEADER_LENGTH},
    metrics::{self, Direction},
};

/// Reads performed for one readiness event before yielding to other
/// connections on the shard.
const MAX_READS_PER_EVENT: usize = 16;

enum Event {
    /// The socket became readable, or waiting for it failed.
    Readable(ConnectionId, io::Result<()>),
    /// A backlog was delivered; `false` if the receiver went away.
    Flushed(ConnectionId, bool),
}

struct Entry {
    connection: Arc<Connection>,
    inbound: mpsc::Sender<Inbound>,
    reassembler: FrameReassembler,
    websocket: Option<WebSocketUnwrapper>,
}

impl Entry {
    /// Decode `bytes` and everything already buffered into `out`.
    ///
    /// Returns `true` if the connection has ended.
    fn ingest(&mut self, bytes: &[u8], out: &mut Vec<Inbound>) -> bool {
        match &mut self.websocket {
            Some(ws) => match ws.feed(bytes, &mut self.reassembler) {
                Ok(StreamState::Open) => {}
                Ok(StreamState::Closed) => {
                    if !self.drain(out) {
                        out.push(Err(ConnectionError::Eof));
                    }
                    return true;
                }
                Err(e) => {
                    if !self.drain(out) {
                        out.push(Err(e.into()));
                    }
                    return true;
                }
            },
            None => self.reassembler.feed(bytes),
        }
        self.drain(out)
    }

    /// Move complete frames into `out`; returns `true` on a decode error.
    fn drain(&mut self, out: &mut Vec<Inbound>) -> bool {
        loop {
            match self.reassembler.next_frame() {
                Ok(Some(frame)) => out.push(Ok(frame)),
                Ok(None) => return false,
                Err(e) => {
                    out.push(Err(e.into()));
                    return true;
                }
            }
        }
    }

    /// Read until the socket would block, the read budget is spent or the
    /// connection ends. Returns `true` if the connection has ended.
    fn pump(&mut self, scratch: &mut [u8], out: &mut Vec<Inbound>) -> bool {
        for _ in 0..MAX_READS_PER_EVENT {
            match self.connection.try_read(scratch) {
                Ok(0) => {
                    out.push(Err(ConnectionError::Eof));
                    return true;
                }
                Ok(n) => {
                    if self.ingest(scratch.get(..n).unwrap_or_default(), out) {
                        return true;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return false,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    out.push(Err(e.into()));
                    return true;
                }
            }
        }
        false
    }
}

pub(super) struct Shard {
    index: usize,
    registrations: mpsc::Receiver<Registration>,
    entries: HashMap<ConnectionId, Entry>,
    events: FuturesUnordered<BoxFuture<'static, Event>>,
    scratch: Vec<u8>,
    pool: Arc<BufferPool>,
    max_frame_length: usize,
}

impl Shard {
    pub(super) fn new(
        index: usize,
        registrations: mpsc::Receiver<Registration>,
        pool: Arc<BufferPool>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            index,
            registrations,
            entries: HashMap::new(),
            events: FuturesUnordered::new(),
            scratch: vec![0; config.read_buffer_size.max(1)],
            pool,
            max_frame_length: config.max_frame_length,
        }
    }

    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub(super) async fn run(mut self, shutdown: CancellationToken) {
        debug!("poller shard started: shard={}", self.index);
        loop {
            select! {
                biased;

                () = shutdown.cancelled() => break,
                registration = self.registrations.recv() => match registration {
                    Some(registration) => self.insert(registration),
                    None => break,
                },
                Some(event) = self.events.next(), if !self.events.is_empty() => self.handle(event),
            }
        }
        let remaining = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.reassembler.release(&self.pool);
        }
        debug!(
            "poller shard stopped: shard={}, connections={remaining}",
            self.index
        );
    }

    fn insert(&mut self, registration: Registration) {
        let Registration {
            connection,
            leftover,
            inbound,
        } = registration;
        let id = connection.id();
        let mut reassembler = FrameReassembler::from_pool(&self.pool, self.max_frame_length);
        let websocket = match connection.transport() {
            Transport::WebSocket => Some(WebSocketUnwrapper::new(
                leftover,
                self.max_frame_length + HEADER_LENGTH,
            )),
            Transport::Tcp => {
                reassembler.feed(&leftover);
                None
            }
        };
        trace!(
            "connection registered: shard={}, id={id}, peer={}",
            self.index,
            connection.peer_addr()
        );
        let mut entry = Entry {
            connection,
            inbound,
            reassembler,
            websocket,
        };
        let mut batch = Vec::new();
        let ended = entry.ingest(&[], &mut batch);
        self.entries.insert(id, entry);
        self.deliver(id, batch, ended);
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Readable(id, readiness) => {
                let Some(entry) = self.entries.get_mut(&id) else {
                    trace!("readiness for removed connection ignored: id={id}");
                    return;
                };
                let mut batch = Vec::new();
                let ended = match readiness {
                    Ok(()) => entry.pump(&mut self.scratch, &mut batch),
                    Err(e) => {
                        batch.push(Err(e.into()));
                        true
                    }
                };
                self.deliver(id, batch, ended);
            }
            Event::Flushed(id, true) => {
                if self.entries.contains_key(&id) {
                    self.arm(id);
                }
            }
            Event::Flushed(id, false) => self.remove(id),
        }
    }

    /// Push `batch` onto the connection's queue, then either re-arm the
    /// readiness wait or deregister.
    ///
    /// If the queue fills up the remainder is delivered by a background
    /// future and the connection is not read again until it completes.
    fn deliver(&mut self, id: ConnectionId, batch: Vec<Inbound>, ended: bool) {
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        let inbound = entry.inbound.clone();
        let mut items = batch.into_iter();
        while let Some(item) = items.next() {
            let is_frame = item.is_ok();
            match inbound.try_send(item) {
                Ok(()) => {
                    if is_frame {
                        metrics::inc_frames(Direction::Inbound);
                    }
                }
                Err(TrySendError::Full(item)) => {
                    let backlog: Vec<Inbound> = std::iter::once(item).chain(items).collect();
                    self.events.push(flush(id, inbound, backlog).boxed());
                    if ended {
                        self.remove(id);
                    }
                    return;
                }
                Err(TrySendError::Closed(_)) => {
                    self.remove(id);
                    return;
                }
            }
        }
        if ended {
            self.remove(id);
        } else {
            self.arm(id);
        }
    }

    fn arm(&mut self, id: ConnectionId) {
        if let Some(entry) = self.entries.get(&id) {
            let connection = Arc::clone(&entry.connection);
            self.events.push(
                async move {
                    let readiness = connection.read_ready().await.map(|_| ());
                    Event::Readable(id, readiness)
                }
                .boxed(),
            );
        }
    }

    fn remove(&mut self, id: ConnectionId) {
        if let Some(entry) = self.entries.remove(&id) {
            entry.reassembler.release(&self.pool);
            trace!("connection deregistered: shard={}, id={id}", self.index);
        }
    }
}

async fn flush(id: ConnectionId, inbound: mpsc::Sender<Inbound>, backlog: Vec<Inbound>) -> Event {
    for item in backlog {
        let is_frame = item.is_ok();
        if inbound.send(item).await.is_err() {
            return Event::Flushed(id, false);
        }
        if is_frame {
            metrics::inc_frames(Direction::Inbound);
        }
    }
    Event::Flushed(id, true)
}
