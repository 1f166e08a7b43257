//! Fan-out of cache change events to subscribed listeners.
//!
//! The dispatcher owns its listener set exclusively and mutates it only
//! inside its own task; subscription, unsubscription and broadcast all
//! arrive over channels. Each listener has a bounded FIFO; a listener that
//! stops draining it is evicted on the first overflow so one stuck
//! subscriber can never stall the rest.

use futures::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{
    self, error::TrySendError, Receiver, Sender, UnboundedReceiver, UnboundedSender,
};
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};

use crate::cache::StateEntry;

/// Per-listener FIFO depth. A subscriber more than this many events behind
/// is considered dead.
const LISTENER_QUEUE_DEPTH: usize = 32;

const BROADCAST_QUEUE_DEPTH: usize = 64;

/// A cache change notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub source: &'static str,
    pub data: StateEntry,
}

/// A live subscription. Dropping the listener (or calling [`Listener::close`])
/// deregisters it; the receive side reports `None` once the listener has
/// been deregistered or evicted and its queue is drained.
pub struct Listener {
    id: u64,
    rx: Receiver<Event>,
    deregister_tx: UnboundedSender<u64>,
}

impl Listener {
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn close(self) {}
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.deregister_tx.send(self.id).ok();
    }
}

#[derive(Clone)]
pub(crate) struct DispatcherHandle {
    next_id: Arc<AtomicU64>,
    register_tx: UnboundedSender<(u64, Sender<Event>)>,
    deregister_tx: UnboundedSender<u64>,
    broadcast_tx: Sender<Event>,
}

impl DispatcherHandle {
    pub fn new_listener(&self) -> Listener {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(LISTENER_QUEUE_DEPTH);
        self.register_tx.send((id, tx)).ok();
        Listener {
            id,
            rx,
            deregister_tx: self.deregister_tx.clone(),
        }
    }

    pub fn broadcast(&self, source: &'static str, data: StateEntry) {
        if self.broadcast_tx.try_send(Event { source, data }).is_err() {
            log::warn!("event queue full, dropping {source} broadcast");
        }
    }
}

/// Owner of the fan-out task. Dropping it tears the task down, which closes
/// every listener FIFO.
pub(crate) struct Dispatcher {
    handle: DispatcherHandle,
    task: tokio::task::JoinHandle<()>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (deregister_tx, deregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_QUEUE_DEPTH);

        let task = tokio::spawn(run(register_rx, deregister_rx, broadcast_rx));

        Dispatcher {
            handle: DispatcherHandle {
                next_id: Arc::new(AtomicU64::new(0)),
                register_tx,
                deregister_tx,
                broadcast_tx,
            },
            task,
        }
    }

    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    register_rx: UnboundedReceiver<(u64, Sender<Event>)>,
    deregister_rx: UnboundedReceiver<u64>,
    broadcast_rx: Receiver<Event>,
) {
    let mut register_stream = UnboundedReceiverStream::new(register_rx);
    let mut deregister_stream = UnboundedReceiverStream::new(deregister_rx);
    let mut broadcast_stream = ReceiverStream::new(broadcast_rx);
    let mut listeners: HashMap<u64, Sender<Event>> = HashMap::new();

    loop {
        let register = register_stream.next().fuse();
        let deregister = deregister_stream.next().fuse();
        let broadcast = broadcast_stream.next().fuse();

        tokio::select! {
            Some((id, tx)) = register => {
                log::debug!("registered listener {id}");
                listeners.insert(id, tx);
            }
            Some(id) = deregister => {
                if listeners.remove(&id).is_some() {
                    log::debug!("deregistered listener {id}");
                }
            }
            event = broadcast => {
                let Some(event) = event else {
                    break;
                };
                listeners.retain(|id, tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        log::warn!("listener {id} not draining its queue, evicting");
                        false
                    }
                    Err(TrySendError::Closed(_)) => false,
                });
            }
            else => break,
        }
    }

    log::debug!("dispatcher exiting, closing {} listeners", listeners.len());
}
