//! Request/response broker for the bus.
//!
//! The thermostat answers one request at a time, so every outgoing read or
//! write is funneled through a single broker task that transmits, waits for
//! the matching response, and retransmits on timeout. Incoming frames are
//! classified on the transport side by [`FrameRouter`]: responses addressed
//! to us feed the broker, responses addressed to other devices feed the
//! snoop registry, and writes the thermostat directs at us are acknowledged
//! immediately.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Duration, Instant};

use crate::frame::{write_ack, Frame, Op, DEV_SAM, DEV_TSTAT};
use crate::snoop::SnoopList;
use crate::tables::{Table, TableAddr};
use crate::transport::TransportHandle;

const RESPONSE_TIMEOUT: Duration = Duration::from_millis(200);
const RESPONSE_RETRIES: u32 = 5;

/// Depth of the queue between the transport reader and the broker. Matching
/// is cheap, so this only needs to absorb short bursts.
pub(crate) const RESPONSE_QUEUE_DEPTH: usize = 32;

/// A read response echoes the 3-byte table address followed by three bytes
/// of unknown purpose; the record starts after both.
const RECORD_OFFSET: usize = 6;

pub(crate) struct Action {
    pub request: Frame,
    pub reply: oneshot::Sender<Option<Frame>>,
}

/// Classifies every frame the transport decodes. Runs on the transport
/// reader task; the returned frame, if any, is an acknowledgement the
/// transport must transmit right away.
pub(crate) struct FrameRouter {
    response_tx: mpsc::Sender<Frame>,
    snoops: Arc<SnoopList>,
}

impl FrameRouter {
    pub fn new(response_tx: mpsc::Sender<Frame>, snoops: Arc<SnoopList>) -> Self {
        FrameRouter { response_tx, snoops }
    }

    pub fn route(&self, frame: Frame) -> Option<Frame> {
        match frame.op {
            Op::Ack06 => {
                if frame.dst == DEV_SAM {
                    if self.response_tx.try_send(frame.clone()).is_err() {
                        log::debug!("response queue full, dropping frame: {frame}");
                    }
                }

                // Responses carrying more than an echoed table address are
                // interesting to observers of other devices.
                if frame.data.len() > 3 {
                    self.snoops.handle(&frame);
                }
                None
            }
            Op::WriteTableBlock if frame.src == DEV_TSTAT && frame.dst == DEV_SAM => {
                Some(write_ack())
            }
            _ => {
                log::debug!("ignoring frame: {frame}");
                None
            }
        }
    }
}

/// The single-writer state machine. Actions are served strictly in
/// submission order with at most one request in flight.
pub(crate) struct Broker {
    action_rx: mpsc::UnboundedReceiver<Action>,
    response_rx: mpsc::Receiver<Frame>,
    transport: TransportHandle,
}

impl Broker {
    pub fn new(
        action_rx: mpsc::UnboundedReceiver<Action>,
        response_rx: mpsc::Receiver<Frame>,
        transport: TransportHandle,
    ) -> Self {
        Broker {
            action_rx,
            response_rx,
            transport,
        }
    }

    pub async fn run(mut self) {
        while let Some(action) = self.action_rx.recv().await {
            self.perform(action).await;
        }
        log::warn!("broker exiting action loop");
    }

    async fn perform(&mut self, action: Action) {
        let encoded = match action.request.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                log::error!("cannot encode request frame: {e:}");
                action.reply.send(None).ok();
                return;
            }
        };

        log::debug!("transmitting request: {}", action.request);
        self.transport.send(encoded.clone()).await;

        let mut ticker = interval_at(Instant::now() + RESPONSE_TIMEOUT, RESPONSE_TIMEOUT);
        let mut tries = 0;

        while tries < RESPONSE_RETRIES {
            tokio::select! {
                response = self.response_rx.recv() => {
                    let Some(response) = response else {
                        break;
                    };

                    if response.src != action.request.dst {
                        log::debug!("response from unexpected device: {response}");
                        continue;
                    }

                    if action.request.op == Op::ReadTableBlock {
                        let requested = &action.request.data[..3];
                        match response.data.get(..3) {
                            Some(echoed) if echoed == requested => {}
                            _ => {
                                log::debug!(
                                    "got response for incorrect table, is: {:02x?} expected: {:02x?}",
                                    response.data.get(..3),
                                    requested,
                                );
                                continue;
                            }
                        }
                    }

                    action.reply.send(Some(response)).ok();
                    return;
                }
                _ = ticker.tick() => {
                    log::debug!("timeout waiting for response, retransmitting frame");
                    self.transport.send(encoded.clone()).await;
                    tries += 1;
                }
            }
        }

        log::warn!("action timed out: {}", action.request);
        action.reply.send(None).ok();
    }
}

/// Cloneable submission handle for the broker task. This is the only way
/// anything gets onto the wire.
#[derive(Clone)]
pub(crate) struct BrokerHandle {
    action_tx: mpsc::UnboundedSender<Action>,
}

impl BrokerHandle {
    pub fn new(action_tx: mpsc::UnboundedSender<Action>) -> Self {
        BrokerHandle { action_tx }
    }

    async fn send(&self, dst: u16, op: Op, data: Vec<u8>) -> Option<Frame> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let action = Action {
            request: Frame {
                src: DEV_SAM,
                dst,
                op,
                data,
            },
            reply: reply_tx,
        };

        if self.action_tx.send(action).is_err() {
            return None;
        }

        // A dropped reply means the engine is shutting down; report it the
        // same way as a timeout.
        reply_rx.await.ok().flatten()
    }

    /// Read and decode the record at `T::ADDR`.
    pub async fn read_table<T: Table>(&self, dst: u16) -> Option<T> {
        let response = self.send(dst, Op::ReadTableBlock, T::ADDR.0.to_vec()).await?;
        let record = response.data.get(RECORD_OFFSET..)?;

        let decoded = T::decode(record);
        if decoded.is_none() {
            log::error!(
                "short record for table {:02x?}: {} bytes",
                T::ADDR.0,
                record.len()
            );
        }
        decoded
    }

    /// Read a table as raw bytes, for tables the catalog does not describe.
    pub async fn read_raw(&self, dst: u16, addr: TableAddr) -> Option<Vec<u8>> {
        let response = self.send(dst, Op::ReadTableBlock, addr.0.to_vec()).await?;
        if response.data.len() > RECORD_OFFSET {
            Some(response.data[RECORD_OFFSET..].to_vec())
        } else {
            None
        }
    }

    /// Write a record; `flags` selects the fields the thermostat applies.
    pub async fn write_table<T: Table>(&self, dst: u16, table: &T, flags: u8) -> bool {
        let mut data = T::ADDR.0.to_vec();
        data.extend_from_slice(&[0x00, 0x00, flags]);
        data.extend_from_slice(&table.encode());

        self.send(dst, Op::WriteTableBlock, data).await.is_some()
    }
}
