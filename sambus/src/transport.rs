//! Serial port ownership, byte-stream resynchronization, and recovery.
//!
//! The RS-485 line is noisy and shared; we can join mid-frame, lose bytes,
//! or see the adapter disappear entirely. The transport task owns the port
//! outright: it accumulates raw bytes, re-aligns on frame boundaries one
//! byte at a time, and on any I/O error closes the port and reopens it from
//! an empty buffer.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout, Duration};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::broker::FrameRouter;
use crate::frame::{Frame, FRAME_OVERHEAD};

const BAUD_RATE: u32 = 38400;

/// A silent bus for this long means the adapter is wedged; reopen it.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

const REOPEN_DELAY: Duration = Duration::from_secs(1);

/// Accumulates raw bytes and yields the frames found in them. Corrupt or
/// misaligned input costs one byte of progress per attempt, so any garbage
/// prefix of length n is skipped after at most n shifts.
#[derive(Default)]
pub(crate) struct ResyncBuffer {
    buf: Vec<u8>,
}

impl ResyncBuffer {
    pub fn new() -> Self {
        ResyncBuffer::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// The next decodable frame, or `None` once more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            if self.buf.len() < FRAME_OVERHEAD {
                return None;
            }

            let frame_len = self.buf[4] as usize + FRAME_OVERHEAD;
            if self.buf.len() < frame_len {
                return None;
            }

            match Frame::decode(&self.buf[..frame_len]) {
                Some(frame) => {
                    self.buf.drain(..frame_len);
                    return Some(frame);
                }
                None => {
                    // Corrupt window; shift one byte and try again.
                    self.buf.drain(..1);
                }
            }
        }
    }
}

pub(crate) struct TxRequest {
    pub bytes: Vec<u8>,
    pub done: Option<oneshot::Sender<bool>>,
}

/// Write-side handle to the transport task.
#[derive(Clone)]
pub(crate) struct TransportHandle {
    write_tx: mpsc::UnboundedSender<TxRequest>,
}

impl TransportHandle {
    pub fn new(write_tx: mpsc::UnboundedSender<TxRequest>) -> Self {
        TransportHandle { write_tx }
    }

    /// Transmit raw frame bytes, resolving once the port write completed.
    /// Returns false when the port is closed (a reset is in progress) or
    /// the write itself failed.
    pub async fn send(&self, bytes: Vec<u8>) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        let request = TxRequest {
            bytes,
            done: Some(done_tx),
        };
        if self.write_tx.send(request).is_err() {
            return false;
        }
        done_rx.await.unwrap_or(false)
    }
}

fn open(device: &str) -> tokio_serial::Result<SerialStream> {
    tokio_serial::new(device, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .open_native_async()
}

pub(crate) struct SerialTransport {
    device: String,
    port: Option<SerialStream>,
    rx_buf: ResyncBuffer,
    write_rx: mpsc::UnboundedReceiver<TxRequest>,
    router: FrameRouter,
}

impl SerialTransport {
    /// Open the port and hand back the task alongside its write handle.
    /// The initial open is fatal; later failures are retried internally.
    pub fn start(
        device: &str,
        router: FrameRouter,
    ) -> tokio_serial::Result<(TransportHandle, tokio::task::JoinHandle<()>)> {
        log::info!("opening serial interface: {device}");
        let port = open(device)?;

        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let transport = SerialTransport {
            device: device.to_string(),
            port: Some(port),
            rx_buf: ResyncBuffer::new(),
            write_rx,
            router,
        };

        Ok((TransportHandle::new(write_tx), tokio::spawn(transport.run())))
    }

    async fn run(mut self) {
        let mut chunk = [0u8; 1024];

        loop {
            let Some(mut port) = self.port.take() else {
                if !self.reopen().await {
                    return;
                }
                continue;
            };

            let mut failed = false;

            tokio::select! {
                request = self.write_rx.recv() => {
                    let Some(request) = request else {
                        // Engine dropped every handle; shut down.
                        return;
                    };
                    let ok = match port.write_all(&request.bytes).await {
                        Ok(()) => {
                            log::debug!("transmitted frame: {:02x?}", request.bytes);
                            true
                        }
                        Err(e) => {
                            log::error!("error writing to serial: {e:}");
                            failed = true;
                            false
                        }
                    };
                    if let Some(done) = request.done {
                        done.send(ok).ok();
                    }
                }
                read = timeout(READ_TIMEOUT, port.read(&mut chunk)) => {
                    match read {
                        Ok(Ok(n)) if n > 0 => {
                            self.rx_buf.extend(&chunk[..n]);
                            failed = !self.drain_frames(&mut port).await;
                        }
                        Ok(Ok(_)) => {
                            log::error!("serial port returned end of stream");
                            failed = true;
                        }
                        Ok(Err(e)) => {
                            log::error!("error reading from serial port: {e:}");
                            failed = true;
                        }
                        Err(_) => {
                            log::error!("nothing read for {READ_TIMEOUT:?}, resetting port");
                            failed = true;
                        }
                    }
                }
            }

            if !failed {
                self.port = Some(port);
            }
        }
    }

    /// Decode every complete frame in the buffer, routing each and
    /// transmitting any acknowledgement the router asks for. Returns false
    /// when an acknowledgement write failed.
    async fn drain_frames(&mut self, port: &mut SerialStream) -> bool {
        while let Some(frame) = self.rx_buf.next_frame() {
            log::debug!("read frame: {frame}");

            if let Some(reply) = self.router.route(frame) {
                let encoded = match reply.encode() {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        log::error!("cannot encode acknowledgement: {e:}");
                        continue;
                    }
                };
                if let Err(e) = port.write_all(&encoded).await {
                    log::error!("error writing acknowledgement: {e:}");
                    return false;
                }
            }
        }
        true
    }

    /// One reopen attempt, preceded by a drain of queued writes (they fail
    /// silently while the port is down) and a short delay. Returns false
    /// when the engine is gone and the task should exit.
    async fn reopen(&mut self) -> bool {
        self.rx_buf.clear();

        loop {
            match self.write_rx.try_recv() {
                Ok(request) => {
                    if let Some(done) = request.done {
                        done.send(false).ok();
                    }
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }

        sleep(REOPEN_DELAY).await;

        log::info!("reopening serial interface: {}", self.device);
        match open(&self.device) {
            Ok(port) => {
                self.port = Some(port);
            }
            Err(e) => {
                log::error!("error reopening serial port: {e:}");
            }
        }
        true
    }
}
