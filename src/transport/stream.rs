//! Channel over a tokio byte stream.
//!
//! The stream is split in two. A send worker drains a bounded queue into a
//! `FramedWrite`; a receive worker, started by `receive`, feeds a
//! `FramedRead` into the packet callback. `send` uses `try_send` and drops
//! packets when the queue is full.
//!
//! Shutdown enqueues the empty sentinel packet behind any pending packets;
//! the send worker writes everything ahead of it and stops when it reaches
//! it. A watch flag stops the receive worker at once, and stops the send
//! worker once its queue is empty in case the sentinel did not fit. Either
//! worker ending closes the channel.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, trace, warn};

use crate::config::AlnConfig;
use crate::config::DEFAULT_QUEUE_CAPACITY;
use crate::core::codec::FrameCodec;
use crate::core::packet::{Packet, MAX_PACKET_SIZE};
use crate::error::{AlnError, Result};
use crate::transport::{Channel, CloseCallback, PacketCallback};

type Reader = Box<dyn FnOnce(PacketCallback, Arc<Shared>) + Send>;

struct Shared {
    label: String,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    on_closed: Mutex<Option<CloseCallback>>,
    tx: mpsc::Sender<Packet>,
}

impl Shared {
    fn on_closed(&self) -> MutexGuard<'_, Option<CloseCallback>> {
        self.on_closed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(channel = %self.label, "closing stream channel");
        // A full queue drops the sentinel; the watch flag still stops the
        // send worker after it drains.
        let _ = self.tx.try_send(Packet::new());
        self.shutdown.send_replace(true);
        let cb = self.on_closed().take();
        if let Some(cb) = cb {
            cb();
        }
    }
}

/// Packet channel over any `AsyncRead + AsyncWrite` stream.
pub struct StreamChannel {
    shared: Arc<Shared>,
    reader: Mutex<Option<Reader>>,
}

impl StreamChannel {
    /// Wrap `stream` with default queue and frame limits.
    ///
    /// Fails outside a tokio runtime.
    pub fn new<T>(stream: T, label: impl Into<String>) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_options(stream, label, DEFAULT_QUEUE_CAPACITY, MAX_PACKET_SIZE)
    }

    /// Wrap `stream` using the channel and parser sections of `config`.
    pub fn from_config<T>(stream: T, label: impl Into<String>, config: &AlnConfig) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_options(
            stream,
            label,
            config.channel.queue_capacity,
            config.parser.max_frame_size,
        )
    }

    pub fn with_options<T>(
        stream: T,
        label: impl Into<String>,
        queue_capacity: usize,
        max_frame_size: usize,
    ) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|e| {
            AlnError::Io(io::Error::other(format!(
                "stream channel needs a tokio runtime: {e}"
            )))
        })?;
        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let shared = Arc::new(Shared {
            label: label.into(),
            closed: AtomicBool::new(false),
            shutdown: watch::Sender::new(false),
            on_closed: Mutex::new(None),
            tx,
        });

        handle.spawn(send_worker(
            FramedWrite::new(write_half, FrameCodec::new()),
            rx,
            shared.clone(),
        ));

        let framed = FramedRead::new(read_half, FrameCodec::with_max_frame_size(max_frame_size));
        let reader: Reader = Box::new(move |on_packet, shared| {
            handle.spawn(receive_worker(framed, on_packet, shared));
        });

        Ok(Self {
            shared,
            reader: Mutex::new(Some(reader)),
        })
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Queue `packet` for the send worker. Returns `Ok(false)` when the queue
    /// is full and the packet was dropped.
    pub fn try_send(&self, packet: Packet) -> Result<bool> {
        if self.is_closed() {
            return Err(AlnError::ChannelClosed);
        }
        match self.shared.tx.try_send(packet) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(p)) => {
                debug!(channel = %self.shared.label, packet = %p, "send queue full, dropped");
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(AlnError::ChannelClosed),
        }
    }
}

impl Channel for StreamChannel {
    fn send(&self, packet: Packet) {
        if let Err(e) = self.try_send(packet) {
            trace!(channel = %self.shared.label, error = %e, "send dropped");
        }
    }

    fn receive(&self, on_packet: PacketCallback, on_closed: CloseCallback) {
        *self.shared.on_closed() = Some(on_closed);
        if self.is_closed() {
            let cb = self.shared.on_closed().take();
            if let Some(cb) = cb {
                cb();
            }
            return;
        }
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match reader {
            Some(start) => start(on_packet, self.shared.clone()),
            None => warn!(channel = %self.shared.label, "receive already started"),
        }
    }

    fn close(&self) {
        self.shared.shutdown();
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

/// Resolves once shutdown has been requested.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|closed| *closed).await;
}

async fn send_worker<T>(
    mut framed: FramedWrite<WriteHalf<T>, FrameCodec>,
    mut rx: mpsc::Receiver<Packet>,
    shared: Arc<Shared>,
) where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let mut stop = shared.shutdown.subscribe();
    loop {
        // queued packets go out before a shutdown request is honored
        let packet = tokio::select! {
            biased;
            next = rx.recv() => match next {
                Some(packet) => packet,
                None => break,
            },
            _ = stopped(&mut stop) => break,
        };
        if packet.is_sentinel() {
            break;
        }
        if let Err(e) = framed.send(packet).await {
            match e {
                AlnError::Io(io) => {
                    error!(channel = %shared.label, error = %io, "write failed");
                    break;
                }
                other => warn!(channel = %shared.label, error = %other, "packet not encodable, dropped"),
            }
        }
    }
    if let Err(e) = framed.close().await {
        trace!(channel = %shared.label, error = %e, "shutdown of write half failed");
    }
    shared.shutdown();
}

async fn receive_worker<T>(
    mut framed: FramedRead<ReadHalf<T>, FrameCodec>,
    on_packet: PacketCallback,
    shared: Arc<Shared>,
) where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let mut stop = shared.shutdown.subscribe();
    loop {
        tokio::select! {
            _ = stopped(&mut stop) => break,
            next = framed.next() => match next {
                Some(Ok(packet)) => on_packet(packet),
                Some(Err(e)) => {
                    error!(channel = %shared.label, error = %e, "read failed");
                    break;
                }
                None => {
                    debug!(channel = %shared.label, "peer closed stream");
                    break;
                }
            }
        }
    }
    shared.shutdown();
}
