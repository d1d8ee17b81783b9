//! TCP links between routers.
//!
//! `connect` dials a peer, `Listener` accepts peers, and `serve_with_shutdown`
//! attaches every accepted connection to a router until told to stop.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{error, info, instrument};

use crate::config::AlnConfig;
use crate::error::Result;
use crate::router::Router;
use crate::transport::StreamChannel;

/// Dial `addr` and wrap the connection in a channel.
#[instrument(skip(addr, config))]
pub async fn connect<A: ToSocketAddrs>(addr: A, config: &AlnConfig) -> Result<StreamChannel> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    info!(peer = %peer, "connected");
    StreamChannel::from_config(stream, peer.to_string(), config)
}

/// Accepts incoming router links.
pub struct Listener {
    inner: TcpListener,
    config: AlnConfig,
}

impl Listener {
    #[instrument(skip(addr, config))]
    pub async fn bind<A: ToSocketAddrs>(addr: A, config: AlnConfig) -> Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        info!(address = %inner.local_addr()?, "listening");
        Ok(Self { inner, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Wait for the next peer.
    pub async fn accept(&self) -> Result<(StreamChannel, SocketAddr)> {
        let (stream, peer) = self.inner.accept().await?;
        stream.set_nodelay(true)?;
        info!(peer = %peer, "accepted");
        let channel = StreamChannel::from_config(stream, peer.to_string(), &self.config)?;
        Ok((channel, peer))
    }
}

/// Attach every accepted connection to `router` until `shutdown_rx` fires.
#[instrument(skip_all, fields(router = %router.address()))]
pub async fn serve_with_shutdown(
    listener: Listener,
    router: Router,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("shutting down listener");
                return Ok(());
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((channel, _)) => {
                        router.add_channel(channel);
                    }
                    Err(e) => {
                        error!(error = %e, "error accepting connection");
                    }
                }
            }
        }
    }
}
