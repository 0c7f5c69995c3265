//! Thin wrapper over `tokio::net::TcpListener`: bind once, accept in a loop.
//! Kept separate from `broker-core` so the routing core never names a
//! concrete transport and could be driven over anything implementing
//! `AsyncRead + AsyncWrite` (an in-memory pipe in tests, a real socket here).

use std::net::SocketAddr;

use broker_core::BrokerError;
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};

/// A bound TCP listener. `accept` yields one connected stream per call;
/// callers are expected to hand each one to
/// `broker_core::serve_connection` in its own task.
pub struct TcpListener {
    inner: TokioTcpListener,
    local_addr: SocketAddr,
}

impl TcpListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self, BrokerError> {
        let inner = TokioTcpListener::bind(addr)
            .await
            .map_err(|source| BrokerError::Bind { addr, source })?;
        let local_addr = inner.local_addr().map_err(|source| BrokerError::Bind { addr, source })?;
        Ok(Self { inner, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts the next inbound connection. Errors here are transient
    /// accept-level failures (too many open files, etc); the caller should
    /// log and keep looping rather than tearing down the listener.
    pub async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        self.inner.accept().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_to_an_ephemeral_port_and_accepts() {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr();
        assert_ne!(addr.port(), 0);

        let accept = tokio::spawn(async move { listener.accept().await });
        let _client = TcpStream::connect(addr).await.unwrap();
        let (_, peer) = accept.await.unwrap().unwrap();
        assert_eq!(peer.ip(), addr.ip());
    }
}
