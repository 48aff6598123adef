//! Listening socket and single-client admission
//!
//! The acceptor binds with a backlog of one, accepts a client, publishes
//! it to the connection state, then stops accepting until delivery has
//! dropped that client. A second client meanwhile waits in the OS backlog.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::network::connection::{Client, SharedConnection};
use crate::shutdown::Shutdown;

/// Create a non-blocking TCP listener with an explicit backlog
pub fn create_listener(addr: SocketAddr, backlog: i32) -> Result<TcpListener, NetworkError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(NetworkError::SocketFailed)?;
    socket
        .set_reuse_address(true)
        .map_err(NetworkError::SocketFailed)?;
    socket
        .bind(&addr.into())
        .map_err(NetworkError::BindFailed)?;
    socket.listen(backlog).map_err(NetworkError::ListenFailed)?;
    socket
        .set_nonblocking(true)
        .map_err(NetworkError::SocketFailed)?;
    Ok(socket.into())
}

/// Owns the listening socket and fills the connection state
pub struct ConnectionAcceptor {
    listener: TcpListener,
    connection: SharedConnection,
    poll: Duration,
    write_timeout: Duration,
}

impl ConnectionAcceptor {
    /// Bind and listen; any failure here is fatal to the acceptor
    pub fn bind(config: &NetworkConfig, connection: SharedConnection) -> Result<Self, NetworkError> {
        let addr = (config.bind_address.as_str(), config.port)
            .to_socket_addrs()
            .map_err(NetworkError::BindFailed)?
            .next()
            .ok_or_else(|| {
                NetworkError::BindFailed(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no address for {}", config.bind_address),
                ))
            })?;

        let listener = create_listener(addr, config.backlog)?;
        tracing::info!("TCP server listening on {}", listener.local_addr().map_err(NetworkError::BindFailed)?);

        Ok(Self {
            listener,
            connection,
            poll: Duration::from_millis(config.accept_poll_ms.max(1)),
            write_timeout: Duration::from_millis(config.write_timeout_ms.max(1)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Wait for the next client. `Ok(None)` means shutdown was requested.
    pub fn accept_one(&self, shutdown: &Shutdown) -> Result<Option<TcpStream>, NetworkError> {
        loop {
            if shutdown.is_triggered() {
                return Ok(None);
            }
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    tracing::debug!("Accepted connection from {}", peer);
                    return Ok(Some(stream));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(self.poll),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    tracing::debug!("Transient accept error: {}", e);
                }
                Err(e) => return Err(NetworkError::AcceptFailed(e)),
            }
        }
    }

    fn configure(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(self.write_timeout))
    }

    /// Accept loop: admit one client, then wait for it to be dropped
    pub fn run(self, shutdown: Shutdown) {
        tracing::info!("Acceptor started");
        loop {
            let stream = match self.accept_one(&shutdown) {
                Ok(Some(stream)) => stream,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Acceptor stopping, no further clients will be admitted: {}", e);
                    break;
                }
            };

            if let Err(e) = self.configure(&stream) {
                tracing::warn!("Dropping client, socket setup failed: {}", e);
                continue;
            }

            if let Err(client) = self.connection.connect(Client::new(stream)) {
                tracing::warn!("Refusing {}, a client is already connected", client.peer());
                continue;
            }

            if !self.connection.wait_disconnected(&shutdown, self.poll) {
                break;
            }
        }
        tracing::info!("Acceptor stopped");
    }

    /// Run the accept loop on a dedicated named thread
    pub fn spawn(self, shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("acceptor".to_string())
            .spawn(move || self.run(shutdown))
    }
}
