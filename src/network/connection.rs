//! Shared connection state: no client, or exactly one connected client
//!
//! Only the acceptor moves the state to connected and only delivery moves
//! it back. Sources read the lock-free `is_connected` flag to gate
//! production. Delivery writes through a cloned [`ClientWriter`] so that
//! a slow peer never holds the state lock.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::io::{self, Write};
use std::net::{Shutdown as NetShutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::NetworkError;
use crate::shutdown::Shutdown;

/// Byte sink behind a connected client
pub trait ClientStream: Write + Send {
    /// Human-readable peer description for logs
    fn peer(&self) -> String;

    /// Tear down the underlying transport
    fn close(&mut self);

    /// Second handle onto the same transport
    fn try_clone_stream(&self) -> io::Result<Box<dyn ClientStream>>;
}

impl ClientStream for TcpStream {
    fn peer(&self) -> String {
        self.peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    fn close(&mut self) {
        let _ = self.shutdown(NetShutdown::Both);
    }

    fn try_clone_stream(&self) -> io::Result<Box<dyn ClientStream>> {
        Ok(Box::new(self.try_clone()?))
    }
}

/// Handle to the single active client
pub struct Client {
    stream: Box<dyn ClientStream>,
    peer: String,
    connected_at: Instant,
    /// Assigned on admission; 0 until then
    id: u64,
}

impl Client {
    pub fn new(stream: impl ClientStream + 'static) -> Self {
        let peer = stream.peer();
        Self {
            stream: Box::new(stream),
            peer,
            connected_at: Instant::now(),
            id: 0,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    fn close(&mut self) {
        self.stream.close();
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("peer", &self.peer)
            .field("id", &self.id)
            .finish()
    }
}

/// A write that failed after `written` bytes had already been accepted
#[derive(Debug)]
pub struct PartialWrite {
    pub written: usize,
    pub error: io::Error,
}

/// Write handle onto the active client, used without holding the state lock
pub struct ClientWriter {
    id: u64,
    peer: String,
    stream: Box<dyn ClientStream>,
}

impl ClientWriter {
    /// Id of the client this handle writes to
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Write all of `buf`, reporting how far it got on failure
    pub fn write_all(&mut self, buf: &[u8]) -> Result<(), PartialWrite> {
        let mut written = 0;
        while written < buf.len() {
            match self.stream.write(&buf[written..]) {
                Ok(0) => {
                    return Err(PartialWrite {
                        written,
                        error: io::Error::new(io::ErrorKind::WriteZero, "client accepted no bytes"),
                    })
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(PartialWrite { written, error }),
            }
        }
        Ok(())
    }
}

/// Snapshot of the connection for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected { peer: String },
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => f.write_str("disconnected"),
            ConnectionStatus::Connected { peer } => write!(f, "connected ({})", peer),
        }
    }
}

/// Process-wide connection state
pub struct ConnectionState {
    slot: Mutex<Option<Client>>,
    changed: Condvar,
    /// Mirror of `slot.is_some()`, updated under the lock
    connected: AtomicBool,
    connections: AtomicU64,
}

impl ConnectionState {
    /// Create in the disconnected state
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            changed: Condvar::new(),
            connected: AtomicBool::new(false),
            connections: AtomicU64::new(0),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.slot.lock().as_ref() {
            Some(client) => ConnectionStatus::Connected {
                peer: client.peer().to_string(),
            },
            None => ConnectionStatus::Disconnected,
        }
    }

    /// Number of clients admitted so far; also the id of the latest one
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Id of the active client, if any
    pub fn active_id(&self) -> Option<u64> {
        self.slot.lock().as_ref().map(Client::id)
    }

    /// Publish a newly accepted client.
    ///
    /// Refuses (handing the client back) while another client is active.
    pub fn connect(&self, mut client: Client) -> Result<(), Client> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(client);
        }
        client.id = self.connections.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!("Client connected: {} (#{})", client.peer(), client.id);
        *slot = Some(client);
        self.connected.store(true, Ordering::Release);
        self.changed.notify_all();
        Ok(())
    }

    /// Write handle onto the active client. The state lock is held only
    /// while the handle is cloned.
    pub fn writer(&self) -> Result<Option<ClientWriter>, NetworkError> {
        let slot = self.slot.lock();
        let client = match slot.as_ref() {
            Some(client) => client,
            None => return Ok(None),
        };
        let stream = client.stream.try_clone_stream().map_err(NetworkError::SendFailed)?;
        Ok(Some(ClientWriter {
            id: client.id,
            peer: client.peer.clone(),
            stream,
        }))
    }

    /// Close the active client, if any. Returns whether one was removed.
    pub fn disconnect(&self) -> bool {
        self.disconnect_where(|_| true)
    }

    /// Close the active client only if it is still client `id`
    pub fn disconnect_client(&self, id: u64) -> bool {
        self.disconnect_where(|client| client.id == id)
    }

    fn disconnect_where(&self, matches: impl FnOnce(&Client) -> bool) -> bool {
        let mut slot = self.slot.lock();
        if !slot.as_ref().is_some_and(matches) {
            return false;
        }
        let Some(mut client) = slot.take() else {
            return false;
        };
        client.close();
        self.connected.store(false, Ordering::Release);
        tracing::info!(
            "Client disconnected: {} after {:.1}s",
            client.peer(),
            client.connected_for().as_secs_f32()
        );
        self.changed.notify_all();
        true
    }

    /// Block until the state reads `connected`, or `timeout` elapses
    pub fn wait_for(&self, connected: bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while slot.is_some() != connected {
            if self.changed.wait_until(&mut slot, deadline).timed_out() {
                return slot.is_some() == connected;
            }
        }
        true
    }

    /// Block until the active client is gone, re-checking `shutdown` every
    /// `poll`. Returns false if shutdown came first.
    pub fn wait_disconnected(&self, shutdown: &Shutdown, poll: Duration) -> bool {
        let mut slot = self.slot.lock();
        while slot.is_some() {
            if shutdown.is_triggered() {
                return false;
            }
            self.changed.wait_for(&mut slot, poll);
        }
        true
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe handle to the connection state
pub type SharedConnection = Arc<ConnectionState>;
