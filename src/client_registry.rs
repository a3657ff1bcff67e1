use dashmap::DashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub id: usize,
    pub addr: Option<SocketAddr>,
    pub connected_at: u64,
    pub commands_processed: u64,
}

/// Registry-side view of a live session.
///
/// Holds its own handle on the socket so the session can be shut down from
/// any thread, which also wakes a read blocked on the session's thread.
pub struct SessionHandle {
    id: usize,
    addr: Option<SocketAddr>,
    connected_at: u64,
    stream: TcpStream,
    closed: AtomicBool,
    commands_processed: AtomicU64,
}

impl SessionHandle {
    pub(crate) fn new(id: usize, addr: Option<SocketAddr>, stream: TcpStream) -> Self {
        let connected_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            id,
            addr,
            connected_at,
            stream,
            closed: AtomicBool::new(false),
            commands_processed: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shut the socket down in both directions. Only the first call does anything.
    pub fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        match self.stream.shutdown(Shutdown::Both) {
            // Peer already gone
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    pub(crate) fn record_command(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id,
            addr: self.addr,
            connected_at: self.connected_at,
            commands_processed: self.commands_processed.load(Ordering::Relaxed),
        }
    }
}

/// Global registry of live sessions
pub struct ClientRegistry {
    clients: DashMap<usize, Arc<SessionHandle>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Register a new session
    pub fn register(&self, handle: Arc<SessionHandle>) {
        self.clients.insert(handle.id(), handle);
    }

    /// Unregister a session
    pub fn unregister(&self, id: usize) -> Option<Arc<SessionHandle>> {
        self.clients.remove(&id).map(|(_, handle)| handle)
    }

    /// Get all client information
    pub fn get_all_clients(&self) -> Vec<ClientInfo> {
        self.clients
            .iter()
            .map(|entry| entry.value().info())
            .collect()
    }

    /// Get client by ID
    pub fn get_client(&self, id: usize) -> Option<ClientInfo> {
        self.clients.get(&id).map(|e| e.info())
    }

    /// Close and drop every registered session, returning how many there were
    pub fn close_all(&self) -> usize {
        // Collected first so no map shard is held while sockets shut down.
        let handles: Vec<Arc<SessionHandle>> = self
            .clients
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for handle in &handles {
            if let Err(e) = handle.close() {
                debug!("Error closing session {}: {}", handle.id(), e);
            }
            self.unregister(handle.id());
        }

        handles.len()
    }

    /// Count total clients
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = ClientRegistry::new();
        let (server, _client) = socket_pair();
        let addr = server.peer_addr().ok();

        registry.register(Arc::new(SessionHandle::new(7, addr, server)));
        assert_eq!(registry.client_count(), 1);

        let info = registry.get_client(7).unwrap();
        assert_eq!(info.id, 7);
        assert_eq!(info.addr, addr);
        assert_eq!(info.commands_processed, 0);

        assert!(registry.unregister(7).is_some());
        assert!(registry.unregister(7).is_none());
        assert_eq!(registry.client_count(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (server, mut client) = socket_pair();
        let handle = SessionHandle::new(1, None, server);

        handle.close().unwrap();
        handle.close().unwrap();
        assert!(handle.is_closed());

        // Peer observes end of stream.
        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_close_all() {
        let registry = ClientRegistry::new();
        let mut peers = Vec::new();
        for id in 0..3 {
            let (server, client) = socket_pair();
            registry.register(Arc::new(SessionHandle::new(id, None, server)));
            peers.push(client);
        }
        assert_eq!(registry.get_all_clients().len(), 3);

        assert_eq!(registry.close_all(), 3);
        assert_eq!(registry.client_count(), 0);

        for mut peer in peers {
            let mut buf = [0u8; 8];
            assert_eq!(peer.read(&mut buf).unwrap(), 0);
        }
    }

    #[test]
    fn test_record_command() {
        let (server, _client) = socket_pair();
        let handle = SessionHandle::new(3, None, server);
        handle.record_command();
        handle.record_command();
        assert_eq!(handle.info().commands_processed, 2);
    }
}
