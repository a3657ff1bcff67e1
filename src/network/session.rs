use crate::client_registry::{ClientRegistry, SessionHandle};
use crate::error::{Error, Result};
use crate::protocol::{Decoder, Payload};
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_SESSION_ID: AtomicUsize = AtomicUsize::new(1);

/// One accepted connection, registered for the whole of its life.
///
/// Reads go through a [`Decoder`] bound to the socket; writes go straight to
/// it. Dropping the session closes it.
pub struct Session {
    handle: Arc<SessionHandle>,
    writer: TcpStream,
    frames: Decoder<BufReader<TcpStream>>,
    registry: Arc<ClientRegistry>,
}

impl Session {
    /// Wrap `stream` and add it to `registry`
    pub fn new(
        stream: TcpStream,
        registry: Arc<ClientRegistry>,
        read_buffer_size: usize,
    ) -> Result<Self> {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let addr = stream.peer_addr().ok();

        let reader = BufReader::with_capacity(read_buffer_size, stream.try_clone()?);
        let handle = Arc::new(SessionHandle::new(id, addr, stream.try_clone()?));
        registry.register(Arc::clone(&handle));

        Ok(Self {
            handle,
            writer: stream,
            frames: Decoder::new(reader),
            registry,
        })
    }

    pub fn id(&self) -> usize {
        self.handle.id()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.handle.addr()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    pub(crate) fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Write all of `buf`, returning the number of bytes written
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        (&self.writer).write_all(buf)?;
        Ok(buf.len())
    }

    /// Next decoded frame, or the error that ended the stream.
    ///
    /// Once the decoder has terminated this keeps returning
    /// [`Error::ConnectionClosed`].
    pub fn read_frame(&mut self) -> Payload {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        self.frames.next().unwrap_or(Err(Error::ConnectionClosed))
    }

    /// Shut the connection down and leave the registry. Safe to call twice.
    pub fn close(&self) -> Result<()> {
        self.registry.unregister(self.id());
        self.handle.close()?;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
