use crate::client_registry::ClientRegistry;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::network::Session;
use crate::protocol::{Executor, Reply};
use mio::net::{TcpListener as MioTcpListener, TcpStream as MioTcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::Mutex;
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle as SignalsHandle, Signals};
use std::io::{self, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::fd::{FromRawFd, IntoRawFd};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

const UNKNOWN_ERR_REPLY: &[u8] = b"-ERR unknown\r\n";

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);

/// Lifecycle of a [`Server`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    /// Created, not serving yet
    Idle = 0,
    Listening = 1,
    Stopping = 2,
    Stopped = 3,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ServerState::Idle,
            1 => ServerState::Listening,
            2 => ServerState::Stopping,
            _ => ServerState::Stopped,
        }
    }
}

/// Shared shutdown trigger.
///
/// Triggering sets a flag every loop checks at its next iteration and wakes
/// the accept loop out of `poll`.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<ShutdownInner>,
}

#[derive(Default)]
struct ShutdownInner {
    triggered: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl ShutdownSignal {
    pub fn trigger(&self) {
        if !self.inner.triggered.swap(true, Ordering::AcqRel) {
            info!("Initiating server shutdown");
        }

        if let Some(waker) = self.inner.waker.lock().as_ref() {
            if let Err(e) = waker.wake() {
                debug!("Failed to wake accept loop: {}", e);
            }
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::Acquire)
    }

    fn install_waker(&self, waker: Waker) {
        *self.inner.waker.lock() = Some(waker);
    }

    fn clear_waker(&self) {
        self.inner.waker.lock().take();
    }
}

/// Turns SIGINT/SIGTERM/SIGHUP/SIGQUIT into a shutdown trigger
struct SignalListener {
    handle: SignalsHandle,
    thread: JoinHandle<()>,
}

impl SignalListener {
    fn spawn(shutdown: ShutdownSignal) -> Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGQUIT])?;
        let handle = signals.handle();

        let thread = thread::Builder::new()
            .name("signal-listener".to_string())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    info!("Received signal {}, shutting down gracefully...", signal);
                    shutdown.trigger();
                }
            })?;

        Ok(Self { handle, thread })
    }

    fn stop(self) {
        self.handle.close();
        if self.thread.join().is_err() {
            error!("Signal listener panicked");
        }
    }
}

/// RESP server: one accept loop, one thread per connection
pub struct Server {
    config: Config,
    executor: Arc<dyn Executor>,
    registry: Arc<ClientRegistry>,
    shutdown: ShutdownSignal,
    state: AtomicU8,
}

impl Server {
    /// Create a new server with the given configuration and command executor
    pub fn new(config: Config, executor: Arc<dyn Executor>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            executor,
            registry: Arc::new(ClientRegistry::new()),
            shutdown: ShutdownSignal::default(),
            state: AtomicU8::new(ServerState::Idle as u8),
        })
    }

    /// Bind the configured address and serve until shut down
    pub fn run(self: &Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr())?;
        self.serve(listener)
    }

    /// Serve an already bound listener.
    ///
    /// Blocks until shutdown is triggered (by [`Server::shutdown`], a signal,
    /// or a fatal accept error) and every connection thread has finished.
    /// A fatal accept error is returned after teardown.
    pub fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<()> {
        let signals = if self.config.handle_signals {
            Some(SignalListener::spawn(self.shutdown.clone())?)
        } else {
            None
        };

        let mut workers = Vec::new();
        let outcome = self.accept_loop(listener, &mut workers);
        if let Err(e) = &outcome {
            error!("Accept loop failed: {}", e);
        }

        self.set_state(ServerState::Stopping);
        self.shutdown.trigger();

        let closed = self.registry.close_all();
        info!("Closed {} active connections", closed);

        self.executor.close();

        for worker in workers {
            if worker.join().is_err() {
                error!("Connection thread panicked");
            }
        }

        if let Some(signals) = signals {
            signals.stop();
        }

        self.set_state(ServerState::Stopped);
        info!("Server stopped");
        outcome
    }

    /// Signal the server to shut down gracefully
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// A trigger that can be moved to other threads
    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Get the number of active client connections
    pub fn active_connections(&self) -> usize {
        self.registry.client_count()
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    fn set_state(&self, state: ServerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn accept_loop(&self, listener: TcpListener, workers: &mut Vec<JoinHandle<()>>) -> Result<()> {
        listener.set_nonblocking(true)?;
        let mut listener = MioTcpListener::from_std(listener);

        let mut poll = Poll::new()?;
        let mut events = Events::with_capacity(128);
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        self.shutdown
            .install_waker(Waker::new(poll.registry(), WAKER)?);

        self.set_state(ServerState::Listening);
        if let Ok(addr) = listener.local_addr() {
            info!("Server listening on {}", addr);
        }

        let result = loop {
            if self.shutdown.is_triggered() {
                break Ok(());
            }

            if let Err(e) = poll.poll(&mut events, Some(self.config.poll_interval())) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                break Err(e.into());
            }

            if events.iter().any(|event| event.token() == LISTENER) {
                if let Err(e) = self.accept_ready(|| listener.accept(), workers) {
                    break Err(e);
                }
            }

            workers.retain(|worker| !worker.is_finished());
        };

        self.shutdown.clear_waker();
        let _ = poll.registry().deregister(&mut listener);
        drop(listener);
        debug!("Listener closed");

        result
    }

    /// Accept until the queue is drained
    fn accept_ready<A>(&self, mut accept: A, workers: &mut Vec<JoinHandle<()>>) -> Result<()>
    where
        A: FnMut() -> io::Result<(MioTcpStream, SocketAddr)>,
    {
        loop {
            match accept() {
                Ok((stream, addr)) => {
                    debug!("New connection from {}", addr);
                    if let Err(e) = self.spawn_session(stream, workers) {
                        warn!("Failed to set up connection from {}: {}", addr, e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if is_transient_accept_error(&e) => {
                    warn!("Transient accept error: {}, retrying", e);
                    thread::sleep(self.config.accept_backoff());
                    if self.shutdown.is_triggered() {
                        return Ok(());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn spawn_session(
        &self,
        stream: MioTcpStream,
        workers: &mut Vec<JoinHandle<()>>,
    ) -> Result<()> {
        // SAFETY: into_raw_fd gives up mio's ownership of the descriptor.
        let stream = unsafe { TcpStream::from_raw_fd(stream.into_raw_fd()) };
        stream.set_nonblocking(false)?;
        stream.set_nodelay(self.config.tcp_nodelay)?;

        if self.shutdown.is_triggered() {
            let _ = stream.shutdown(Shutdown::Both);
            return Ok(());
        }

        let session = Session::new(
            stream,
            Arc::clone(&self.registry),
            self.config.read_buffer_size,
        )?;
        let executor = Arc::clone(&self.executor);
        let shutdown = self.shutdown.clone();

        let worker = thread::Builder::new()
            .name(format!("conn-{}", session.id()))
            .spawn(move || serve_connection(session, executor.as_ref(), &shutdown))?;
        workers.push(worker);

        Ok(())
    }
}

/// Per-connection loop: read a frame, execute command arrays, write the reply.
fn serve_connection(mut session: Session, executor: &dyn Executor, shutdown: &ShutdownSignal) {
    let id = session.id();
    debug!("Session {} opened ({:?})", id, session.peer_addr());

    while !shutdown.is_triggered() {
        let response = match session.read_frame() {
            Err(e) if e.is_closed() => break,
            Err(e) => {
                match &e {
                    Error::Io(_) => warn!("Session {} read failed: {}", id, e),
                    _ => debug!("Session {} protocol error: {}", id, e),
                }
                e.to_reply().to_bytes()
            }
            Ok(Reply::Array(Some(args))) if !args.is_empty() => {
                session.handle().record_command();
                match executor.execute(&session, &args) {
                    Some(reply) => reply.to_bytes(),
                    None => UNKNOWN_ERR_REPLY.to_vec(),
                }
            }
            Ok(other) => {
                debug!("Session {} ignoring non-command frame {:?}", id, other);
                continue;
            }
        };

        if let Err(e) = session.write(&response) {
            if !e.is_closed() {
                warn!("Session {} write failed: {}", id, e);
            }
            break;
        }
    }

    if let Err(e) = session.close() {
        debug!("Session {} close error: {}", id, e);
    }
    debug!("Session {} closed", id);
}

fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::Interrupted
            | ErrorKind::TimedOut
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
    ) || matches!(
        e.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
    )
}
