//! HTTP server implementation
//!
mod connection;
mod manager;

pub use self::connection::Connection;
pub use self::manager::{ConnectionManager, ConnHandle, HttpPersistence};

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use futures::{Future, Stream, Poll, Async};
use futures::sync::oneshot;
use tokio_core::net::{TcpListener, Incoming};
use tokio_core::reactor::{Handle, Interval};

use error::Error;
use files::FileIo;
use handler::{RequestHandler, HandlerCallback};


/// The server: an acceptor, a tick timer and the connection registry
///
/// The server is a future; run it on the reactor. It resolves once the
/// shutdown handle fires (graceful shutdown: the acceptor and the timer
/// are dropped and every live connection is asked to stop) or the
/// acceptor dies.
///
/// Signal handling stays with the embedder: wire `SIGINT`/`SIGTERM`/
/// `SIGQUIT` (where available) to [`shutdown_handle`].
///
/// [`shutdown_handle`]: #method.shutdown_handle
pub struct Server {
    incoming: Incoming,
    local_addr: SocketAddr,
    handle: Handle,
    manager: ConnectionManager,
    dispatcher: Rc<RefCell<RequestHandler>>,
    max_content_size: usize,
    next_id: u64,
    tick: Interval,
    shutdown: Option<oneshot::Receiver<()>>,
    shutdown_tx: Rc<RefCell<Option<oneshot::Sender<()>>>>,
}

/// Triggers a graceful shutdown of the server it came from
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Rc<RefCell<Option<oneshot::Sender<()>>>>,
}

impl ShutdownHandle {
    /// Idempotent; the first call wins
    pub fn shutdown(&self) {
        if let Some(tx) = self.tx.borrow_mut().take() {
            let _ = tx.send(());
        }
    }
}

impl Server {
    /// Binds the server to an address
    ///
    /// A `file_io` of `None` disables the built-in GET and multipart
    /// POST flows; every request then falls through to the handlers
    /// and the file-not-found callback. `max_content_size` is the size
    /// of the per-connection body buffer and of every streamed chunk;
    /// values below 1024 bytes are refused before anything is bound.
    pub fn bind(addr: &SocketAddr, handle: &Handle,
                file_io: Option<Rc<FileIo>>,
                persistence: HttpPersistence,
                max_content_size: usize)
        -> Result<Server, Error>
    {
        if max_content_size < 1024 {
            return Err(Error::Config(
                "max_content_size must be at least 1024 bytes"));
        }
        let listener = TcpListener::bind(addr, handle)?;
        let local_addr = listener.local_addr()?;
        let tick = Interval::new(Duration::from_secs(1), handle)?;
        let (tx, rx) = oneshot::channel();
        info!("listening on {}", local_addr);
        Ok(Server {
            incoming: listener.incoming(),
            local_addr: local_addr,
            handle: handle.clone(),
            manager: ConnectionManager::new(persistence),
            dispatcher: Rc::new(RefCell::new(RequestHandler::new(file_io))),
            max_content_size: max_content_size,
            next_id: 0,
            tick: tick,
            shutdown: Some(rx),
            shutdown_tx: Rc::new(RefCell::new(Some(tx))),
        })
    }

    /// The port the OS assigned, useful after binding port 0
    pub fn binded_port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Appends a handler to the chain; handlers run in registration
    /// order
    pub fn add_request_handler(&self, callback: HandlerCallback) {
        self.dispatcher.borrow_mut().add_request_handler(callback);
    }

    /// Replaces the default stock-404 fallback
    pub fn set_file_not_found_handler(&self, callback: HandlerCallback) {
        self.dispatcher.borrow_mut().set_file_not_found_handler(callback);
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { tx: self.shutdown_tx.clone() }
    }
}

impl Future for Server {
    type Item = ();
    type Error = ::std::io::Error;

    fn poll(&mut self) -> Poll<(), Self::Error> {
        let signal = match self.shutdown {
            Some(ref mut rx) => match rx.poll() {
                Ok(Async::Ready(())) => Some(true),
                Ok(Async::NotReady) => None,
                // the handle was dropped unused; keep serving
                Err(_) => Some(false),
            },
            None => None,
        };
        match signal {
            Some(true) => {
                info!("shutting down, stopping {} connections",
                      self.manager.len());
                self.manager.stop_all();
                // dropping self closes the acceptor and the timer
                return Ok(Async::Ready(()));
            }
            Some(false) => self.shutdown = None,
            None => {}
        }

        loop {
            match self.tick.poll()? {
                Async::Ready(Some(())) => self.manager.tick(),
                Async::Ready(None) => break,
                Async::NotReady => break,
            }
        }

        loop {
            match self.incoming.poll()? {
                Async::Ready(Some((sock, peer))) => {
                    let id = self.next_id;
                    self.next_id += 1;
                    debug!("accepted connection {} from {}", id, peer);
                    let conn = Connection::new(
                        sock, id,
                        self.manager.start(id),
                        self.manager.clone(),
                        self.dispatcher.clone(),
                        self.max_content_size);
                    self.handle.spawn(conn.map_err(move |e| {
                        debug!("connection {}: {}", id, e);
                    }));
                }
                Async::Ready(None) => return Ok(Async::Ready(())),
                Async::NotReady => return Ok(Async::NotReady),
            }
        }
    }
}
