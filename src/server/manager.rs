use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use futures::task::{self, Task};


/// Keep-alive policy of a server
///
/// A zero value disables the respective limit.
#[derive(Debug, Clone, Copy)]
pub struct HttpPersistence {
    /// Connections close after this many served requests
    pub max_keep_alive_requests: u32,
    /// Connections close after being idle this long
    pub idle_timeout: Duration,
}

impl HttpPersistence {
    pub fn new(max_keep_alive_requests: u32, idle_timeout: Duration)
        -> HttpPersistence
    {
        HttpPersistence {
            max_keep_alive_requests: max_keep_alive_requests,
            idle_timeout: idle_timeout,
        }
    }
}

/// Per-connection bookkeeping shared between a connection future and
/// the manager
///
/// The manager never owns the connection itself; it flips the stop flag
/// and wakes the task, and the connection closes itself at its next
/// poll.
#[derive(Debug)]
pub struct ConnHandle {
    id: u64,
    stopped: Cell<bool>,
    served: Cell<u32>,
    last_active: Cell<Instant>,
    task: RefCell<Option<Task>>,
}

impl ConnHandle {
    fn new(id: u64) -> ConnHandle {
        ConnHandle {
            id: id,
            stopped: Cell::new(false),
            served: Cell::new(0),
            last_active: Cell::new(Instant::now()),
            task: RefCell::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }

    /// Requests served on this connection so far
    pub fn served(&self) -> u32 {
        self.served.get()
    }

    /// Must be called on every poll so the manager can wake the
    /// connection
    pub fn register_task(&self) {
        *self.task.borrow_mut() = Some(task::current());
    }

    pub fn touch(&self) {
        self.last_active.set(Instant::now());
    }

    pub fn add_served(&self) -> u32 {
        let served = self.served.get() + 1;
        self.served.set(served);
        served
    }

    fn stop(&self) {
        self.stopped.set(true);
        if let Some(ref task) = *self.task.borrow() {
            task.notify();
        }
    }
}

struct Inner {
    persistence: HttpPersistence,
    conns: HashMap<u64, Rc<ConnHandle>>,
}

/// Registry of the live connections
///
/// Cheap to clone; every connection carries one so it can deregister
/// itself when it closes.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Rc<RefCell<Inner>>,
}

impl ConnectionManager {
    pub fn new(persistence: HttpPersistence) -> ConnectionManager {
        ConnectionManager {
            inner: Rc::new(RefCell::new(Inner {
                persistence: persistence,
                conns: HashMap::new(),
            })),
        }
    }

    pub fn persistence(&self) -> HttpPersistence {
        self.inner.borrow().persistence
    }

    /// Registers a new connection and returns its bookkeeping handle
    pub fn start(&self, id: u64) -> Rc<ConnHandle> {
        let handle = Rc::new(ConnHandle::new(id));
        self.inner.borrow_mut().conns.insert(id, handle.clone());
        handle
    }

    /// Asks one connection to close at its next poll
    pub fn stop(&self, id: u64) {
        if let Some(handle) = self.inner.borrow().conns.get(&id) {
            handle.stop();
        }
    }

    /// Asks every connection to close; used on shutdown
    pub fn stop_all(&self) {
        for handle in self.inner.borrow().conns.values() {
            handle.stop();
        }
    }

    /// Called by a connection when it has closed
    pub fn remove(&self, id: u64) {
        self.inner.borrow_mut().conns.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().conns.len()
    }

    /// Enforces the persistence policy; runs once per second
    pub fn tick(&self) {
        let inner = self.inner.borrow();
        let now = Instant::now();
        let timeout = inner.persistence.idle_timeout;
        let max_requests = inner.persistence.max_keep_alive_requests;
        for handle in inner.conns.values() {
            if timeout != Duration::new(0, 0)
                && now.duration_since(handle.last_active.get()) >= timeout
            {
                debug!("connection {} idle for too long, stopping",
                       handle.id);
                handle.stop();
            } else if max_requests != 0
                && handle.served.get() >= max_requests
            {
                debug!("connection {} served {} requests, stopping",
                       handle.id, handle.served.get());
                handle.stop();
            }
        }
    }
}
