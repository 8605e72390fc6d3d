//! Command queue and connection handling.
//!
//! ## Modules
//!
//! - [`connection`] - Single-slot connection state machine
//! - [`command`] - Command model, contracts, and wire encoding
//! - [`builder`] - Client configuration
//! - [`transport`] - Transport seam and the TCP adapter

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use bytes::Bytes;
use tracing::{debug, warn};

pub use crate::proto::error::{Error, Result};

/// Client configuration.
pub mod builder;
/// Command construction and encoding.
pub mod command;
/// Low-level connection management.
pub mod connection;
/// Transport seam between the engine and the event loop.
pub mod transport;

use command::{Command, ValueHandler, VoidHandler};
use connection::{Connection, ConnectionState, Dispatch};
use transport::{TcpTransport, Transport, TransportEvent};

/// Hook fired when the server rejects this client's authentication.
type AuthFailureHook = Rc<RefCell<Option<Box<dyn FnMut()>>>>;

/// Client for a key-value/pub-sub server, pumping an ordered command queue
/// through a single connection.
///
/// Exactly one command is in flight at a time; queued commands drain in
/// FIFO order, except that AUTH is injected at the front of the queue the
/// moment the connection becomes usable, ahead of anything already queued.
/// Results are delivered through each command's completion contract, in
/// submission order.
///
/// The client is reactive: it never blocks, and it makes progress when the
/// event loop feeds it transport readiness through
/// [`handle_event`](Client::handle_event). For TCP the
/// [`connect`](Client::connect)/[`drive`](Client::drive) pair does that
/// plumbing.
///
/// # Example
///
/// ```no_run
/// use seqis::Client;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> seqis::Result<()> {
///     let mut client = Client::connect("redis://127.0.0.1:6379", Some("secret")).await?;
///     client.set("greeting", "hello", Box::new(|success| assert!(success)));
///     client.get(
///         "greeting",
///         Box::new(|_, key, value| {
///             println!("{key}: {value:?}");
///         }),
///     );
///     client.drive().await
/// }
/// ```
pub struct Client<T: Transport> {
    connection: Connection<T>,
    backlog: VecDeque<Command>,
    password: Option<String>,
    auth_failed: Rc<Cell<bool>>,
    on_auth_failure: AuthFailureHook,
}

impl<T: Transport> Client<T> {
    /// Creates a client over `transport`. When `password` is set, AUTH is
    /// sent ahead of any queued command once the connection opens.
    pub fn new(transport: T, password: Option<String>) -> Self {
        Self {
            connection: Connection::new(transport),
            backlog: VecDeque::new(),
            password,
            auth_failed: Rc::new(Cell::new(false)),
            on_auth_failure: Rc::new(RefCell::new(None)),
        }
    }

    /// Registers a hook fired when the server rejects authentication.
    /// Rejection is reported, never fatal: the queue keeps pumping.
    pub fn on_auth_failure(&mut self, hook: impl FnMut() + 'static) {
        *self.on_auth_failure.borrow_mut() = Some(Box::new(hook));
    }

    /// True once the server has rejected this client's AUTH.
    pub fn auth_failed(&self) -> bool {
        self.auth_failed.get()
    }

    /// True while the connection is open and usable.
    pub fn is_connected(&self) -> bool {
        self.connection.state() == ConnectionState::Ready
    }

    /// Number of commands waiting to be sent.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// True when nothing is queued, in flight, or subscribed.
    pub fn is_idle(&self) -> bool {
        self.backlog.is_empty() && !self.connection.has_pending()
    }

    /// Appends `command` to the queue and pumps.
    pub fn enqueue(&mut self, command: Command) {
        self.backlog.push_back(command);
        self.pump();
    }

    /// Stores `value` under `key` (SET).
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Bytes>, handler: VoidHandler) {
        self.enqueue(Command::set(key, value, handler));
    }

    /// Fetches the value stored under `key` (GET).
    pub fn get(&mut self, key: impl Into<String>, handler: ValueHandler) {
        self.enqueue(Command::get(key, handler));
    }

    /// Publishes `message` to `channel` (PUBLISH).
    pub fn publish(
        &mut self,
        channel: impl Into<String>,
        message: impl Into<Bytes>,
        handler: ValueHandler,
    ) {
        self.enqueue(Command::publish(channel, message, handler));
    }

    /// Subscribes to `channel` (SUBSCRIBE). The handler receives the
    /// acknowledgment and then every pushed message. A subscription keeps
    /// the in-flight slot, so later queued commands wait until disconnect.
    pub fn subscribe(&mut self, channel: impl Into<String>, handler: ValueHandler) {
        self.enqueue(Command::subscribe(channel, handler));
    }

    /// Sends an arbitrary command by name with up to four extra arguments.
    pub fn generic(&mut self, name: impl Into<String>, args: &[&str], handler: ValueHandler) {
        self.enqueue(Command::generic(name, args, handler));
    }

    /// Asks the server to close the session (QUIT).
    pub fn quit(&mut self, handler: VoidHandler) {
        self.enqueue(Command::quit(handler));
    }

    /// Discards every queued (unsent) command, then queues QUIT. The
    /// in-flight command, if any, still completes normally first.
    pub fn skip_all_and_quit(&mut self, handler: VoidHandler) {
        if !self.backlog.is_empty() {
            debug!(
                discarded = self.backlog.len(),
                "discarding queued commands before quit"
            );
            self.backlog.clear();
        }
        self.quit(handler);
    }

    /// Tears the connection down: queued commands are discarded without
    /// their contracts running, and the in-flight command, if any, fails
    /// exactly once. Deliberate teardown, not a fault.
    pub fn disconnect(&mut self) {
        self.backlog.clear();
        self.connection.disconnect();
    }

    /// Feeds one transport readiness notification through the engine.
    ///
    /// Protocol and transport faults surface here exactly once; after a
    /// fault the client stops pumping until reconnected.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<()> {
        if event == TransportEvent::Opened {
            self.connection.handle_event(TransportEvent::Opened)?;
            self.inject_auth();
            self.pump();
            return Ok(());
        }
        let dispatches = self.connection.handle_event(event)?;
        for dispatch in dispatches {
            if dispatch == Dispatch::Finished {
                self.pump();
            }
        }
        Ok(())
    }

    /// Sends the head of the queue when connected and nothing is in flight.
    fn pump(&mut self) {
        if self.connection.state() != ConnectionState::Ready {
            return;
        }
        if self.connection.has_pending() {
            return;
        }
        let Some(command) = self.backlog.pop_front() else {
            return;
        };
        debug!(command = ?command.kind(), "pumping next command");
        if let Err(err) = self.connection.attach(command) {
            // the command's contract has already reported the failure;
            // the queue stays halted until reconnect
            warn!(error = %err, "send failed");
        }
    }

    /// Queues AUTH ahead of everything the caller already queued. Runs the
    /// moment the connection becomes usable.
    fn inject_auth(&mut self) {
        let Some(password) = self.password.clone() else {
            return;
        };
        let failed = Rc::clone(&self.auth_failed);
        let hook = Rc::clone(&self.on_auth_failure);
        let handler: VoidHandler = Box::new(move |success| {
            if success {
                return;
            }
            warn!("authentication rejected by server");
            failed.set(true);
            if let Some(hook) = hook.borrow_mut().as_mut() {
                hook();
            }
        });
        self.backlog.push_front(Command::auth(password, handler));
    }
}

impl Client<TcpTransport> {
    /// Opens a TCP connection to `addr` (`redis://host:port`, port 6379 by
    /// default) and returns a client ready to pump its queue.
    pub async fn connect(addr: &str, password: Option<&str>) -> Result<Self> {
        let stream = transport::open_tcp(addr).await?;
        let mut client = Client::new(TcpTransport::new(stream), password.map(str::to_owned));
        client.handle_event(TransportEvent::Opened)?;
        Ok(client)
    }

    /// Translates socket readiness into engine events until the connection
    /// closes (quit, peer EOF, disconnect) or the engine goes idle: queue
    /// drained, nothing in flight, no active subscription.
    ///
    /// Faults surface here exactly once, as the loop's error.
    pub async fn drive(&mut self) -> Result<()> {
        use tokio::io::Interest;

        loop {
            if self.connection.state() != ConnectionState::Ready {
                return Ok(());
            }
            if self.is_idle() && !self.connection.wants_write() {
                return Ok(());
            }
            let interest = if self.connection.wants_write() {
                Interest::READABLE | Interest::WRITABLE
            } else {
                Interest::READABLE
            };
            let ready = match self.connection.transport().stream() {
                Some(stream) => stream
                    .ready(interest)
                    .await
                    .map_err(|e| Error::Io { source: e })?,
                None => return Ok(()),
            };
            if ready.is_writable() {
                self.handle_event(TransportEvent::Writable)?;
            }
            if ready.is_readable() {
                self.handle_event(TransportEvent::Readable)?;
            }
        }
    }
}
