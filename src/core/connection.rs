use std::io;

use bytes::BytesMut;
use tracing::{debug, error, warn};

use crate::core::command::Command;
use crate::core::transport::{Transport, TransportEvent};
use crate::proto::error::{Error, Result};
use crate::proto::parser::{Parser, Step};
use crate::proto::value::Value;

/// How much to pull from the transport per read call while draining.
const READ_CHUNK: usize = 4096;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; commands cannot be sent.
    Closed,
    /// Open and usable.
    Ready,
    /// A protocol or transport fault occurred; unusable until reconnected.
    Error,
}

/// What became of one parsed value routed through the pending slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The pending command received its response and was retired.
    Finished,
    /// The value was delivered to the installed subscription, which stays.
    Delivered,
    /// No command was pending; the value was dropped.
    Ignored,
}

/// Binds a transport to the parser and at most one in-flight [`Command`].
///
/// The connection is entirely reactive: the event loop owning the transport
/// feeds readiness notifications through
/// [`handle_event`](Connection::handle_event), and every consequence (bytes
/// drained, values parsed, contracts invoked) happens inside that call.
/// Dispatch outcomes are returned as values so the queue layer above decides
/// what to send next; the connection never calls back into it.
pub struct Connection<T: Transport> {
    transport: T,
    state: ConnectionState,
    parser: Parser,
    pending: Option<Command>,
    outbox: BytesMut,
}

impl<T: Transport> Connection<T> {
    /// Creates a closed connection over `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: ConnectionState::Closed,
            parser: Parser::new(),
            pending: None,
            outbox: BytesMut::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while a command occupies the single in-flight slot.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// True while there are encoded bytes the transport has not accepted.
    pub fn wants_write(&self) -> bool {
        !self.outbox.is_empty() || self.pending.as_ref().is_some_and(|cmd| !cmd.is_sent())
    }

    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Installs `command` in the pending slot and sends it if the transport
    /// currently accepts writes.
    ///
    /// Attaching while another command is pending is a programming error.
    pub fn attach(&mut self, command: Command) -> Result<()> {
        assert!(
            self.pending.is_none(),
            "a command is already pending on this connection"
        );
        self.pending = Some(command);
        self.try_send()
    }

    /// Feeds one readiness notification through the state machine,
    /// reporting every command completion it caused.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<Vec<Dispatch>> {
        match event {
            TransportEvent::Opened => {
                debug!("connection opened");
                self.state = ConnectionState::Ready;
                Ok(Vec::new())
            }
            TransportEvent::Writable => {
                self.try_send()?;
                Ok(Vec::new())
            }
            TransportEvent::Readable => self.handle_readable(),
            TransportEvent::Eof => {
                debug!("peer ended the stream");
                self.state = ConnectionState::Closed;
                if let Some(mut cmd) = self.pending.take() {
                    cmd.fail();
                }
                Ok(Vec::new())
            }
            TransportEvent::Failed => Err(self.fault(Error::ConnectionClosed)),
        }
    }

    /// Deliberate teardown from any state: closes the transport, aborts the
    /// parser, and fails the pending command, if any, exactly once. Not a
    /// fault and never reported as one.
    pub fn disconnect(&mut self) {
        self.parser.abort();
        self.outbox.clear();
        self.transport.close();
        self.state = ConnectionState::Closed;
        if let Some(mut cmd) = self.pending.take() {
            cmd.fail();
        }
    }

    /// Encodes the pending command exactly once, then flushes whatever the
    /// transport accepts right now; the rest stays in the outbox for the
    /// next writable notification.
    fn try_send(&mut self) -> Result<()> {
        if self.state == ConnectionState::Ready {
            if let Some(cmd) = &mut self.pending {
                if !cmd.is_sent() {
                    let encoded = cmd.encode();
                    debug!(command = ?cmd.kind(), bytes = encoded.len(), "sending command");
                    cmd.mark_sent();
                    self.outbox.extend_from_slice(&encoded);
                }
            }
        }
        self.flush_outbox()
    }

    fn flush_outbox(&mut self) -> Result<()> {
        while !self.outbox.is_empty() {
            match self.transport.try_write(&self.outbox) {
                Ok(0) => return Err(self.fault(Error::ConnectionClosed)),
                Ok(n) => {
                    let _ = self.outbox.split_to(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(self.fault(Error::Io { source: e })),
            }
        }
        Ok(())
    }

    /// Drains all currently available transport bytes, then drives the
    /// parser until it runs out; each complete value is dispatched to the
    /// pending command.
    fn handle_readable(&mut self) -> Result<Vec<Dispatch>> {
        if self.state != ConnectionState::Ready {
            warn!(state = ?self.state, "readable notification while not ready");
            return Ok(Vec::new());
        }

        let mut buf = [0u8; READ_CHUNK];
        let mut saw_eof = false;
        loop {
            match self.transport.try_read(&mut buf) {
                Ok(0) => {
                    saw_eof = true;
                    break;
                }
                Ok(n) => self.parser.feed(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(self.fault(Error::Io { source: e })),
            }
        }

        let mut dispatches = Vec::new();
        loop {
            match self.parser.advance() {
                Ok(Step::Complete(value)) => dispatches.push(self.dispatch(value)),
                Ok(Step::Incomplete) => break,
                Err(err) => return Err(self.fault(err)),
            }
        }

        if saw_eof {
            debug!("peer ended the stream");
            self.state = ConnectionState::Closed;
            if let Some(mut cmd) = self.pending.take() {
                cmd.fail();
            }
        }
        Ok(dispatches)
    }

    /// Routes one complete value to the pending command. A command that
    /// finishes on its first response leaves the slot before its contract
    /// runs, so the contract observes a connection that can take the next
    /// command; a subscription stays installed for further pushes.
    fn dispatch(&mut self, value: Value) -> Dispatch {
        match self.pending.take() {
            Some(mut cmd) if cmd.finishes_on_first_response() => {
                debug!(command = ?cmd.kind(), "response received");
                cmd.respond(&value);
                Dispatch::Finished
            }
            Some(mut cmd) => {
                debug!(command = ?cmd.kind(), "push delivered to subscription");
                cmd.respond(&value);
                self.pending = Some(cmd);
                Dispatch::Delivered
            }
            None => {
                warn!(?value, "value received with no command pending");
                Dispatch::Ignored
            }
        }
    }

    /// Records a fault: the connection becomes error-visible and the
    /// in-flight command, if any, is failed.
    fn fault(&mut self, err: Error) -> Error {
        error!(error = %err, "connection fault");
        self.state = ConnectionState::Error;
        if let Some(mut cmd) = self.pending.take() {
            cmd.fail();
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use bytes::Bytes;

    use super::*;
    use crate::core::command::{ValueHandler, VoidHandler};
    use crate::core::transport::mock::MockTransport;

    fn ready_connection() -> Connection<MockTransport> {
        let mut conn = Connection::new(MockTransport::new());
        conn.handle_event(TransportEvent::Opened).unwrap();
        conn
    }

    fn noop_value() -> ValueHandler {
        Box::new(|_, _, _| {})
    }

    fn noop_void() -> VoidHandler {
        Box::new(|_| {})
    }

    #[test]
    fn test_attach_sends_once() {
        let mut conn = ready_connection();
        conn.attach(Command::get("k", noop_value())).unwrap();
        assert_eq!(conn.transport().written, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");

        // further writable notifications must not resend
        conn.handle_event(TransportEvent::Writable).unwrap();
        assert_eq!(conn.transport().written, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
        assert!(!conn.wants_write());
    }

    #[test]
    fn test_attach_while_closed_defers_send() {
        let mut conn = Connection::new(MockTransport::new());
        conn.attach(Command::get("k", noop_value())).unwrap();
        assert!(conn.transport().written.is_empty());

        conn.handle_event(TransportEvent::Opened).unwrap();
        conn.handle_event(TransportEvent::Writable).unwrap();
        assert_eq!(conn.transport().written, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
    }

    #[test]
    #[should_panic(expected = "already pending")]
    fn test_attach_twice_is_a_programming_error() {
        let mut conn = ready_connection();
        conn.attach(Command::get("a", noop_value())).unwrap();
        conn.attach(Command::get("b", noop_value())).unwrap();
    }

    #[test]
    fn test_partial_writes_deliver_the_full_encoding_once() {
        let mut conn = ready_connection();
        conn.transport_mut().write_limit = Some(1);
        conn.attach(Command::set("k", Bytes::from("v"), noop_void()))
            .unwrap();
        while conn.wants_write() {
            conn.handle_event(TransportEvent::Writable).unwrap();
        }
        assert_eq!(
            conn.transport().written,
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n"
        );
    }

    #[test]
    fn test_response_retires_pending_command() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let mut conn = ready_connection();
        conn.attach(Command::get(
            "k",
            Box::new(move |success, key, value| {
                log.borrow_mut()
                    .push((success, key.to_string(), value.cloned()));
            }),
        ))
        .unwrap();

        conn.transport_mut().push_incoming(b"$5\r\nhello\r\n");
        let dispatches = conn.handle_event(TransportEvent::Readable).unwrap();
        assert_eq!(dispatches, vec![Dispatch::Finished]);
        assert!(!conn.has_pending());
        assert_eq!(
            seen.borrow().as_slice(),
            &[(
                true,
                "k".to_string(),
                Some(Value::BulkString(Some(Bytes::from("hello"))))
            )]
        );
    }

    #[test]
    fn test_error_reply_reports_failure_but_is_not_a_fault() {
        let successes = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&successes);
        let mut conn = ready_connection();
        conn.attach(Command::get(
            "k",
            Box::new(move |success, _, _| log.borrow_mut().push(success)),
        ))
        .unwrap();

        conn.transport_mut().push_incoming(b"-ERR no such key\r\n");
        let dispatches = conn.handle_event(TransportEvent::Readable).unwrap();
        assert_eq!(dispatches, vec![Dispatch::Finished]);
        assert_eq!(conn.state(), ConnectionState::Ready);
        assert_eq!(successes.borrow().as_slice(), &[false]);
    }

    #[test]
    fn test_subscription_stays_installed_across_pushes() {
        let count = Rc::new(Cell::new(0));
        let calls = Rc::clone(&count);
        let mut conn = ready_connection();
        conn.attach(Command::subscribe(
            "news",
            Box::new(move |_, _, _| calls.set(calls.get() + 1)),
        ))
        .unwrap();

        conn.transport_mut()
            .push_incoming(b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n");
        let dispatches = conn.handle_event(TransportEvent::Readable).unwrap();
        assert_eq!(dispatches, vec![Dispatch::Delivered]);
        assert!(conn.has_pending());

        conn.transport_mut()
            .push_incoming(b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$2\r\nhi\r\n");
        let dispatches = conn.handle_event(TransportEvent::Readable).unwrap();
        assert_eq!(dispatches, vec![Dispatch::Delivered]);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_multiple_values_in_one_notification() {
        let count = Rc::new(Cell::new(0));
        let calls = Rc::clone(&count);
        let mut conn = ready_connection();
        conn.attach(Command::subscribe(
            "news",
            Box::new(move |_, _, _| calls.set(calls.get() + 1)),
        ))
        .unwrap();

        // ack and a push coalesced into a single chunk
        conn.transport_mut().push_incoming(
            b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$2\r\nhi\r\n",
        );
        let dispatches = conn.handle_event(TransportEvent::Readable).unwrap();
        assert_eq!(dispatches, vec![Dispatch::Delivered, Dispatch::Delivered]);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_value_with_no_pending_command_is_dropped() {
        let mut conn = ready_connection();
        conn.transport_mut().push_incoming(b"+stray\r\n");
        let dispatches = conn.handle_event(TransportEvent::Readable).unwrap();
        assert_eq!(dispatches, vec![Dispatch::Ignored]);
    }

    #[test]
    fn test_protocol_fault_fails_pending_and_errors_connection() {
        let failures = Rc::new(Cell::new(0));
        let calls = Rc::clone(&failures);
        let mut conn = ready_connection();
        conn.attach(Command::get(
            "k",
            Box::new(move |success, _, value| {
                assert!(!success);
                assert!(value.is_none());
                calls.set(calls.get() + 1);
            }),
        ))
        .unwrap();

        conn.transport_mut().push_incoming(b"!bogus\r\n");
        let err = conn.handle_event(TransportEvent::Readable).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert_eq!(conn.state(), ConnectionState::Error);
        assert!(!conn.has_pending());
        assert_eq!(failures.get(), 1);
    }

    #[test]
    fn test_eof_fails_pending_command() {
        let failures = Rc::new(Cell::new(0));
        let calls = Rc::clone(&failures);
        let mut conn = ready_connection();
        conn.attach(Command::get(
            "k",
            Box::new(move |success, _, _| {
                assert!(!success);
                calls.set(calls.get() + 1);
            }),
        ))
        .unwrap();

        conn.transport_mut().push_eof();
        conn.handle_event(TransportEvent::Readable).unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(failures.get(), 1);
    }

    #[test]
    fn test_disconnect_fails_pending_exactly_once() {
        let failures = Rc::new(Cell::new(0));
        let calls = Rc::clone(&failures);
        let mut conn = ready_connection();
        conn.attach(Command::get(
            "k",
            Box::new(move |_, _, _| calls.set(calls.get() + 1)),
        ))
        .unwrap();

        // tear down mid-parse: a partial value is buffered
        conn.transport_mut().push_incoming(b"$10\r\npart");
        conn.handle_event(TransportEvent::Readable).unwrap();
        conn.disconnect();
        conn.disconnect();

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.transport().closed);
        assert_eq!(failures.get(), 1);
    }
}
