use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::proto::value::Value;

/// Upper bound on extra arguments accepted by [`Command::generic`].
pub const MAX_GENERIC_ARGS: usize = 4;

/// Contract invoked when a value-producing command completes, and again for
/// every pushed message routed to a subscription.
///
/// Arguments: success flag, the identifying key/channel/command name, and
/// the parsed value. The value is absent when the command failed before any
/// response arrived (disconnect, transport fault); an error reply is passed
/// through with the success flag cleared.
pub type ValueHandler = Box<dyn FnMut(bool, &str, Option<&Value>)>;

/// Contract invoked when a command that produces no caller-visible value
/// completes. Argument: success flag.
pub type VoidHandler = Box<dyn FnMut(bool)>;

enum Contract {
    Value(ValueHandler),
    Void(VoidHandler),
}

/// The operations a [`Command`] can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Fetch the value stored under a key.
    Get,
    /// Store a value under a key.
    Set,
    /// Authenticate the connection.
    Auth,
    /// Publish a message to a channel.
    Publish,
    /// Subscribe to a channel's pushed messages.
    Subscribe,
    /// Close the session server-side.
    Quit,
    /// Any other command, given by name with up to four extra arguments.
    Generic,
}

/// One outbound request: its kind, its parameters, its wire encoding, and
/// the completion contract its response is routed to.
///
/// A command is enqueued by the caller, marked sent once its bytes are
/// written, and bound to exactly one received value (or a failure) through
/// its contract. Every kind retires on its first response except
/// [`Subscribe`](CommandKind::Subscribe), which stays installed and has its
/// contract re-invoked for each subsequent pushed message.
pub struct Command {
    kind: CommandKind,
    name: String,
    payload: Option<Bytes>,
    extra_args: Vec<String>,
    contract: Contract,
    sent: bool,
}

impl Command {
    fn new(
        kind: CommandKind,
        name: String,
        payload: Option<Bytes>,
        extra_args: Vec<String>,
        contract: Contract,
    ) -> Self {
        Self {
            kind,
            name,
            payload,
            extra_args,
            contract,
            sent: false,
        }
    }

    /// Creates a GET command for `key`.
    pub fn get(key: impl Into<String>, handler: ValueHandler) -> Self {
        Self::new(
            CommandKind::Get,
            key.into(),
            None,
            Vec::new(),
            Contract::Value(handler),
        )
    }

    /// Creates a SET command storing `value` under `key`.
    pub fn set(key: impl Into<String>, value: impl Into<Bytes>, handler: VoidHandler) -> Self {
        Self::new(
            CommandKind::Set,
            key.into(),
            Some(value.into()),
            Vec::new(),
            Contract::Void(handler),
        )
    }

    /// Creates an AUTH command with `password`.
    pub fn auth(password: impl Into<String>, handler: VoidHandler) -> Self {
        Self::new(
            CommandKind::Auth,
            password.into(),
            None,
            Vec::new(),
            Contract::Void(handler),
        )
    }

    /// Creates a PUBLISH command sending `message` to `channel`.
    pub fn publish(
        channel: impl Into<String>,
        message: impl Into<Bytes>,
        handler: ValueHandler,
    ) -> Self {
        Self::new(
            CommandKind::Publish,
            channel.into(),
            Some(message.into()),
            Vec::new(),
            Contract::Value(handler),
        )
    }

    /// Creates a SUBSCRIBE command for `channel`. The handler receives the
    /// subscription acknowledgment and then every pushed message, in
    /// arrival order, until the connection is torn down.
    pub fn subscribe(channel: impl Into<String>, handler: ValueHandler) -> Self {
        Self::new(
            CommandKind::Subscribe,
            channel.into(),
            None,
            Vec::new(),
            Contract::Value(handler),
        )
    }

    /// Creates a QUIT command.
    pub fn quit(handler: VoidHandler) -> Self {
        Self::new(
            CommandKind::Quit,
            String::new(),
            None,
            Vec::new(),
            Contract::Void(handler),
        )
    }

    /// Creates a command by name with up to [`MAX_GENERIC_ARGS`] extra
    /// arguments. Exceeding the limit is a programming error.
    pub fn generic(name: impl Into<String>, args: &[&str], handler: ValueHandler) -> Self {
        assert!(
            args.len() <= MAX_GENERIC_ARGS,
            "generic commands accept at most {MAX_GENERIC_ARGS} extra arguments"
        );
        Self::new(
            CommandKind::Generic,
            name.into(),
            None,
            args.iter().map(|arg| arg.to_string()).collect(),
            Contract::Value(handler),
        )
    }

    /// The operation this command performs.
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// True once the command's bytes have been handed to the transport.
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub(crate) fn mark_sent(&mut self) {
        self.sent = true;
    }

    /// Subscriptions stay installed after their first response; every other
    /// kind retires on it.
    pub fn finishes_on_first_response(&self) -> bool {
        self.kind != CommandKind::Subscribe
    }

    /// Serializes the command as an array of bulk strings:
    /// `*<argc>\r\n` then `$<len>\r\n<bytes>\r\n` per argument. Arguments
    /// are length-prefixed, so payloads are binary-safe.
    pub fn encode(&self) -> Bytes {
        let mut args: Vec<&[u8]> = Vec::new();
        match self.kind {
            CommandKind::Get => {
                args.push(b"GET");
                args.push(self.name.as_bytes());
            }
            CommandKind::Set => {
                args.push(b"SET");
                args.push(self.name.as_bytes());
                args.push(self.payload.as_deref().unwrap_or_default());
            }
            CommandKind::Auth => {
                args.push(b"AUTH");
                args.push(self.name.as_bytes());
            }
            CommandKind::Publish => {
                args.push(b"PUBLISH");
                args.push(self.name.as_bytes());
                args.push(self.payload.as_deref().unwrap_or_default());
            }
            CommandKind::Subscribe => {
                args.push(b"SUBSCRIBE");
                args.push(self.name.as_bytes());
            }
            CommandKind::Quit => {
                args.push(b"QUIT");
            }
            CommandKind::Generic => {
                args.push(self.name.as_bytes());
                for arg in &self.extra_args {
                    args.push(arg.as_bytes());
                }
            }
        }

        let mut buf = BytesMut::new();
        buf.put_u8(b'*');
        buf.extend_from_slice(args.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        for arg in args {
            buf.put_u8(b'$');
            buf.extend_from_slice(arg.len().to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
            buf.extend_from_slice(arg);
            buf.extend_from_slice(b"\r\n");
        }
        buf.freeze()
    }

    /// Routes a received value to the completion contract. An error reply
    /// reports success=false; every other variant reports success=true.
    pub(crate) fn respond(&mut self, value: &Value) {
        let success = !value.is_error();
        match &mut self.contract {
            Contract::Value(handler) => handler(success, &self.name, Some(value)),
            Contract::Void(handler) => handler(success),
        }
    }

    /// Reports failure before any response arrived (disconnect, fault).
    pub(crate) fn fail(&mut self) {
        match &mut self.contract {
            Contract::Value(handler) => handler(false, &self.name, None),
            Contract::Void(handler) => handler(false),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("sent", &self.sent)
            .finish()
    }
}
