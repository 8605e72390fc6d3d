use bytes::Bytes;

use crate::proto::buffer::ByteBuffer;
use crate::proto::error::{Error, Result};
use crate::proto::value::Value;

/// Outcome of a single [`Parser::advance`] attempt.
#[derive(Debug, PartialEq)]
pub enum Step {
    /// One complete value was parsed; the parser is immediately ready for
    /// the next one.
    Complete(Value),
    /// Not enough buffered bytes; feed more and call `advance` again.
    Incomplete,
}

/// Which CRLF-terminated line a frame is collecting.
#[derive(Debug, Clone, Copy)]
enum LineKind {
    Integer,
    Simple,
    Error,
}

/// One in-progress value on the parse stack.
#[derive(Debug)]
enum Frame {
    AwaitingType,
    AwaitingBulkSize,
    AwaitingBulkData { len: usize },
    AwaitingLine { kind: LineKind },
    AwaitingArrayCount,
    CollectingArray { remaining: usize, items: Vec<Value> },
}

/// What stepping one frame produced.
enum Advanced {
    /// The frame finished a whole value.
    Done(Value),
    /// Not enough bytes; resume from this frame later.
    Starved(Frame),
    /// The frame transitioned; keep driving.
    Next(Frame),
}

/// Streaming parser for protocol values.
///
/// Incoming bytes are appended with [`feed`](Parser::feed);
/// [`advance`](Parser::advance) then either yields a complete [`Value`],
/// reports that more bytes are needed, or fails with a protocol error.
/// Nested arrays are handled with an explicit stack of in-progress frames
/// over the one buffer, so aborting is a stack truncation rather than a
/// recursive teardown.
///
/// # Example
///
/// ```
/// use seqis::proto::parser::{Parser, Step};
/// use seqis::proto::value::Value;
///
/// let mut parser = Parser::new();
/// parser.feed(b"+OK\r\n");
/// let step = parser.advance().unwrap();
/// assert_eq!(step, Step::Complete(Value::SimpleString("OK".to_string())));
/// ```
#[derive(Debug, Default)]
pub struct Parser {
    buf: ByteBuffer,
    stack: Vec<Frame>,
}

impl Parser {
    /// Creates a parser with an empty buffer, ready for a fresh value.
    pub fn new() -> Self {
        Self {
            buf: ByteBuffer::new(),
            stack: Vec::new(),
        }
    }

    /// Appends bytes received from the transport.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.store(data);
    }

    /// True when no value is under construction.
    pub fn is_idle(&self) -> bool {
        self.stack.is_empty()
    }

    /// Attempts to make progress on the value under construction.
    ///
    /// Returns [`Step::Complete`] when a whole value (including every
    /// element of a nested array) has been assembled, [`Step::Incomplete`]
    /// when the buffered bytes run out mid-value — all progress is kept and
    /// the call can be repeated verbatim after more bytes arrive — or a
    /// protocol error for malformed input. A protocol error resets the
    /// value under construction; buffered bytes are left alone.
    pub fn advance(&mut self) -> Result<Step> {
        if self.stack.is_empty() {
            self.stack.push(Frame::AwaitingType);
        }
        loop {
            let frame = match self.stack.pop() {
                Some(frame) => frame,
                None => {
                    self.stack.push(Frame::AwaitingType);
                    continue;
                }
            };
            let frame = match frame {
                Frame::CollectingArray { remaining, items } => {
                    // waiting on a child value: descend into a fresh frame
                    self.stack.push(Frame::CollectingArray { remaining, items });
                    self.stack.push(Frame::AwaitingType);
                    continue;
                }
                frame => frame,
            };
            match self.step(frame)? {
                Advanced::Starved(frame) => {
                    self.stack.push(frame);
                    return Ok(Step::Incomplete);
                }
                Advanced::Next(frame) => self.stack.push(frame),
                Advanced::Done(value) => {
                    if let Some(value) = self.complete(value) {
                        return Ok(Step::Complete(value));
                    }
                }
            }
        }
    }

    /// Discards the value under construction and everything buffered.
    ///
    /// Deliberate teardown: not an error and never reported as one. The
    /// parser is immediately ready to parse a fresh value.
    pub fn abort(&mut self) {
        self.stack.clear();
        self.buf.clear();
    }

    fn step(&mut self, frame: Frame) -> Result<Advanced> {
        match frame {
            Frame::AwaitingType => {
                let byte = match self.buf.take(1) {
                    Some(data) => data[0],
                    None => return Ok(Advanced::Starved(Frame::AwaitingType)),
                };
                match byte {
                    b'$' => Ok(Advanced::Next(Frame::AwaitingBulkSize)),
                    b':' => Ok(Advanced::Next(Frame::AwaitingLine {
                        kind: LineKind::Integer,
                    })),
                    b'+' => Ok(Advanced::Next(Frame::AwaitingLine {
                        kind: LineKind::Simple,
                    })),
                    b'-' => Ok(Advanced::Next(Frame::AwaitingLine {
                        kind: LineKind::Error,
                    })),
                    b'*' => Ok(Advanced::Next(Frame::AwaitingArrayCount)),
                    other => Err(self.fail(format!(
                        "unexpected type byte: 0x{other:02x} ({:?})",
                        other as char
                    ))),
                }
            }
            Frame::AwaitingBulkSize => {
                let line = match self.buf.take_until_crlf() {
                    Some(line) => line,
                    None => return Ok(Advanced::Starved(Frame::AwaitingBulkSize)),
                };
                let len = self.parse_decimal(&line, "bulk string length")?;
                if len == -1 {
                    return Ok(Advanced::Done(Value::BulkString(None)));
                }
                if len < 0 {
                    return Err(self.fail(format!("negative bulk string length: {len}")));
                }
                Ok(Advanced::Next(Frame::AwaitingBulkData { len: len as usize }))
            }
            Frame::AwaitingBulkData { len } => {
                let data = match self.buf.take(len) {
                    Some(data) => data,
                    None => return Ok(Advanced::Starved(Frame::AwaitingBulkData { len })),
                };
                match self.buf.take(2) {
                    Some(delim) if &delim[..] == b"\r\n" => {
                        Ok(Advanced::Done(Value::BulkString(Some(data))))
                    }
                    Some(_) => Err(self.fail("bulk string payload not followed by CRLF")),
                    None => {
                        // the payload arrived but its CRLF has not: put the
                        // payload back so nothing is lost, retry later
                        self.buf.restore(data);
                        Ok(Advanced::Starved(Frame::AwaitingBulkData { len }))
                    }
                }
            }
            Frame::AwaitingLine { kind } => {
                let line = match self.buf.take_until_crlf() {
                    Some(line) => line,
                    None => return Ok(Advanced::Starved(Frame::AwaitingLine { kind })),
                };
                let text = match String::from_utf8(line.to_vec()) {
                    Ok(text) => text,
                    Err(_) => return Err(self.fail("line is not valid UTF-8")),
                };
                match kind {
                    LineKind::Integer => match text.parse::<i64>() {
                        Ok(n) => Ok(Advanced::Done(Value::Integer(n))),
                        Err(_) => {
                            Err(self.fail(format!("expected integer, received {text:?}")))
                        }
                    },
                    LineKind::Simple => Ok(Advanced::Done(Value::SimpleString(text))),
                    LineKind::Error => Ok(Advanced::Done(Value::Error(text))),
                }
            }
            Frame::AwaitingArrayCount => {
                let line = match self.buf.take_until_crlf() {
                    Some(line) => line,
                    None => return Ok(Advanced::Starved(Frame::AwaitingArrayCount)),
                };
                let count = self.parse_decimal(&line, "array element count")?;
                if count == -1 {
                    return Ok(Advanced::Done(Value::Array(None)));
                }
                if count < 0 {
                    return Err(self.fail(format!("negative array element count: {count}")));
                }
                if count == 0 {
                    return Ok(Advanced::Done(Value::Array(Some(Vec::new()))));
                }
                let count = count as usize;
                Ok(Advanced::Next(Frame::CollectingArray {
                    remaining: count,
                    items: Vec::with_capacity(count.min(64)),
                }))
            }
            Frame::CollectingArray { .. } => {
                // handled in `advance` before stepping; a collector is only
                // ever driven through its child frames
                Ok(Advanced::Next(frame))
            }
        }
    }

    /// Folds a finished value into the enclosing array collector, if any.
    /// Returns the value once it has no parent, i.e. a top-level value is
    /// complete.
    fn complete(&mut self, value: Value) -> Option<Value> {
        let mut value = value;
        loop {
            match self.stack.pop() {
                None => return Some(value),
                Some(Frame::CollectingArray { remaining, mut items }) => {
                    items.push(value);
                    if remaining == 1 {
                        // this array is done; keep folding into its parent
                        value = Value::Array(Some(items));
                    } else {
                        self.stack.push(Frame::CollectingArray {
                            remaining: remaining - 1,
                            items,
                        });
                        return None;
                    }
                }
                Some(_) => unreachable!("only array collectors own child values"),
            }
        }
    }

    fn parse_decimal(&mut self, line: &Bytes, what: &str) -> Result<i64> {
        let text = match std::str::from_utf8(line) {
            Ok(text) => text,
            Err(_) => return Err(self.fail(format!("{what} is not valid UTF-8"))),
        };
        match text.parse::<i64>() {
            Ok(n) => Ok(n),
            Err(_) => Err(self.fail(format!("expected {what}, received {text:?}"))),
        }
    }

    /// Records a protocol error: the value under construction is discarded
    /// so a later caller could start clean; buffered bytes are left alone.
    fn fail(&mut self, message: impl Into<String>) -> Error {
        self.stack.clear();
        Error::Protocol {
            message: message.into(),
        }
    }
}
