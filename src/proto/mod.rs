//! Wire protocol engine: incremental buffering, value parsing, and errors.
//!
//! Everything here is synchronous and reactive. "Not enough data yet" is a
//! returned value, never a blocked call; the connection layer re-drives the
//! parser whenever the transport delivers more bytes.
//!
//! ## Modules
//!
//! - [`buffer`] - Incremental byte buffer with take-or-wait semantics
//! - [`value`] - Typed protocol values and their wire encoding
//! - [`parser`] - Streaming response parser
//! - [`error`] - Error types

pub mod buffer;
/// Error types.
pub mod error;
pub mod parser;
pub mod value;

pub use buffer::ByteBuffer;
pub use error::{Error, Result};
pub use parser::{Parser, Step};
pub use value::Value;
