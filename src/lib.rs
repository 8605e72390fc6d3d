//! # Seqis
//!
//! Minimal Redis-style client for Rust with strict single-in-flight command
//! sequencing: commands drain through an ordered queue, exactly one is on
//! the wire at a time, and results come back to each command's completion
//! contract in submission order. Pub/sub subscriptions keep receiving
//! pushed messages on the same contract until the connection is torn down.
//!
//! The engine is reactive and never blocks: arbitrarily-chunked transport
//! bytes are buffered and parsed incrementally, and "not enough data yet"
//! is a returned value, not an await. A thin tokio layer translates socket
//! readiness into engine events.
//!
//! ## Example
//!
//! ```no_run
//! use seqis::Client;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> seqis::Result<()> {
//!     let mut client = Client::connect("redis://localhost:6379", Some("secret")).await?;
//!     client.get("key", Box::new(|success, key, value| {
//!         println!("{key}: success={success} value={value:?}");
//!     }));
//!     client.drive().await
//! }
//! ```

#![warn(missing_docs)]

pub mod core;
pub mod proto;

// Re-export the high-level types for convenience
pub use crate::core::builder::ClientBuilder;
pub use crate::core::command::{Command, CommandKind, ValueHandler, VoidHandler};
pub use crate::core::connection::{Connection, ConnectionState, Dispatch};
pub use crate::core::transport::{TcpTransport, Transport, TransportEvent};
pub use crate::core::Client;
pub use crate::proto::error::{Error, Result};
pub use crate::proto::parser::{Parser, Step};
pub use crate::proto::value::Value;
