use std::io;

use thiserror::Error;

/// Result type alias for seqis operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the protocol engine and the connection layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An IO error occurred on the transport.
    #[error("IO error: {source}")]
    Io {
        /// The underlying IO error.
        #[from]
        source: io::Error,
    },

    /// The peer sent bytes that do not form a valid protocol value.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the error.
        message: String,
    },

    /// Authentication was rejected by the server.
    #[error("authentication failed")]
    Auth,

    /// Work was deliberately torn down (disconnect), as opposed to failing.
    #[error("operation aborted")]
    Aborted,

    /// The connection is closed or the peer ended the stream.
    #[error("connection closed")]
    ConnectionClosed,

    /// Invalid argument provided by the caller.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },
}
