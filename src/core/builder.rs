use crate::core::transport::{TcpTransport, Transport};
use crate::core::Client;
use crate::proto::error::Result;

/// Builder for configuring and creating a [`Client`].
///
/// # Example
///
/// ```no_run
/// use seqis::ClientBuilder;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> seqis::Result<()> {
/// let client = ClientBuilder::new()
///     .address("redis://localhost:6379")
///     .password("secret")
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ClientBuilder {
    address: Option<String>,
    password: Option<String>,
}

impl ClientBuilder {
    /// Creates a new [`ClientBuilder`] instance.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server address, in the format `redis://host:port`.
    #[inline]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Sets the password sent as AUTH ahead of any queued command.
    #[inline]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Builds a client over an already-open transport. The caller's event
    /// loop is responsible for delivering readiness events, starting with
    /// the open notification.
    pub fn build<T: Transport>(self, transport: T) -> Client<T> {
        Client::new(transport, self.password)
    }

    /// Opens a TCP connection to the configured address (defaulting to
    /// `redis://127.0.0.1:6379`) and returns a connected client.
    pub async fn connect(self) -> Result<Client<TcpTransport>> {
        let ClientBuilder { address, password } = self;
        let address = address.unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());
        Client::connect(&address, password.as_deref()).await
    }
}
