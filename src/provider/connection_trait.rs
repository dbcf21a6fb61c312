use crate::connection_error::ConnectionError;
use crate::stream::Connection;
use async_trait::async_trait;

/// Descriptive properties of a provider, used in logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProperties {
    pub name: String,
    /// Remote address the provider connects to, if it has a single one
    pub address: Option<String>,
}

impl ProviderProperties {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
        }
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// Source of live connections for a monitor
///
/// Implementations decide how connections are opened (dialed, accepted,
/// pooled); the monitor only calls these methods and never inspects the
/// connections beyond their stream interface.
#[async_trait]
pub trait ConnectionProvider: Send + Sync + std::fmt::Debug {
    /// Produce one live connection
    async fn get(&self) -> Result<Box<dyn Connection>, ConnectionError>;

    /// Take back a connection that has been forcibly invalidated
    ///
    /// Called at most once per connection handed out by [`get`](Self::get).
    fn invalidate(&self, connection: Box<dyn Connection>);

    /// Stop producing connections
    fn stop(&self) {}

    /// Properties describing this provider
    fn properties(&self) -> ProviderProperties;
}
