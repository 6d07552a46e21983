use crate::{
    assignment_cache::{AssignmentCache, InMemoryAssignmentCache},
    assignment_logger::{AssignmentLogger, NoopAssignmentLogger},
    Client,
};

/// Configuration for [`Client`].
///
/// # Examples
/// ```
/// # use flaglet::{ClientConfig, assignment_logger::AssignmentEvent};
/// let config = ClientConfig::new("sdk-key", "https://flags.example.com")
///     .assignment_logger(|event: AssignmentEvent| println!("{:?}", event));
/// ```
pub struct ClientConfig {
    pub(crate) sdk_key: String,
    pub(crate) host: String,
    pub(crate) is_obfuscated: bool,
    pub(crate) assignment_logger: Box<dyn AssignmentLogger + Send + Sync>,
    pub(crate) assignment_cache: Option<Box<dyn AssignmentCache>>,
}

impl ClientConfig {
    /// Create a default configuration using the specified SDK key and host.
    ///
    /// Assignment deduplication is on by default (an in-memory cache); the assignment logger
    /// defaults to a no-op.
    pub fn new(sdk_key: impl Into<String>, host: impl Into<String>) -> ClientConfig {
        ClientConfig {
            sdk_key: sdk_key.into(),
            host: host.into(),
            is_obfuscated: false,
            assignment_logger: Box::new(NoopAssignmentLogger),
            assignment_cache: Some(Box::new(InMemoryAssignmentCache::new())),
        }
    }

    /// Set assignment logger to pass variation assignments to your data warehouse.
    pub fn assignment_logger(
        mut self,
        assignment_logger: impl AssignmentLogger + Send + Sync + 'static,
    ) -> ClientConfig {
        self.assignment_logger = Box::new(assignment_logger);
        self
    }

    /// Replace the assignment deduplication cache.
    pub fn assignment_cache(mut self, cache: impl AssignmentCache + 'static) -> ClientConfig {
        self.assignment_cache = Some(Box::new(cache));
        self
    }

    /// Disable assignment deduplication. Every qualifying evaluation is then logged
    /// unconditionally.
    pub fn no_assignment_cache(mut self) -> ClientConfig {
        self.assignment_cache = None;
        self
    }

    /// Mark the configuration as served in obfuscated form. Flag keys, attribute names, and
    /// rule values are then translated through the same digests on lookup.
    pub fn obfuscated(mut self, obfuscated: bool) -> ClientConfig {
        self.is_obfuscated = obfuscated;
        self
    }

    /// Create a new [`Client`] using this configuration.
    pub fn to_client(self) -> Client {
        Client::new(self)
    }
}
