//! A thread-safe in-memory storage for the currently active configuration.
//! [`ConfigurationStore`] provides concurrent access for readers (flag evaluation) and writers
//! (configuration loads).

use std::sync::{Arc, RwLock};

use crate::{configuration_fetcher::ConfigurationProvider, flags::FlagsConfiguration, Result};

/// `ConfigurationStore` provides a thread-safe (`Sync`) storage for flag configuration that
/// allows concurrent access for readers and writers.
///
/// The configuration itself is always immutable and can only be replaced completely: readers
/// see either the old or the new snapshot in full, never a partial one.
#[derive(Default)]
pub struct ConfigurationStore {
    configuration: RwLock<Option<Arc<FlagsConfiguration>>>,
}

impl ConfigurationStore {
    /// Create a new empty configuration store.
    pub fn new() -> ConfigurationStore {
        ConfigurationStore::default()
    }

    /// Get the currently-active configuration snapshot. Returns `None` if configuration
    /// hasn't been fetched/stored yet.
    pub fn get_configuration(&self) -> Option<Arc<FlagsConfiguration>> {
        // self.configuration.read() should always return Ok(). Err() is possible only if the
        // lock is poisoned (writer panicked while holding the lock), which should never
        // happen. Still, using .ok()? here to not crash the app.
        let configuration = self.configuration.read().ok()?;
        configuration.clone()
    }

    /// Replace the current snapshot, returning the previous one.
    pub fn set_configuration(&self, configuration: FlagsConfiguration) -> Option<Arc<FlagsConfiguration>> {
        // Constructing new value before requesting the lock to minimize lock span.
        let new_value = Some(Arc::new(configuration));

        let mut configuration_slot = self.configuration.write().ok()?;
        std::mem::replace(&mut configuration_slot, new_value)
    }

    /// Fetch a fresh snapshot from `provider` and atomically replace the current one on
    /// success. On failure the error is propagated and the previous snapshot (if any) remains
    /// queryable.
    pub fn fetch_and_store(&self, provider: &dyn ConfigurationProvider) -> Result<()> {
        let configuration = provider.fetch_configuration()?;
        self.set_configuration(configuration);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        configuration_fetcher::ConfigurationProvider, flags::FlagsConfiguration, Error, Result,
    };

    use super::ConfigurationStore;

    struct FailingProvider;
    impl ConfigurationProvider for FailingProvider {
        fn fetch_configuration(&self) -> Result<FlagsConfiguration> {
            Err(Error::Unauthorized)
        }
    }

    #[test]
    fn can_set_configuration_from_another_thread() {
        let store = Arc::new(ConfigurationStore::new());

        assert!(store.get_configuration().is_none());

        {
            let store = store.clone();
            let _ = std::thread::spawn(move || {
                store.set_configuration(FlagsConfiguration::default());
            })
            .join();
        }

        assert!(store.get_configuration().is_some());
    }

    #[test]
    fn failed_fetch_leaves_previous_snapshot_intact() {
        let store = ConfigurationStore::new();
        store.set_configuration(FlagsConfiguration::default());

        assert!(store.fetch_and_store(&FailingProvider).is_err());
        assert!(store.get_configuration().is_some());
    }
}
