//! Configuration load lifecycle.
//!
//! `NotLoaded -> Loading -> Loaded`, with a failure edge back to the pre-call stage. The
//! transition API is deliberately narrow (`try_begin_load`, `complete_load`, `fail_load`) so
//! illegal states are unrepresentable from the outside.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadStage {
    NotLoaded,
    Loading,
    Loaded,
}

/// State machine guarding configuration loads.
///
/// The `ready` flag flips to true only after a fetch has fully populated the store, and is the
/// only gate evaluation reads check. It stays true across a forced reload (the previous
/// snapshot keeps being served) and rolls back to its pre-call value when a load fails.
#[derive(Debug)]
pub(crate) struct ConfigurationLifecycle {
    stage: Mutex<LoadStage>,
    ready: AtomicBool,
}

impl ConfigurationLifecycle {
    pub(crate) fn new() -> ConfigurationLifecycle {
        ConfigurationLifecycle {
            stage: Mutex::new(LoadStage::NotLoaded),
            ready: AtomicBool::new(false),
        }
    }

    /// Try to take ownership of a load, returning the pre-call stage when this call owns the
    /// fetch. Returns `None` when the load can be skipped: the configuration is already
    /// loaded (and `force` is false), or another call's fetch is in flight.
    pub(crate) fn try_begin_load(&self, force: bool) -> Option<LoadStage> {
        let mut stage = self
            .stage
            .lock()
            .expect("thread holding load stage lock should not panic");
        match *stage {
            LoadStage::Loaded if !force => None,
            LoadStage::Loading => None,
            prior => {
                *stage = LoadStage::Loading;
                Some(prior)
            }
        }
    }

    /// The fetch succeeded and the store holds the new snapshot.
    pub(crate) fn complete_load(&self) {
        let mut stage = self
            .stage
            .lock()
            .expect("thread holding load stage lock should not panic");
        *stage = LoadStage::Loaded;
        self.ready.store(true, Ordering::Release);
    }

    /// The fetch failed; roll back to the stage captured by `try_begin_load` so a later call
    /// may retry.
    pub(crate) fn fail_load(&self, prior: LoadStage) {
        let mut stage = self
            .stage
            .lock()
            .expect("thread holding load stage lock should not panic");
        *stage = prior;
        self.ready
            .store(prior == LoadStage::Loaded, Ordering::Release);
    }

    /// Cheap hot-path gate for evaluation reads.
    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
