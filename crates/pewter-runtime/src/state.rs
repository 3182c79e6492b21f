//! Persistence of the activated plugin set.
//!
//! The runtime only needs an ordered list of names: it replays the list
//! through `activate` at startup and writes it back after every successful
//! administrative change and at shutdown. Where the list lives is up to the
//! embedding application.

use parking_lot::Mutex;
use thiserror::Error;
use pewter_framework::BoxError;

/// Errors reported by a [`StateStore`].
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to load activation state: {0}")]
    Load(#[source] BoxError),

    #[error("Failed to save activation state: {0}")]
    Save(#[source] BoxError),
}

/// Stores which plugins are activated, in activation order.
pub trait StateStore: Send + Sync {
    fn load_active(&self) -> Result<Vec<String>, StateError>;

    fn save_active(&self, names: &[String]) -> Result<(), StateError>;
}

/// Keeps the activation state in memory; the default store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    active: Mutex<Vec<String>>,
    saves: Mutex<usize>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already remembers `names`.
    pub fn with_active<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            active: Mutex::new(names.into_iter().map(Into::into).collect()),
            saves: Mutex::new(0),
        }
    }

    /// The last saved list.
    pub fn active(&self) -> Vec<String> {
        self.active.lock().clone()
    }

    /// How many times the list has been saved.
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl StateStore for MemoryStateStore {
    fn load_active(&self) -> Result<Vec<String>, StateError> {
        Ok(self.active())
    }

    fn save_active(&self, names: &[String]) -> Result<(), StateError> {
        *self.active.lock() = names.to_vec();
        *self.saves.lock() += 1;
        Ok(())
    }
}
