/// Late-bound access to the realtime gateway
///
/// Producers hold a `RealtimeHandle` from startup; the HTTP server installs the
/// `ConnectionManager` once it is listening. Until then `get` returns
/// `AppError::NotInitialized`.
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::warn;

use super::ConnectionManager;
use crate::error::{AppError, Result};

#[derive(Clone, Default)]
pub struct RealtimeHandle {
    inner: Arc<OnceCell<ConnectionManager>>,
}

impl RealtimeHandle {
    /// Handle with no gateway installed yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle with the gateway already installed
    pub fn with_manager(manager: ConnectionManager) -> Self {
        let handle = Self::new();
        // A fresh cell cannot already be set.
        let _ = handle.inner.set(manager);
        handle
    }

    /// Install the gateway; only the first call takes effect
    pub fn install(&self, manager: ConnectionManager) -> bool {
        let installed = self.inner.set(manager).is_ok();
        if !installed {
            warn!("Realtime gateway already installed, ignoring second install");
        }
        installed
    }

    pub fn get(&self) -> Result<&ConnectionManager> {
        self.inner.get().ok_or(AppError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.get().is_some()
    }
}
