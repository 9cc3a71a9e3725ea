//! Process-wide SDK lifetime shared by every driver using a backend.
//!
//! Vendor SDKs are usually initialized once per process. Each driver holds an
//! [`SdkContext`] for each backend it uses; the first context acquired for a
//! backend starts the SDK up and dropping the last one shuts it down.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::{debug, info};

use crate::error::BackendError;
use crate::traits::Backend;

type Registry = Mutex<HashMap<String, usize>>;

fn live() -> MutexGuard<'static, HashMap<String, usize>> {
    static LIVE: OnceLock<Registry> = OnceLock::new();
    LIVE.get_or_init(Registry::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Reference-counted handle keeping a backend's SDK initialized.
///
/// Startup and shutdown happen under one process-wide lock, so an SDK is
/// never started while its previous shutdown is still running.
pub struct SdkContext {
    backend: Arc<dyn Backend>,
}

impl SdkContext {
    /// Join the running SDK context for `backend`, starting it if needed.
    pub fn acquire(backend: &Arc<dyn Backend>) -> Result<Self, BackendError> {
        let mut live = live();
        let name = backend.name();

        if let Some(count) = live.get_mut(name) {
            *count += 1;
            debug!(backend = name, contexts = *count, "joining running SDK context");
        } else {
            info!(backend = name, "starting SDK");
            backend.startup()?;
            live.insert(name.to_owned(), 1);
        }
        Ok(Self {
            backend: Arc::clone(backend),
        })
    }

    /// Backend this context belongs to.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Number of contexts currently alive for the named backend.
    pub fn live_count(backend: &str) -> usize {
        live().get(backend).copied().unwrap_or(0)
    }
}

impl Clone for SdkContext {
    fn clone(&self) -> Self {
        if let Some(count) = live().get_mut(self.backend.name()) {
            *count += 1;
        }
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl Drop for SdkContext {
    fn drop(&mut self) {
        let mut live = live();
        let name = self.backend.name();
        let Some(count) = live.get_mut(name) else {
            return;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            live.remove(name);
            info!(backend = name, "shutting down SDK");
            self.backend.shutdown();
        }
    }
}

impl fmt::Debug for SdkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkContext")
            .field("backend", &self.backend.name())
            .finish()
    }
}
