//! The process-wide data access holder.
//!
//! Restates the source's initialization singleton as a typed holder:
//! `initialize` drives the backend through
//! Uninitialized → Initializing → Initialized, retrying failures with
//! exponential backoff capped at 10 seconds, and `get` blocks until the
//! backend is ready. Calling `initialize` again (configuration change)
//! re-enters Initializing.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use gort_domain::config::{DatabaseBackend, DatabaseConfig};
use gort_domain::{Error, Result};
use tokio::sync::{Notify, RwLock};

use crate::{DataAccess, DynDataAccess, MemoryDataAccess, PostgresDataAccess};

const BACKOFF_INITIAL: StdDuration = StdDuration::from_millis(500);
const BACKOFF_CAP: StdDuration = StdDuration::from_secs(10);

#[derive(Clone)]
enum State {
    Uninitialized,
    Initializing,
    Initialized(DynDataAccess),
}

pub struct DataAccessHolder {
    state: RwLock<State>,
    ready: Notify,
}

impl DataAccessHolder {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::Uninitialized),
            ready: Notify::new(),
        }
    }

    /// Build the configured backend and run its `initialize` until it
    /// succeeds, with capped exponential backoff across both connection
    /// and schema failures. Returns once the holder is serving the new
    /// instance.
    pub async fn initialize(&self, config: &DatabaseConfig) -> Result<()> {
        *self.state.write().await = State::Initializing;

        let mut backoff = BACKOFF_INITIAL;
        let da: DynDataAccess = loop {
            match Self::build(config).await {
                Ok(da) => match da.initialize().await {
                    Ok(()) => break da,
                    Err(e) => {
                        tracing::warn!(error = %e, retry_in = ?backoff, "data access initialization failed")
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, retry_in = ?backoff, "data access backend unavailable")
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(BACKOFF_CAP);
        };

        *self.state.write().await = State::Initialized(da);
        self.ready.notify_waiters();
        Ok(())
    }

    async fn build(config: &DatabaseConfig) -> Result<DynDataAccess> {
        Ok(match config.backend {
            DatabaseBackend::Memory => Arc::new(MemoryDataAccess::new()),
            DatabaseBackend::Postgres => Arc::new(
                PostgresDataAccess::connect(&config.uri, config.max_connections).await?,
            ),
        })
    }

    /// Install an already-initialized backend (tests, embedding).
    pub async fn install(&self, da: DynDataAccess) {
        *self.state.write().await = State::Initialized(da);
        self.ready.notify_waiters();
    }

    /// The current backend. Blocks while initialization is in flight;
    /// errors if `initialize` was never called.
    pub async fn get(&self) -> Result<DynDataAccess> {
        loop {
            // Register interest before re-checking so a notify between
            // the check and the await is not lost.
            let notified = self.ready.notified();
            match &*self.state.read().await {
                State::Initialized(da) => return Ok(da.clone()),
                State::Uninitialized => {
                    return Err(Error::DataInit("initialize was never called".into()))
                }
                State::Initializing => {}
            }
            notified.await;
        }
    }

    /// Non-blocking variant for surfaces that must answer immediately
    /// (health endpoints).
    pub async fn try_get(&self) -> Result<DynDataAccess> {
        match &*self.state.read().await {
            State::Initialized(da) => Ok(da.clone()),
            _ => Err(Error::DataInit("data access layer is initializing".into())),
        }
    }
}

impl Default for DataAccessHolder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_before_initialize_is_an_error() {
        let holder = DataAccessHolder::new();
        assert!(holder.get().await.is_err());
    }

    #[tokio::test]
    async fn memory_backend_initializes_immediately() {
        let holder = DataAccessHolder::new();
        holder
            .initialize(&DatabaseConfig::default())
            .await
            .unwrap();
        let da = holder.get().await.unwrap();
        assert!(da.user_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn waiters_are_released_when_initialization_completes() {
        let holder = Arc::new(DataAccessHolder::new());
        // Park a getter while the holder is mid-initialization.
        *holder.state.write().await = State::Initializing;
        let waiting = {
            let holder = holder.clone();
            tokio::spawn(async move { holder.get().await.is_ok() })
        };
        tokio::task::yield_now().await;
        holder.install(Arc::new(MemoryDataAccess::new())).await;
        assert!(waiting.await.unwrap());
    }
}
