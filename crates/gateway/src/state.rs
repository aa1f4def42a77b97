use std::sync::Arc;

use gort_auth::ServiceTokenWindow;
use gort_data::DataAccessHolder;
use gort_domain::config::Config;
use gort_domain::CommandRequest;
use tokio::sync::mpsc;

use crate::dispatch::worker::CommandWorker;
use crate::scheduler::Scheduler;

/// Capacity of the bounded queue between request producers (scheduler,
/// chat adapters) and the dispatcher. Sends block when it is full.
pub const REQUEST_CHANNEL_CAPACITY: usize = 100;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — config, the data access holder
/// - **Identity** — the service-token window
/// - **Runtime** — scheduler, worker, the request channel sender
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub data: Arc<DataAccessHolder>,

    // ── Identity ──────────────────────────────────────────────────────
    /// `GORT_SERVICE_TOKEN` acceptance window (read once at startup).
    pub service_token: Arc<ServiceTokenWindow>,

    // ── Runtime ───────────────────────────────────────────────────────
    pub scheduler: Arc<Scheduler>,
    /// Container-runtime collaborator executing command workloads.
    pub worker: Arc<dyn CommandWorker>,
    /// Producer side of the dispatcher queue.
    pub request_tx: mpsc::Sender<CommandRequest>,
}
