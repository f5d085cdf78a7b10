//! Admin REST surface under `/_api`.

mod handlers;
mod router;
pub mod types;

pub use router::route_admin;

use crate::engine::Engine;
use crate::stats::StatsCollector;
use crate::store::Store;
use crate::trace::TraceBus;
use std::sync::Arc;

/// Shared handles every admin handler needs.
pub struct AdminContext {
    pub store: Arc<dyn Store>,
    pub engine: Arc<Engine>,
    pub stats: Arc<StatsCollector>,
    pub trace_bus: Arc<TraceBus>,
}
