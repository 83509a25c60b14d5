//! Shared handler state.

use common::HealthRegistry;
use domain::{CommandService, WriteStore};
use projections::{LagReporter, ReadModelStore};

/// Shared application state accessible from all handlers.
///
/// The write store and read-model store are injected once at startup; the
/// same handles are shared with the relay and projector tasks.
pub struct AppState<W: WriteStore, R: ReadModelStore> {
    pub commands: CommandService<W>,
    pub read_models: R,
    pub lag: LagReporter<R>,
    pub health: HealthRegistry,
}

impl<W: WriteStore, R: ReadModelStore + Clone> AppState<W, R> {
    pub fn new(write_store: W, read_models: R, health: HealthRegistry) -> Self {
        Self {
            commands: CommandService::new(write_store),
            lag: LagReporter::new(read_models.clone()),
            read_models,
            health,
        }
    }
}
