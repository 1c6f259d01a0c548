//! Portal registry.
//!
//! Maps `(system, bot_type)` to a factory producing the run mode for a
//! claimed execution. Portal crates register their factories at worker
//! startup; the dispatcher only ever resolves.

use std::collections::HashMap;

use crawjud_core::events::TaskDescriptor;
use crawjud_engine::{EngineError, RunMode};

/// Builds the portal/driver pair for one claimed execution.
pub trait PortalFactory: Send + Sync {
    fn build(&self, descriptor: &TaskDescriptor) -> Result<RunMode, EngineError>;
}

#[derive(Default)]
pub struct PortalRegistry {
    entries: HashMap<(String, String), Box<dyn PortalFactory>>,
}

impl PortalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `(system, bot_type)`, replacing any
    /// previous registration.
    pub fn register(
        &mut self,
        system: impl Into<String>,
        bot_type: impl Into<String>,
        factory: Box<dyn PortalFactory>,
    ) {
        self.entries
            .insert((system.into(), bot_type.into()), factory);
    }

    pub fn resolve(&self, system: &str, bot_type: &str) -> Option<&dyn PortalFactory> {
        self.entries
            .get(&(system.to_string(), bot_type.to_string()))
            .map(|f| f.as_ref())
    }
}
