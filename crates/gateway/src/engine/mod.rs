//! Session engine implementations the gateway can drive.

pub mod loopback;

use std::sync::Arc;

use fr_domain::config::{EngineDefaults, EngineKind};
use fr_sessions::SessionEngine;

pub use loopback::LoopbackEngine;

/// Build the engine selected by `[engine] kind`.
pub fn build(defaults: &EngineDefaults) -> Arc<dyn SessionEngine> {
    match defaults.kind {
        EngineKind::Loopback => {
            tracing::info!("using loopback session engine");
            Arc::new(LoopbackEngine::new())
        }
    }
}
