//! AppState construction shared by `serve` and the integration tests.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;

use fr_domain::config::{Config, ConfigLookup, ConfigSeverity, EnvironmentCatalog};
use fr_sessions::{
    CredentialCache, FileCredentialSource, HmacSigner, LifecycleConfig, SessionEngine,
    SessionLifecycleManager,
};

use crate::clients::ClientHub;
use crate::orchestrator::Orchestrator;
use crate::runtime::BatchDispatcher;
use crate::state::AppState;

/// Validate config, load the environment catalog, and wire every subsystem
/// around the configured engine.  Must run inside a tokio runtime.
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Environment catalog ──────────────────────────────────────────
    let catalog = EnvironmentCatalog::load(&config.environments_path)
        .with_context(|| format!("loading {}", config.environments_path.display()))?;

    // ── Session engine ───────────────────────────────────────────────
    let engine = crate::engine::build(&config.engine);

    assemble(config, Arc::new(catalog), engine)
}

/// Wire the gateway around an already-built lookup and engine.
pub fn assemble(
    config: Arc<Config>,
    lookup: Arc<dyn ConfigLookup>,
    engine: Arc<dyn SessionEngine>,
) -> anyhow::Result<AppState> {
    // ── Client hub (event sink) ──────────────────────────────────────
    let clients = Arc::new(ClientHub::new(config.batch.client_buffer));

    // ── Credentials ──────────────────────────────────────────────────
    let credentials = Arc::new(CredentialCache::new(
        Arc::new(FileCredentialSource::new(config.credentials.clone())),
        lookup.clone(),
        Arc::new(HmacSigner),
    ));
    tracing::info!(dir = %config.credentials.dir.display(), "credential cache ready");

    // ── Session lifecycle ────────────────────────────────────────────
    let sessions = SessionLifecycleManager::new(
        engine.clone(),
        lookup,
        credentials,
        clients.clone(),
        LifecycleConfig::from_config(&config),
    )
    .context("initializing session lifecycle manager")?;
    tracing::info!(
        begin_string = %config.engine.begin_string,
        stop_delay_ms = config.recovery.stop_delay_ms,
        "session lifecycle manager ready"
    );

    // ── Batch dispatcher ─────────────────────────────────────────────
    let batch = Arc::new(BatchDispatcher::new(
        engine,
        clients.clone(),
        config.engine.begin_string.clone(),
    ));

    Ok(AppState {
        config,
        orchestrator: Arc::new(Orchestrator::new(sessions, batch)),
        clients,
        started_at: Instant::now(),
    })
}
