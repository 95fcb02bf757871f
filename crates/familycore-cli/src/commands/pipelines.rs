//! `familycore pipelines run` — drives the Pipeline Orchestrator (C10) as a
//! long-running process: round-robins every handler in the fixed
//! twenty-pipeline catalogue against one space's bus until interrupted.
//!
//! Wires the no-op capability facades (C12) — [`PermitAllPolicyEvaluator`],
//! [`NoopRedactor`], [`DegradedEmbeddingProvider`] — for local operation
//! when no external policy/redaction/embedding provider is configured, per
//! spec §1's "external collaborators" boundary.

use std::process::ExitCode;
use std::sync::Arc;

use familycore_core::{pipelines, Bus, CoreConfig, DegradedEmbeddingProvider, Metrics, NoopRedactor, PermitAllPolicyEvaluator, PipelineContext, SpaceId, Storage, SystemClock};
use tracing::info;

use super::Result;

pub async fn run(storage: Arc<Storage>, config: CoreConfig, space: String, idle_sleep_ms: u64) -> Result<ExitCode> {
    let space_id = SpaceId::new(space);
    let handle = storage.open_space(&space_id)?;
    let bus = Bus::new(handle.clone(), config.bus.clone());

    let ctx = PipelineContext::new(
        config,
        Arc::new(Metrics::new()),
        Arc::new(SystemClock),
        Arc::new(PermitAllPolicyEvaluator),
        Arc::new(NoopRedactor),
        Arc::new(DegradedEmbeddingProvider),
    );
    let catalogue = pipelines::catalogue();

    info!(space = %space_id, pipelines = catalogue.len(), "pipeline orchestrator starting");
    let mut shutdown = Box::pin(tokio::signal::ctrl_c());
    loop {
        let mut did_work = false;
        for handler in &catalogue {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("pipeline orchestrator shutting down");
                    return Ok(ExitCode::SUCCESS);
                }
                result = pipelines::run_pipeline_once(handler.as_ref(), &ctx, &bus, &handle) => {
                    match result {
                        Ok(processed) => did_work |= processed,
                        Err(e) => {
                            tracing::warn!(pipeline = handler.name(), error = %e, "pipeline delivery failed");
                        }
                    }
                }
            }
        }
        if !did_work {
            tokio::time::sleep(std::time::Duration::from_millis(idle_sleep_ms)).await;
        }
    }
}
