// harvester/src/pipeline/execution.rs

//! Contains `Pipeline::run()`, the record loop executed by a working process.

use crate::core::control::{PipelineResult, PublishOutcome};
use crate::core::definition::LinkKind;
use crate::core::link::LinkProcessor;
use crate::core::data_reference::DataReference;
use crate::core::statistics::Statistics;
use crate::error::{HarvestError, HarvestResult};
use crate::incremental::IncrementalStore;
use crate::pipeline::definition::{stages_of, Pipeline};
use crate::process::control::ProcessControl;
use crate::process::hooks::Listeners;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{event, instrument, Level};
use uuid::Uuid;

/// Incremental bookkeeping bound to one task.
pub(crate) struct IncrementalScope {
  pub(crate) store: Arc<dyn IncrementalStore>,
  pub(crate) scope: String,
}

/// Everything a run shares with the process that owns it.
pub(crate) struct RunContext {
  pub(crate) process_id: Uuid,
  pub(crate) statistics: Arc<Statistics>,
  pub(crate) control: Arc<ProcessControl>,
  pub(crate) listeners: Listeners,
  pub(crate) incremental: Option<IncrementalScope>,
}

impl Pipeline {
  /// Drains the source through the pipeline, then releases every stage.
  ///
  /// Release happens on every exit path: exhaustion, abort, fatal error and
  /// panic. A panic inside a connector is reported as `HarvestError::Internal`.
  #[instrument(
        name = "Pipeline::run",
        skip_all,
        fields(
            process_id = %ctx.process_id,
            source = %self.source.definition().entity_type(),
            num_stages = self.stages.len(),
        ),
        err(Display)
    )]
  pub(crate) async fn run(mut self, ctx: &RunContext) -> HarvestResult<PipelineResult> {
    event!(Level::DEBUG, "Pipeline execution starting.");

    let outcome = match AssertUnwindSafe(self.drive(ctx)).catch_unwind().await {
      Ok(outcome) => outcome,
      Err(panic) => Err(HarvestError::Internal(format!(
        "pipeline panicked: {}",
        panic_message(panic.as_ref())
      ))),
    };

    self.release().await;
    event!(Level::DEBUG, "Pipeline resources released.");
    outcome
  }

  async fn drive(&mut self, ctx: &RunContext) -> HarvestResult<PipelineResult> {
    loop {
      if !ctx.control.checkpoint().await {
        event!(Level::INFO, "Abort observed; stopping record loop.");
        return Ok(PipelineResult::Aborted);
      }

      // A source waiting on I/O does not hold up an abort; a record already
      // pulled is always processed to the end.
      let pulled = tokio::select! {
        biased;
        _ = ctx.control.aborted() => {
          event!(Level::INFO, "Abort observed while waiting on the source.");
          return Ok(PipelineResult::Aborted);
        }
        pulled = self.source.next() => pulled,
      };

      match pulled {
        Ok(None) => {
          event!(Level::DEBUG, "Source exhausted.");
          return Ok(PipelineResult::Completed);
        }
        Ok(Some(data_ref)) => {
          ctx.statistics.record_harvested();
          Self::process_record(&self.stages, data_ref, ctx).await?;
        }
        Err(e) if e.is_fatal() => {
          event!(Level::ERROR, error = %e, "Source failed fatally.");
          return Err(e);
        }
        Err(e) => {
          // The record could not be fetched; it still counts as harvested.
          ctx.statistics.record_harvested();
          record_failure(e, ctx, None)?;
        }
      }

      if let Some(max_failures) = self.options.max_failures {
        let failed = ctx.statistics.failed();
        if failed > max_failures {
          return Err(HarvestError::processor(format!(
            "{} records failed, exceeding the limit of {}",
            failed, max_failures
          )));
        }
      }
    }
  }

  // Borrows only the stages; `Source` is not required to be `Sync`.
  async fn process_record(
    stages: &[Box<dyn LinkProcessor>],
    data_ref: DataReference,
    ctx: &RunContext,
  ) -> HarvestResult<()> {
    let record_id = data_ref.id().to_string();
    let modified = data_ref.last_modified();

    if let (Some(incremental), Some(modified)) = (&ctx.incremental, modified) {
      match incremental.store.last_modified(&incremental.scope, &record_id).await {
        Ok(Some(seen)) if seen >= modified => {
          event!(Level::TRACE, %record_id, "Record unchanged since last harvest; skipping.");
          ctx.statistics.record_skipped();
          return Ok(());
        }
        Ok(_) => {}
        Err(e) => {
          event!(Level::WARN, %record_id, error = %e, "Incremental lookup failed; processing record anyway.");
        }
      }
    }

    let mut current = data_ref;
    for stage in stages_of(stages, LinkKind::Transformer) {
      match stage.process(current).await {
        Ok(Some(next)) => current = next,
        Ok(None) => {
          event!(Level::DEBUG, %record_id, link = %stage.link_definition(), "Record dropped.");
          ctx.statistics.record_dropped();
          return Ok(());
        }
        Err(e) => return record_failure(e, ctx, Some(&record_id)),
      }
    }

    let mut delivered = true;
    for stage in stages_of(stages, LinkKind::Destination) {
      match stage.process(current.clone()).await {
        Ok(published) => {
          let outcome = published
            .and_then(|r| r.outcome())
            .unwrap_or(PublishOutcome::Unchanged);
          event!(Level::TRACE, %record_id, link = %stage.link_definition(), ?outcome, "Record published.");
          ctx.statistics.record_outcome(outcome);
        }
        Err(e) => {
          delivered = false;
          record_failure(e, ctx, Some(&record_id))?;
        }
      }
    }

    if delivered {
      if let (Some(incremental), Some(modified)) = (&ctx.incremental, modified) {
        if let Err(e) = incremental.store.record(&incremental.scope, &record_id, modified).await {
          event!(Level::WARN, %record_id, error = %e, "Failed to record incremental state.");
        }
      }
    }
    Ok(())
  }
}

/// Counts a record-level failure, or hands a fatal one back to the loop.
fn record_failure(error: HarvestError, ctx: &RunContext, record_id: Option<&str>) -> HarvestResult<()> {
  if error.is_fatal() {
    event!(Level::ERROR, record_id, error = %error, "Fatal pipeline error.");
    return Err(error);
  }
  event!(Level::WARN, record_id, error = %error, "Record failed.");
  ctx.statistics.record_failed();
  ctx.listeners.notify_error(ctx.process_id, &error);
  Ok(())
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(message) = panic.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = panic.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic payload".to_string()
  }
}
