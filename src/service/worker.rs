//! The worker thread hosting one run.
//!
//! Sequence: reset the global runtime, construct a runner, publish its handle,
//! honour a stop that arrived during construction, run, drop the runner, reset
//! the global runtime again. Errors and panics end here; the host only sees
//! the service state and `last_failure`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::lifecycle::{FailureKind, RunError, Runner};
use crate::observability::targets;
use crate::service::facade::Inner;

pub(crate) fn run(inner: Arc<Inner>) {
    inner.runtime.reset();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_once(&inner)));
    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(err)) => {
            tracing::error!(target: targets::SERVICE, error = %err, "fatal");
            Some(err.kind())
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(target: targets::SERVICE, %message, "fatal: worker panicked");
            Some(FailureKind::Unknown)
        }
    };

    inner.runtime.reset();
    tracing::info!(target: targets::SERVICE, failed = failure.is_some(), "service stopped");
    inner.finish(failure);
}

fn run_once(inner: &Inner) -> Result<(), RunError> {
    let runner = Runner::from_source(Arc::clone(&inner.runtime), &inner.config)?;
    let handle = runner.handle();

    // Publish before switching to Running: a stop recorded after the switch
    // goes through the handle, one recorded before it is returned here.
    inner.controller.store(Some(Arc::new(handle.clone())));
    if inner.control.mark_running() {
        tracing::info!(target: targets::SERVICE, "stop arrived during construction");
        handle.stop();
    }

    runner.start()
}
