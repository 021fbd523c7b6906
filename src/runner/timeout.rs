use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;

use crate::runner::result::{Execution, Failure, Interrupt, UnitResult};

/// Run one spec or hook body under a deadline.
///
/// The future is polled inside a panic guard and raced against a tokio
/// timer. When the deadline elapses first the future is dropped, which
/// cancels it at its current suspension point. A panic surfaces as soon as
/// it happens, without waiting for the deadline.
///
/// Must be awaited inside a tokio runtime with the time driver enabled.
pub async fn execute<F>(future: F, timeout: Duration) -> Execution
where
    F: Future<Output = UnitResult>,
{
    let guarded = AssertUnwindSafe(future).catch_unwind();
    match tokio::time::timeout(timeout, guarded).await {
        Err(_elapsed) => Execution::Failed(Failure::timeout(timeout)),
        Ok(Err(payload)) => Execution::Failed(Failure::panic(payload)),
        Ok(Ok(Ok(()))) => Execution::Completed,
        Ok(Ok(Err(Interrupt::Skip(reason)))) => Execution::Skipped(reason),
        Ok(Ok(Err(Interrupt::Fail(error)))) => Execution::Failed(Failure::error(&error)),
    }
}
