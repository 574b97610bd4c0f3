//! Repeats an operation until a condition holds or a timeout elapses.
//!
//! Reloads and restarts are asynchronous on the server side and nothing
//! pushes a completion signal, so polling with a bounded ceiling is the only
//! option. Attempts are strictly serialized: a new one is never issued while
//! the previous is in flight, which avoids pile-up against a process that
//! may be temporarily unreachable.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::dispatcher::Dispatcher;
use crate::error::{DispatchError, PollError};
use crate::model::{Composite, CompositeResult, ModelNode, Operation};

/// Fixed cadence between attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The folded outcome of one poll attempt. Failures and transport errors are
/// attempts like any other so the predicate always has something to
/// evaluate; to the default predicate both just mean "not yet".
#[derive(Debug, Clone, PartialEq)]
pub enum PollAttempt {
    Success(ModelNode),
    CompositeSuccess(CompositeResult),
    Failed(String),
    Error(String),
}

impl PollAttempt {
    /// The default condition: the attempt succeeded and, for composites, no
    /// step reports a failure outcome.
    pub fn no_failure(&self) -> bool {
        match self {
            PollAttempt::Success(_) => true,
            PollAttempt::CompositeSuccess(results) => !results.any_step_failed(),
            PollAttempt::Failed(_) | PollAttempt::Error(_) => false,
        }
    }
}

/// Fixed-interval polling session around a [`Dispatcher`].
pub struct Poller<'a> {
    dispatcher: &'a Dispatcher,
    timeout: Duration,
    interval: Duration,
    cancel: Option<CancellationToken>,
}

impl<'a> Poller<'a> {
    pub fn new(dispatcher: &'a Dispatcher, timeout_seconds: u64) -> Self {
        Self {
            dispatcher,
            timeout: Duration::from_secs(timeout_seconds),
            interval: POLL_INTERVAL,
            cancel: None,
        }
    }

    /// Sub-second overall timeout, mainly useful in tests.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Lets callers stop the session independently of the timeout.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Polls an operation until no attempt reports a failure.
    pub async fn operation(&self, operation: &Operation) -> Result<PollAttempt, PollError> {
        self.operation_until(operation, PollAttempt::no_failure)
            .await
    }

    /// Polls an operation until the predicate over the folded attempt holds.
    pub async fn operation_until<P>(
        &self,
        operation: &Operation,
        predicate: P,
    ) -> Result<PollAttempt, PollError>
    where
        P: FnMut(&PollAttempt) -> bool,
    {
        let dispatcher = self.dispatcher;
        self.run(
            || async move { fold(dispatcher.execute(operation).await.map(PollAttempt::Success)) },
            predicate,
        )
        .await
    }

    /// Polls a composite until every step reports success.
    pub async fn composite(&self, composite: &Composite) -> Result<PollAttempt, PollError> {
        self.composite_until(composite, PollAttempt::no_failure)
            .await
    }

    pub async fn composite_until<P>(
        &self,
        composite: &Composite,
        predicate: P,
    ) -> Result<PollAttempt, PollError>
    where
        P: FnMut(&PollAttempt) -> bool,
    {
        let dispatcher = self.dispatcher;
        self.run(
            || async move {
                fold(
                    dispatcher
                        .execute_composite(composite)
                        .await
                        .map(PollAttempt::CompositeSuccess),
                )
            },
            predicate,
        )
        .await
    }

    /// The loop: attempt, evaluate, sleep. One attempt is always issued;
    /// the timeout is checked between attempts, never mid-flight.
    async fn run<F, Fut, P>(&self, mut attempt: F, mut predicate: P) -> Result<PollAttempt, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PollAttempt>,
        P: FnMut(&PollAttempt) -> bool,
    {
        let started = Instant::now();
        loop {
            if let Some(token) = &self.cancel {
                if token.is_cancelled() {
                    debug!("poll session cancelled");
                    return Err(PollError::Cancelled);
                }
            }

            let outcome = attempt().await;
            trace!("poll attempt resolved after {:?}", started.elapsed());
            if predicate(&outcome) {
                return Ok(outcome);
            }
            if started.elapsed() >= self.timeout {
                debug!("poll session timed out after {:?}", self.timeout);
                return Err(PollError::Timeout {
                    timeout: self.timeout,
                });
            }

            match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!("poll session cancelled");
                            return Err(PollError::Cancelled);
                        }
                        _ = tokio::time::sleep(self.interval) => {}
                    }
                }
                None => tokio::time::sleep(self.interval).await,
            }
        }
    }
}

fn fold(outcome: Result<PollAttempt, DispatchError>) -> PollAttempt {
    match outcome {
        Ok(attempt) => attempt,
        Err(DispatchError::OperationFailed { description }) => PollAttempt::Failed(description),
        Err(error) => PollAttempt::Error(error.to_string()),
    }
}
