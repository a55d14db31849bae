//! Deadline-bounded waits on operations running in their own task.
//!
//! [`Deferred::spawn`] starts an operation on a fresh task and returns a
//! handle; [`Deferred::wait`] races the operation's result against a deadline.
//! When the deadline wins, the operation is left to finish in the background
//! and its result is dropped. The result travels over a `oneshot` channel, so a
//! late send never blocks the abandoned task.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{ConnectorError, Result};

/// Handle to an operation running on its own task.
#[derive(Debug)]
#[must_use = "a deferred operation does nothing useful unless waited on"]
pub struct Deferred<T> {
    rx: oneshot::Receiver<T>,
}

impl<T: Send + 'static> Deferred<T> {
    /// Start `operation` on a new task.
    pub fn spawn<F>(operation: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            // Receiver is gone once the deadline has passed.
            let _ = tx.send(operation.await);
        });
        Self { rx }
    }

    /// Wait up to `deadline` for the operation's result.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Timeout` if the deadline elapses first, or
    /// `ConnectorError::Internal` if the operation's task died without a result.
    pub async fn wait(self, deadline: Duration) -> Result<T> {
        tokio::select! {
            biased;
            res = self.rx => res.map_err(|_| {
                ConnectorError::Internal("timed operation ended without a result".to_string())
            }),
            () = tokio::time::sleep(deadline) => Err(ConnectorError::Timeout(deadline)),
        }
    }
}

/// Run `operation` and return its result, or a timeout error if `deadline`
/// elapses first.
///
/// # Errors
///
/// Returns the operation's own error, or `ConnectorError::Timeout`.
pub async fn do_with_timeout<T, F>(operation: F, deadline: Duration) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    Deferred::spawn(operation).wait(deadline).await?
}
