//! Join-on-first-completion
//!
//! Bidirectional copies (relay sessions, the telnet bridge) run each
//! direction as its own task. The session is over as soon as either
//! direction finishes; the other one is then aborted, which drops the
//! connection halves it owns and unblocks its pending read.

use std::future::Future;

use log::debug;
use tokio::task::JoinHandle;

/// Which side of a [`first_completion`] finished first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finished {
    /// The first future completed first
    First,
    /// The second future completed first
    Second,
}

/// Run `first` and `second` as concurrent tasks until one of them completes
///
/// Returns which side finished together with its output. The remaining task
/// is aborted and joined before returning, so every resource it captured has
/// been released when this function returns.
pub async fn first_completion<A, B, T>(first: A, second: B) -> (Finished, Option<T>)
where
    A: Future<Output = T> + Send + 'static,
    B: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let mut first = tokio::spawn(first);
    let mut second = tokio::spawn(second);

    let (finished, result) = tokio::select! {
        result = &mut first => (Finished::First, result),
        result = &mut second => (Finished::Second, result),
    };

    let remaining: JoinHandle<T> = match finished {
        Finished::First => second,
        Finished::Second => first,
    };

    remaining.abort();
    if let Err(e) = remaining.await {
        if !e.is_cancelled() {
            debug!("Remaining copy task ended abnormally: {}", e);
        }
    }

    (finished, result.ok())
}
