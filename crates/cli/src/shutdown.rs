//! Interrupt handling around a running command

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// How a supervised command ended
#[derive(Debug)]
pub enum Finished<T> {
    /// The command ran to completion
    Done(T),
    /// The user interrupted and the command was abandoned
    Interrupted,
}

/// Wait for the process interrupt signal
///
/// If no handler can be installed this never resolves.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for interrupt");
        std::future::pending::<()>().await;
    }
}

/// Run `work` until it finishes or the user gives up on it
///
/// With `graceful` set, the first interrupt only cancels `cancel` so an open
/// transaction can roll back and a second one abandons the work. Otherwise the
/// first interrupt abandons it.
pub async fn supervise<T, W, S, F>(
    work: W,
    cancel: &CancellationToken,
    graceful: bool,
    mut interrupt: S,
) -> Finished<T>
where
    W: Future<Output = T>,
    S: FnMut() -> F,
    F: Future<Output = ()>,
{
    tokio::pin!(work);

    if graceful {
        tokio::select! {
            result = &mut work => return Finished::Done(result),
            _ = interrupt() => {
                tracing::warn!("Interrupted, cancelling");
                cancel.cancel();
            }
        }
    }

    tokio::select! {
        result = &mut work => Finished::Done(result),
        _ = interrupt() => Finished::Interrupted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::{pending, ready};
    use std::time::Duration;

    /// Interrupt source that fires `times` times and then stays quiet
    fn interrupts(times: usize) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = ()>>> {
        let mut fired = 0;
        move || {
            fired += 1;
            if fired <= times {
                Box::pin(ready(()))
            } else {
                Box::pin(pending())
            }
        }
    }

    #[tokio::test]
    async fn test_work_finishes_without_interrupt() {
        let cancel = CancellationToken::new();

        let outcome = supervise(async { 7 }, &cancel, true, interrupts(0)).await;

        assert!(matches!(outcome, Finished::Done(7)));
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_interrupt_abandons_blocked_command() {
        let cancel = CancellationToken::new();

        let outcome = supervise(pending::<()>(), &cancel, false, interrupts(1)).await;

        assert!(matches!(outcome, Finished::Interrupted));
    }

    #[tokio::test]
    async fn test_graceful_interrupt_lets_work_wind_down() {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let work = async move {
            token.cancelled().await;
            "rolled back"
        };

        let outcome = supervise(work, &cancel, true, interrupts(1)).await;

        assert!(matches!(outcome, Finished::Done("rolled back")));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_second_interrupt_abandons_graceful_command() {
        let cancel = CancellationToken::new();

        let outcome = supervise(pending::<()>(), &cancel, true, interrupts(2)).await;

        assert!(matches!(outcome, Finished::Interrupted));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_blocking_prompt_does_not_stall_interrupt() {
        let cancel = CancellationToken::new();
        let work = async {
            tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_secs(2)))
                .await
                .unwrap()
        };

        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            supervise(work, &cancel, false, interrupts(1)),
        )
        .await;

        assert!(matches!(outcome, Ok(Finished::Interrupted)));
    }
}
