use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Sends a tick every `pulse` until `token` is cancelled.
///
/// The mailbox holds a single tick: when the consumer is still busy with the
/// previous health check, the new tick is dropped instead of queued.
pub fn spawn_heartbeat(
    pulse: Duration,
    token: CancellationToken,
) -> (mpsc::Receiver<()>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(1);
    let task = tokio::spawn(async move {
        tracing::info!("Heart beating every {pulse:?}");
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + pulse, pulse);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(mpsc::error::TrySendError::Closed(())) = tx.try_send(()) {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Heartbeat task completed");
    });
    (rx, task)
}

/// Cancels `token` on SIGTERM, SIGINT or SIGQUIT.
pub fn spawn_signal_listener(token: CancellationToken) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::signal;
    use tokio::signal::unix::SignalKind;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigquit = signal(SignalKind::quit())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
            _ = sigquit.recv() => {
                tracing::info!("Received SIGQUIT, initiating graceful shutdown");
            }
            _ = token.cancelled() => return,
        }
        token.cancel();
    }))
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test(tokio::test(start_paused = true))]
    async fn heartbeat_ticks_until_cancelled() {
        let token = CancellationToken::new();
        let (mut rx, task) = spawn_heartbeat(Duration::from_secs(5), token.clone());

        assert_eq!(rx.recv().await, Some(()));
        assert_eq!(rx.recv().await, Some(()));

        token.cancel();
        task.await.expect("heartbeat should not panic");
        assert_eq!(rx.recv().await, None);
    }

    #[test(tokio::test(start_paused = true))]
    async fn slow_consumer_sees_one_pending_tick() {
        let token = CancellationToken::new();
        let (mut rx, task) = spawn_heartbeat(Duration::from_secs(1), token.clone());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(rx.try_recv(), Ok(()));
        assert!(rx.try_recv().is_err());

        token.cancel();
        task.await.expect("heartbeat should not panic");
    }
}
