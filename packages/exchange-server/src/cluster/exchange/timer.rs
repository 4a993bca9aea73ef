//! Fixed-interval timer tick feeding [`super::fsm::ExchangeEvent::Timer`]
//! into the actor's inbox.

use exchange_core::exchange::TIMER_TICK_MS;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use super::fsm::ExchangeEvent;

/// Spawns the timer loop. The loop exits the first time its send fails,
/// i.e. once the actor side of `tx` has been dropped.
pub fn spawn(tx: mpsc::Sender<ExchangeEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TIMER_TICK_MS));
        loop {
            interval.tick().await;
            if tx.send(ExchangeEvent::Timer).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ticks_feed_timer_events() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = spawn(tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(event, ExchangeEvent::Timer);

        handle.abort();
    }

    #[tokio::test]
    async fn loop_exits_once_receiver_is_dropped() {
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn(tx);
        drop(rx);

        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("timer task should exit promptly")
            .unwrap();
    }
}
