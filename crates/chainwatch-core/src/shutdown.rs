//! Shutdown and timer helpers shared by the drain loops and the connection
//! driver. Both race these futures inside `tokio::select!`.

use tokio::sync::watch;
use tokio::time::{self, Instant};

/// Completes once shutdown is requested or the signal's sender is gone.
pub async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep until `deadline`, or forever when there is none.
pub async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn resolves_when_true_is_sent() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { shutdown_signalled(&mut rx).await });
        time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        tx.send(true).unwrap();
        time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("shutdown observed")
            .unwrap();
    }

    #[tokio::test]
    async fn resolves_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        shutdown_signalled(&mut rx).await;
    }

    #[tokio::test]
    async fn already_signalled_returns_immediately() {
        let (_tx, mut rx) = watch::channel(true);
        shutdown_signalled(&mut rx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn missing_deadline_never_fires() {
        let fired = time::timeout(Duration::from_secs(3600), sleep_until_opt(None)).await;
        assert!(fired.is_err());

        let at = Instant::now() + Duration::from_secs(5);
        sleep_until_opt(Some(at)).await;
        assert!(Instant::now() >= at);
    }
}
