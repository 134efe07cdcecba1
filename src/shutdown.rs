//! Graceful shutdown.
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels a [`CancellationToken`]: the
//! upload stream stops taking new files while in-flight uploads (and their
//! registrations) finish. A second signal exits immediately.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Exit status used when a second signal forces termination.
const FORCED_EXIT_CODE: i32 = 130;

/// Install signal handlers and return the token they cancel.
pub(crate) fn install_signal_handler() -> anyhow::Result<CancellationToken> {
    let token = CancellationToken::new();
    let received = Arc::new(AtomicU32::new(0));

    #[cfg(unix)]
    let (mut sigterm, mut sighup) = {
        use tokio::signal::unix::{signal, SignalKind};
        (signal(SignalKind::terminate())?, signal(SignalKind::hangup())?)
    };

    let handler_token = token.clone();
    tokio::spawn(async move {
        loop {
            #[cfg(unix)]
            let delivered = tokio::select! {
                r = tokio::signal::ctrl_c() => r.is_ok(),
                _ = sigterm.recv() => true,
                _ = sighup.recv() => true,
            };
            #[cfg(not(unix))]
            let delivered = tokio::signal::ctrl_c().await.is_ok();

            if !delivered {
                tracing::warn!("Ctrl+C listener failed; signal handling disabled");
                return;
            }
            on_signal(&handler_token, &received);
        }
    });

    Ok(token)
}

fn on_signal(token: &CancellationToken, received: &AtomicU32) {
    if received.fetch_add(1, Ordering::SeqCst) == 0 {
        tracing::info!("Received shutdown signal, finishing in-flight uploads...");
        tracing::info!("Press Ctrl+C again to force exit");
        token.cancel();
    } else {
        tracing::warn!("Force exit requested");
        std::process::exit(FORCED_EXIT_CODE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_signal_cancels_token() {
        let token = CancellationToken::new();
        let received = AtomicU32::new(0);
        on_signal(&token, &received);
        assert!(token.is_cancelled());
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn install_returns_live_token() {
        let token = install_signal_handler().unwrap();
        assert!(!token.is_cancelled());
    }
}
