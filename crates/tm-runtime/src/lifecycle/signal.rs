use tokio_util::sync::CancellationToken;

/// Cancel `cancel` on the first Ctrl-C (SIGINT) or SIGTERM. The monitor then
/// stops reading input and drains what it has.
pub async fn wait_for_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tm_info!(sys, signal = "SIGINT", "received signal, draining");
                    }
                    _ = sigterm.recv() => {
                        tm_info!(sys, signal = "SIGTERM", "received signal, draining");
                    }
                    _ = cancel.cancelled() => return,
                }
            }
            Err(e) => {
                tm_warn!(sys, error = %e, "cannot listen for SIGTERM, Ctrl-C only");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tm_info!(sys, signal = "SIGINT", "received signal, draining");
                    }
                    _ = cancel.cancelled() => return,
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tm_info!(sys, "received shutdown signal, draining");
            }
            _ = cancel.cancelled() => return,
        }
    }
    cancel.cancel();
}
