//! Process termination signals

use tracing::error;

/// Resolves with the signal name on Ctrl-C, or on SIGTERM from a service
/// manager. A signal that cannot be listened for never resolves.
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "Ctrl-C",
        _ = terminate => "SIGTERM",
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sigterm_resolves_shutdown() {
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        // First poll installs the handlers
        assert!(tokio::time::timeout(Duration::from_millis(100), &mut shutdown)
            .await
            .is_err());

        let status = Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let signal = tokio::time::timeout(Duration::from_secs(5), &mut shutdown)
            .await
            .unwrap();
        assert_eq!(signal, "SIGTERM");
    }
}
