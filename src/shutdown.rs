//! Cancellation on SIGINT / SIGTERM
//!
//! A run is cancelled by dropping its future. That kills the relay
//! processes it started and removes its temporary files, so the binary
//! races every command against [`shutdown_signal`].

use std::future::Future;
use tracing::warn;

/// Resolves on ctrl-c, or on SIGTERM where signals exist
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Drive `work` until it completes or `shutdown` resolves
///
/// Returns `None` when shut down. The work future has been dropped by then.
pub async fn until_shutdown<F, S>(work: F, shutdown: S) -> Option<F::Output>
where
    F: Future,
    S: Future<Output = ()>,
{
    tokio::select! {
        output = work => Some(output),
        _ = shutdown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::RunScope;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_completed_work_is_returned() {
        let output = until_shutdown(async { 7 }, std::future::pending()).await;
        assert_eq!(output, Some(7));
    }

    #[tokio::test]
    async fn test_shutdown_drops_run_scope() {
        let scope = RunScope::new().unwrap();
        let path = scope.path().to_path_buf();
        let (tx, rx) = oneshot::channel::<()>();

        let work = async move {
            let _scope = scope;
            std::future::pending::<()>().await
        };
        let handle = tokio::spawn(until_shutdown(work, async {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(path.exists());

        tx.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), None);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_resolves_shutdown() {
        let handle = tokio::spawn(shutdown_signal());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("shutdown did not resolve")
            .unwrap();
    }
}
