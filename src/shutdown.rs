use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tokio::signal;
use tracing::{error, warn};

use crate::error::Result;

/// Raised once the process is asked to terminate.
///
/// The training loop polls it once per step and leaves through its normal
/// teardown, so the simulator is released and the reward curve is written.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Raises `flag` on Ctrl+C or SIGTERM. A second signal exits immediately.
///
/// The signal handlers live on a dedicated thread with its own
/// single-threaded runtime; the training loop itself stays synchronous.
pub fn listen_for_signals(flag: ShutdownFlag) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("shutdown-signal".to_string())
        .spawn(move || {
            runtime.block_on(async {
                shutdown_signal().await;
                warn!("Termination requested, stopping after the current step");
                flag.raise();

                shutdown_signal().await;
                error!("Second termination signal, exiting without cleanup");
                process::exit(130);
            });
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let flag = ShutdownFlag::new();
        let seen_by_loop = flag.clone();
        assert!(!seen_by_loop.is_raised());
        flag.raise();
        assert!(seen_by_loop.is_raised());
    }
}
