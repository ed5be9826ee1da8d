//! Cooperative cancellation shared by every long-running task.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Owner side: triggers shutdown for every [`Shutdown`] handed out.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observer side. Cheap to clone; one per task.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, Shutdown { rx })
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Shutdown {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Keeping the value without a sender means `cancelled` pends forever.
        drop(tx);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    ///
    /// If every handle is dropped without triggering, this never resolves.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Trigger `handle` on the first SIGINT or SIGTERM.
pub fn listen_for_signals(handle: ShutdownHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => {
                info!(signal, "received shutdown signal");
                handle.trigger();
            }
            Err(e) => tracing::warn!(error = %e, "failed to install signal handlers"),
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl+C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_reaches_all_subscribers() {
        let (handle, mut a) = ShutdownHandle::new();
        let mut b = handle.subscribe();
        assert!(!a.is_cancelled());

        handle.clone().trigger();
        a.cancelled().await;
        b.cancelled().await;
        assert!(a.is_cancelled());
        assert!(handle.is_triggered());
    }

    #[tokio::test]
    async fn subscriber_created_after_trigger_sees_it() {
        let (handle, _) = ShutdownHandle::new();
        handle.trigger();
        let mut late = handle.subscribe();
        late.cancelled().await;
    }

    #[tokio::test]
    async fn dropped_handle_never_cancels() {
        let (handle, mut shutdown) = ShutdownHandle::new();
        drop(handle);
        let res = tokio::time::timeout(Duration::from_millis(50), shutdown.cancelled()).await;
        assert!(res.is_err());

        let mut never = Shutdown::never();
        let res = tokio::time::timeout(Duration::from_millis(20), never.cancelled()).await;
        assert!(res.is_err());
    }
}
