use std::io;

use tokio::signal;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::SendError;
use tracing::info;
use tracing::warn;

/// Broadcasts one message to all subscribers when the process receives SIGTERM or Ctrl-C.
pub struct Shutdown {
    sender: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Shutdown { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    pub fn listen(self) {
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("shutdown signal received");
            let _: Result<usize, SendError<()>> = self.sender.send(());
        });
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Shutdown::new()
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::SignalKind;
    use tokio::signal::unix::signal;

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = signal::ctrl_c() => {},
                _ = terminate.recv() => {},
            }
        }
        Err(err) => {
            warn!("failed to listen SIGTERM, error={err}");
            let _: io::Result<()> = signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _: io::Result<()> = signal::ctrl_c().await;
}
